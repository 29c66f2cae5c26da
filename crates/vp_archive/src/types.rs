//! Base types for structure of VP file.
//!
//! Everything read through this module is treated as untrusted: [`read_header`] and [`read_entry`]
//! only decode fixed size records, [`validate_header`] and [`validate_file_range`] check them against
//! the real length of the package before anything else trusts them.

use binrw::{BinRead, BinWrite};
use std::borrow::Cow;
use std::io::{self, Cursor, Read};
use tracing::{trace, warn};

use crate::error::{FormatError, Result};

/// The four bytes every package starts with
pub const SIGNATURE: [u8; 4] = *b"VPVP";

/// The only layout version this crate knows
pub const VERSION: i32 = 2;

/// Size of [`VpHeader`] on disk
pub const HEADER_SIZE: u32 = 16;

/// Size of [`VpEntry`] on disk
pub const ENTRY_SIZE: u32 = 44;

/// Width of the name field, including the NUL terminator
pub const NAME_LEN: usize = 32;

/// Name of the record closing a directory
pub const UPDIR_NAME: &str = "..";

/// VP file header
///
/// Defines the header of the VP file which always starts with "VPVP" and then a version (in this case 2).
/// All data is stored in little endian format
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct VpHeader {
    /// Always [`SIGNATURE`]
    pub signature: [u8; 4],

    /// Layout version, [`VERSION`] for every known package
    pub version: i32,

    /// The offset from the beginning of the file where the index starts
    pub index_offset: i32,

    /// The number of records stored in the index
    pub entry_count: i32,
}

impl Default for VpHeader {
    fn default() -> Self {
        Self {
            signature: SIGNATURE,
            version: VERSION,
            index_offset: HEADER_SIZE as i32,
            entry_count: Default::default(),
        }
    }
}

/// VP index record
///
/// Describes a file, the start of a directory or the end of one (`..`). A size of zero marks the
/// directory records, the offset is meaningless for them.
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct VpEntry {
    /// The offset to the data for this record from the start of the file
    pub offset: i32,

    /// The size of the data for this record
    pub size: i32,

    /// NUL terminated name
    pub name: [u8; NAME_LEN],

    /// Modification time in seconds since the unix epoch
    pub timestamp: i32,
}

impl VpEntry {
    /// Record opening a directory
    pub fn directory(name: &str, timestamp: u32) -> Self {
        Self {
            name: encode_name(name),
            timestamp: timestamp as i32,
            ..Default::default()
        }
    }

    /// Record describing file data
    pub fn file(name: &str, offset: u32, size: u32, timestamp: u32) -> Self {
        Self {
            offset: offset as i32,
            size: size as i32,
            name: encode_name(name),
            timestamp: timestamp as i32,
        }
    }

    /// Record closing the current directory
    pub fn updir() -> Self {
        Self {
            name: encode_name(UPDIR_NAME),
            ..Default::default()
        }
    }

    /// The name bytes up to the first NUL
    pub fn name_raw(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        &self.name[..end]
    }

    /// The decoded name
    ///
    /// Invalid UTF-8 is replaced, packages in the wild are plain ASCII.
    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name_raw())
    }

    /// Whether this record opens or closes a directory
    pub fn is_directory(&self) -> bool {
        self.size == 0
    }

    /// Whether this record closes a directory
    pub fn is_updir(&self) -> bool {
        self.is_directory() && self.name_raw() == UPDIR_NAME.as_bytes()
    }
}

/// Encode a name into the fixed width field.
///
/// Names longer than the field allows are cut at the last character boundary that fits.
pub fn encode_name(name: &str) -> [u8; NAME_LEN] {
    let mut end = name.len().min(NAME_LEN - 1);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    if end < name.len() {
        warn!(name, kept = &name[..end], "name truncated to fit the index record");
    }

    let mut raw = [0u8; NAME_LEN];
    raw[..end].copy_from_slice(&name.as_bytes()[..end]);
    raw
}

/// Lay out already encoded name bytes in the fixed width field, without any re-encoding.
///
/// Bytes past [`NAME_LEN`] are dropped. A name filling the whole field keeps no NUL, which is how
/// such names are stored on disk.
pub fn name_field(raw: &[u8]) -> [u8; NAME_LEN] {
    let mut field = [0u8; NAME_LEN];
    let len = raw.len().min(NAME_LEN);
    field[..len].copy_from_slice(&raw[..len]);
    field
}

// `read_exact` with the number of bytes actually available, for `FormatError::Truncated`
fn read_record<R: Read, const N: usize>(reader: &mut R, what: &'static str) -> Result<[u8; N]> {
    let mut buffer = [0u8; N];
    let mut filled = 0;
    while filled < N {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => {
                return Err(FormatError::Truncated {
                    what,
                    expected: N,
                    found: filled,
                }
                .into())
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(buffer)
}

/// Read the header at the current position of `reader`.
///
/// Fails with [`FormatError::Truncated`] if the header is cut short and with
/// [`FormatError::BadSignature`] if the file does not start with [`SIGNATURE`].
pub fn read_header<R: Read>(reader: &mut R) -> Result<VpHeader> {
    let raw = read_record::<_, { HEADER_SIZE as usize }>(reader, "header")?;

    let mut found = [0u8; 4];
    found.copy_from_slice(&raw[..4]);
    if found != SIGNATURE {
        return Err(FormatError::BadSignature { found }.into());
    }

    let header = VpHeader::read(&mut Cursor::new(raw))?;
    if header.version != VERSION {
        warn!(version = header.version, "unknown package version, reading as {VERSION}");
    }

    trace!(?header);
    Ok(header)
}

/// Check the header against the real length of the package.
///
/// The index has to start after the header and inside the file, and the declared number of
/// records has to fit between the index offset and the end of the file. This runs before any
/// allocation sized by `entry_count`.
pub fn validate_header(header: &VpHeader, file_size: u64) -> core::result::Result<(), FormatError> {
    let index_offset = header.index_offset;
    if index_offset < HEADER_SIZE as i32 || index_offset as u64 > file_size {
        return Err(FormatError::IndexOffsetOutOfBounds {
            index_offset,
            file_size,
        });
    }

    let available = file_size - index_offset as u64;
    if header.entry_count < 0 || header.entry_count as u64 * ENTRY_SIZE as u64 > available {
        return Err(FormatError::ExcessiveEntryCount {
            entry_count: header.entry_count,
            available,
        });
    }

    Ok(())
}

/// Read one index record at the current position of `reader`.
pub fn read_entry<R: Read>(reader: &mut R) -> Result<VpEntry> {
    let raw = read_record::<_, { ENTRY_SIZE as usize }>(reader, "index record")?;
    Ok(VpEntry::read(&mut Cursor::new(raw))?)
}

/// Check that the data of a file record lies inside the package and after the header.
///
/// Directory records carry no data and always pass.
pub fn validate_file_range(entry: &VpEntry, file_size: u64) -> core::result::Result<(), FormatError> {
    if entry.is_directory() {
        return Ok(());
    }

    let end = entry.offset as i64 + entry.size as i64;
    if entry.size < 0 || entry.offset < HEADER_SIZE as i32 || end > file_size as i64 {
        return Err(FormatError::RangeOutOfBounds {
            name: entry.name().into_owned(),
            offset: entry.offset,
            size: entry.size,
            file_size,
        });
    }

    Ok(())
}
