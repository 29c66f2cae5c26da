//! Error types that can be emitted from this library

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent warpper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// An I/O failure tied to a specific filesystem path
    #[error("{}: {source}", .path.display())]
    PathIOError {
        /// The path being accessed
        path: PathBuf,
        /// The underlying failure
        #[source]
        source: std::io::Error,
    },

    /// Transparent warpper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// Transparent warpper for [`walkdir::Error`]
    #[error(transparent)]
    WalkDirError(#[from] walkdir::Error),

    /// file is not a valid vp package
    #[error("file is not a valid vp package")]
    #[diagnostic(code(vp_archive::format))]
    Format(#[from] FormatError),

    /// unable to find requested file
    #[error("unable to find requested file")]
    FileNotFound(#[from] FileNotFoundError),

    /// no index record named {0} exists on disk
    #[error("no index record named {0:?} exists on disk")]
    EntryNotFound(String),

    /// {0} is a directory, not a file
    #[error("{0:?} is a directory, not a file")]
    NotAFile(String),

    /// zero length files can not be stored
    #[error("{0} is empty, zero length files can not be stored in a package")]
    #[diagnostic(help("a size of zero marks a directory record"))]
    EmptyFile(String),

    /// replacement does not fit in the existing slot
    #[error("{len} bytes do not fit in the {size} bytes stored for {name:?}")]
    ReplacementTooLarge {
        /// Entry being overwritten
        name: String,
        /// Bytes currently reserved for the entry
        size: u32,
        /// Bytes offered as replacement
        len: u64,
    },

    /// entry name would escape the extraction directory
    #[error("refusing to extract entry with unsafe name {0:?}")]
    UnsafeEntryName(String),

    /// the package would exceed the 32 bit offsets of the format
    #[error("{} would push the package past {} bytes", .0.display(), i32::MAX)]
    ArchiveTooLarge(PathBuf),

    /// archive was not opened from a path
    #[error("archive was not opened from a path, it can not be rebuilt")]
    NoBackingPath,

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Structural problems found while validating untrusted package bytes
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// signature does not match `VPVP`
    #[error("bad signature {found:02X?}, expected \"VPVP\"")]
    BadSignature {
        /// The four bytes found at the start of the file
        found: [u8; 4],
    },

    /// fewer bytes available than a fixed size record needs
    #[error("truncated {what}: needed {expected} bytes, got {found}")]
    Truncated {
        /// Which record was being read
        what: &'static str,
        /// The record size
        expected: usize,
        /// Bytes actually available
        found: usize,
    },

    /// index offset outside the file
    #[error("index offset {index_offset} is outside of the file ({file_size} bytes)")]
    IndexOffsetOutOfBounds {
        /// Offset declared by the header
        index_offset: i32,
        /// Length of the package
        file_size: u64,
    },

    /// more entries declared than could fit after the index offset
    #[error("{entry_count} entries declared but only {available} bytes follow the index offset")]
    ExcessiveEntryCount {
        /// Count declared by the header
        entry_count: i32,
        /// Bytes between the index offset and the end of the file
        available: u64,
    },

    /// file data range outside the file
    #[error("entry {name:?} spans {offset}..{offset}+{size}, outside of the file ({file_size} bytes)")]
    RangeOutOfBounds {
        /// Name of the offending entry
        name: String,
        /// Declared data offset
        offset: i32,
        /// Declared data size
        size: i32,
        /// Length of the package
        file_size: u64,
    },

    /// updir record closes the root directory
    #[error("index record {index} closes a directory while already at the top level")]
    UpdirUnderflow {
        /// Position of the record in the index
        index: usize,
    },
}

/// Error type to provide further information when a file has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested file")]
pub enum FileNotFoundError {
    /// by name {0}
    #[error("by name {0}")]
    Name(String),

    /// by path {0}
    #[error("by path {0}")]
    Path(String),

    /// at node {0}
    #[error("at node {0}")]
    Node(usize),
}

impl Error {
    /// The format violation behind this error, if it is one
    pub fn as_format(&self) -> Option<&FormatError> {
        match self {
            Error::Format(e) => Some(e),
            _ => None,
        }
    }

    pub(crate) fn at_path(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::PathIOError { path, source }
    }
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
