//! Types for reading VP archives
//!

use binrw::BinWrite;
use std::{
    fmt::{self, Debug},
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Component, Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{Error, FileNotFoundError, Result},
    tree::{FileEntry, Listing, Node, NodeId, Tree, TreeBuilder},
    types::{
        read_entry, read_header, validate_file_range, validate_header, VpEntry, VpHeader,
        ENTRY_SIZE,
    },
};

/// A struct for reading a file stored in a VP archive
pub struct VpFile<'a, R: Read + Seek> {
    data: &'a FileEntry,
    reader: io::Take<&'a mut R>,
}

impl<'a, R: Read + Seek> Debug for VpFile<'a, R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "VpFile({:#?})", self.data)
    }
}

/// Methods for retrieving information on VP file entries
impl<'a, R: Read + Seek> VpFile<'a, R> {
    /// Get the name of the file
    ///
    /// # Warnings
    ///
    /// It is dangerous to use this name directly when extracting an archive.
    /// It may contain a path separator or be `..`. Carelessly writing to these
    /// paths allows an attacker to craft a package that will overwrite files
    /// outside of the target directory.
    pub fn name(&self) -> &str {
        &self.data.name
    }

    /// Get the size of the file, in bytes
    pub fn size(&self) -> u64 {
        self.data.size as u64
    }

    /// Get the starting offset of the data of the file
    pub fn data_start(&self) -> u64 {
        self.data.offset as u64
    }

    /// Get the modification time in seconds since the unix epoch
    pub fn timestamp(&self) -> u32 {
        self.data.timestamp
    }
}

impl<R: Read + Seek> Read for VpFile<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

/// VP archive reader
///
/// The archive owns both the parsed [`Tree`] and the storage it was parsed from. Nodes only carry
/// the location of their data, reading goes through [`VpArchive::open_file`].
///
/// ```no_run
/// use std::io::prelude::*;
///
/// fn list_vp_contents(reader: impl Read + Seek) -> vp_archive::error::Result<()> {
///     let mut vp = vp_archive::VpArchive::new(reader)?;
///
///     print!("{}", vp.listing());
///     if let Some(id) = vp.find("ships.tbl") {
///         std::io::copy(&mut vp.open_file(id)?, &mut std::io::stdout())?;
///     }
///
///     Ok(())
/// }
/// ```
pub struct VpArchive<R> {
    reader: R,
    header: VpHeader,
    tree: Tree,
    file_size: u64,
    path: Option<PathBuf>,
}

impl<R> Debug for VpArchive<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VpArchive")
            .field("header", &self.header)
            .field("file_size", &self.file_size)
            .field("path", &self.path)
            .field("nodes", &self.tree.len())
            .finish_non_exhaustive()
    }
}

impl<R> VpArchive<R> {
    /// The header as read from the package
    pub fn header(&self) -> &VpHeader {
        &self.header
    }

    /// The directory tree of the package
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Size of the package in bytes when it was parsed
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// The path the package was opened from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get a node by id
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.tree.get(id)
    }

    /// Find the first file with the given name, see [`Tree::find`]
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.tree.find(name)
    }

    /// Find a file by its `/` separated path, see [`Tree::find_path`]
    pub fn find_path(&self, path: &str) -> Option<NodeId> {
        self.tree.find_path(path)
    }

    /// An indented rendering of the index
    pub fn listing(&self) -> Listing<'_> {
        self.tree.listing()
    }

    /// Number of files contained in this package
    pub fn len(&self) -> usize {
        self.tree.files().count()
    }

    /// Whether this package contains no files
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over all the file names in this archive, in index order.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.tree.files().map(|(_, f)| f.name.as_ref())
    }

    /// Unwrap and return the inner reader object
    ///
    /// The position of the reader is undefined.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl VpArchive<File> {
    /// Open and parse the package at `path`.
    ///
    /// The file is opened for reading and writing so the archive can later be modified in place.
    /// Read-only files are still opened, writes to them will fail.
    #[instrument(skip_all, err, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<VpArchive<File>> {
        let path = path.as_ref();
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                debug!("not writable, opening read-only");
                File::open(path)
            }
            result => result,
        }
        .map_err(Error::at_path(path))?;

        let mut archive = VpArchive::new(file)?;
        archive.path = Some(path.to_path_buf());
        Ok(archive)
    }
}

impl<R: Read + Seek> VpArchive<R> {
    /// Read a VP archive, rebuilding its directory tree.
    ///
    /// The header is validated before the index is touched and every file record is checked
    /// against the size of the package before it becomes part of the tree. Any failure discards
    /// everything read so far.
    #[instrument(skip_all, err)]
    pub fn new(mut reader: R) -> Result<VpArchive<R>> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.rewind()?;

        let header = read_header(&mut reader)?;
        validate_header(&header, file_size)?;

        reader.seek(SeekFrom::Start(header.index_offset as u64))?;
        let mut builder = TreeBuilder::new(file_size);
        for _ in 0..header.entry_count {
            builder.push(&read_entry(&mut reader)?)?;
        }
        if builder.depth() > 0 {
            debug!(open = builder.depth(), "index ends inside a directory");
        }

        let tree = builder.finish();
        info!(
            entries = header.entry_count,
            nodes = tree.len() - 1,
            file_size,
            "parsed package"
        );

        Ok(VpArchive {
            reader,
            header,
            tree,
            file_size,
            path: None,
        })
    }

    /// Get a reader over the data of a file
    pub fn open_file(&mut self, id: NodeId) -> Result<VpFile<'_, R>> {
        let data = file_entry(&self.tree, id)?;
        self.reader.seek(SeekFrom::Start(data.offset as u64))?;
        Ok(VpFile {
            data,
            reader: self.reader.by_ref().take(data.size as u64),
        })
    }

    /// Search for a file by name, see [`Tree::find`]
    pub fn by_name(&mut self, name: &str) -> Result<VpFile<'_, R>> {
        let Some(id) = self.tree.find(name) else {
            return Err(Error::FileNotFound(FileNotFoundError::Name(
                name.to_owned(),
            )));
        };
        self.open_file(id)
    }

    /// Read the whole contents of a file
    pub fn read_file(&mut self, id: NodeId) -> Result<Vec<u8>> {
        let mut file = self.open_file(id)?;
        let mut buffer = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Write a single file to disk.
    ///
    /// If `dest` is an existing directory the file is created inside it under its own name,
    /// otherwise `dest` is the path of the new file. Returns the path written.
    #[instrument(skip(self, dest), err, fields(dest = %dest.as_ref().display()))]
    pub fn extract_file(&mut self, id: NodeId, dest: impl AsRef<Path>) -> Result<PathBuf> {
        let dest = dest.as_ref();
        let data = file_entry(&self.tree, id)?;

        let target = if dest.is_dir() {
            check_entry_name(&data.name)?;
            dest.join(&*data.name)
        } else {
            dest.to_path_buf()
        };

        info!("writing {}", target.display());
        write_file_data(&mut self.reader, data, &target)?;
        Ok(target)
    }

    /// Extract the whole package below `dest`.
    ///
    /// Directories are created as needed, existing ones are reused and existing files are
    /// overwritten. The first failure stops the extraction, anything written before it stays on
    /// disk.
    #[instrument(skip(self, dest), err, fields(dest = %dest.as_ref().display()))]
    pub fn extract_all(&mut self, dest: impl AsRef<Path>) -> Result<()> {
        let dest = dest.as_ref();
        fs::create_dir_all(dest).map_err(Error::at_path(dest))?;

        // scopes[d] is the directory holding nodes at depth d
        let mut scopes = vec![dest.to_path_buf()];
        for (depth, _, node) in self.tree.iter() {
            scopes.truncate(depth + 1);
            check_entry_name(node.name())?;
            let target = scopes[depth].join(node.name());

            match node {
                Node::Directory(_) => {
                    debug!("creating {}", target.display());
                    fs::create_dir_all(&target).map_err(Error::at_path(&target))?;
                    scopes.push(target);
                }
                Node::File(data) => {
                    info!("writing {}", target.display());
                    write_file_data(&mut self.reader, data, &target)?;
                }
            }
        }

        Ok(())
    }
}

impl<R: Read + Write + Seek> VpArchive<R> {
    /// Write the in-memory state of a node back to its index record.
    ///
    /// The record is located with [`VpArchive::locate_record`] and overwritten with the node's
    /// offset, size and timestamp. The name bytes are written back unchanged.
    #[instrument(skip(self), err)]
    pub fn update_entry(&mut self, id: NodeId) -> Result<()> {
        let position = self.locate_record(id)?;
        let node = self
            .tree
            .get(id)
            .ok_or(FileNotFoundError::Node(id.index()))?;
        let record = node.to_entry();
        validate_file_range(&record, self.reader.seek(SeekFrom::End(0))?)?;

        debug!(position, ?record, "rewriting index record");
        self.reader.seek(SeekFrom::Start(position))?;
        record.write(&mut self.reader)?;
        self.reader.flush()?;
        Ok(())
    }

    /// Find the position of the index record describing a node, without writing anything.
    ///
    /// The record the node was parsed from is used when it still carries the node's name and
    /// kind. Otherwise the index is scanned for the first record, updirs excluded, of the same
    /// kind whose name bytes equal the node's. Fails with [`Error::EntryNotFound`] if there is none.
    #[instrument(skip(self), err)]
    pub fn locate_record(&mut self, id: NodeId) -> Result<u64> {
        let node = self
            .tree
            .get(id)
            .ok_or(FileNotFoundError::Node(id.index()))?;
        let matches = |entry: &VpEntry| {
            !entry.is_updir()
                && entry.is_directory() == node.is_dir()
                && entry.name_raw() == node.name_raw()
        };

        let file_size = self.reader.seek(SeekFrom::End(0))?;
        self.reader.rewind()?;
        let header = read_header(&mut self.reader)?;
        validate_header(&header, file_size)?;

        let index_offset = header.index_offset as u64;
        let entry_count = header.entry_count as u64;

        if let Some(record) = node.record().map(|r| r as u64).filter(|&r| r < entry_count) {
            let position = index_offset + record * ENTRY_SIZE as u64;
            self.reader.seek(SeekFrom::Start(position))?;
            if matches(&read_entry(&mut self.reader)?) {
                return Ok(position);
            }
            debug!(record, "index record no longer matches, scanning the index");
        }

        self.reader.seek(SeekFrom::Start(index_offset))?;
        for i in 0..entry_count {
            if matches(&read_entry(&mut self.reader)?) {
                return Ok(index_offset + i * ENTRY_SIZE as u64);
            }
        }

        Err(Error::EntryNotFound(node.name().to_owned()))
    }

    /// Overwrite the data of a file with `len` bytes from `data`, keeping its offset.
    ///
    /// `len` must not exceed the current size; the bytes left over at the end of the old range
    /// are simply unused afterwards. Only the in-memory size changes, call
    /// [`VpArchive::update_entry`] to persist it.
    #[instrument(skip(self, data), err)]
    pub fn overwrite_in_place(&mut self, id: NodeId, data: impl Read, len: u64) -> Result<()> {
        let current = file_entry(&self.tree, id)?;
        if len == 0 {
            return Err(Error::EmptyFile(current.name.to_string()));
        }
        if len > current.size as u64 {
            return Err(Error::ReplacementTooLarge {
                name: current.name.to_string(),
                size: current.size,
                len,
            });
        }

        let updated = VpEntry::file(&current.name, current.offset, len as u32, current.timestamp);
        validate_file_range(&updated, self.reader.seek(SeekFrom::End(0))?)?;

        self.reader.seek(SeekFrom::Start(current.offset as u64))?;
        let written = io::copy(&mut data.take(len), &mut self.reader)?;
        self.reader.flush()?;
        if written != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {len} bytes of replacement data, got {written}"),
            )
            .into());
        }

        if let Some(Node::File(f)) = self.tree.get_mut(id) {
            f.size = len as u32;
        }
        Ok(())
    }
}

pub(crate) fn file_entry(tree: &Tree, id: NodeId) -> Result<&FileEntry> {
    match tree.get(id) {
        Some(Node::File(f)) => Ok(f),
        Some(node) => Err(Error::NotAFile(node.name().to_owned())),
        None => Err(FileNotFoundError::Node(id.index()).into()),
    }
}

/// Reject names that would leave the directory they are joined onto
fn check_entry_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );

    if !single || name.contains(|c| c == '/' || c == '\\') {
        warn!(name, "unsafe entry name");
        return Err(Error::UnsafeEntryName(name.to_owned()));
    }
    Ok(())
}

fn write_file_data<R: Read + Seek>(reader: &mut R, data: &FileEntry, target: &Path) -> Result<()> {
    reader.seek(SeekFrom::Start(data.offset as u64))?;
    let mut out = File::create(target).map_err(Error::at_path(target))?;

    let copied = io::copy(&mut reader.by_ref().take(data.size as u64), &mut out)
        .map_err(Error::at_path(target))?;
    if copied != data.size as u64 {
        return Err(Error::PathIOError {
            path: target.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("package ended after {copied} of {} bytes", data.size),
            ),
        });
    }
    Ok(())
}
