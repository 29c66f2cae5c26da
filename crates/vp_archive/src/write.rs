//! Types for writing VP archives
//!

use binrw::BinWrite;
use bon::Builder;
use std::fs::{self, File, Metadata};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, instrument, warn, Level};
use walkdir::WalkDir;

use crate::error::{Error, FormatError, Result};
use crate::types::{VpEntry, VpHeader, ENTRY_SIZE, HEADER_SIZE};

/// Options for how the VP file should be written
#[derive(Debug, Clone, Copy, Builder)]
pub struct VpWriterOptions {
    /// Store the modification time of files taken from disk, zero otherwise
    #[builder(default = true)]
    pub file_timestamps: bool,
}

impl Default for VpWriterOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// VP archive generator
///
/// File data is streamed straight into `inner` behind a placeholder header, the index is collected
/// in memory and appended by [`VpWriter::finish`], which then rewrites the header.
///
/// ```
/// # fn doit() -> vp_archive::error::Result<()>
/// # {
/// # use vp_archive::VpWriter;
/// use std::io::Write;
/// use vp_archive::write::VpWriterOptions;
///
/// // We use a buffer here, though you'd normally use a `File`
/// let mut vp = VpWriter::new(std::io::Cursor::new(Vec::new()), VpWriterOptions::default())?;
///
/// vp.start_directory("data", 0)?;
/// vp.start_file("hello_world.txt", 0)?;
/// vp.write_all(b"Hello, World!")?;
/// vp.end_directory()?;
///
/// // Write the index and the final header.
/// vp.finish()?;
///
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct VpWriter<W: Write + Seek> {
    inner: W,
    options: VpWriterOptions,
    index: Vec<VpEntry>,
    cursor: u64,
    depth: usize,
    current_file: Option<usize>,
}

impl<W: Write + Seek> VpWriter<W> {
    /// Initializes the archive, writing a placeholder header at the start of `inner`.
    ///
    /// Directories and files are then added in index order: [`VpWriter::start_directory`] opens a
    /// scope, [`VpWriter::end_directory`] closes it and [`VpWriter::start_file`] begins a file whose
    /// data is written through the [`Write`] implementation.
    pub fn new(mut inner: W, options: VpWriterOptions) -> Result<VpWriter<W>> {
        inner.rewind()?;
        VpHeader::default().write(&mut inner)?;

        Ok(VpWriter {
            inner,
            options,
            index: Vec::new(),
            cursor: HEADER_SIZE as u64,
            depth: 0,
            current_file: None,
        })
    }

    /// Returns true if a file is currently open for writing.
    pub const fn is_writing_file(&self) -> bool {
        self.current_file.is_some()
    }

    /// Number of directories currently open
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Open a directory, everything added until the matching [`VpWriter::end_directory`] lands in it.
    #[instrument(skip(self), err)]
    pub fn start_directory(&mut self, name: &str, timestamp: u32) -> Result<()> {
        self.finish_file()?;

        self.index.push(VpEntry::directory(name, timestamp));
        self.depth += 1;
        Ok(())
    }

    /// Close the innermost open directory
    #[instrument(skip(self), err)]
    pub fn end_directory(&mut self) -> Result<()> {
        self.finish_file()?;

        if self.depth == 0 {
            return Err(FormatError::UpdirUnderflow {
                index: self.index.len(),
            }
            .into());
        }
        self.index.push(VpEntry::updir());
        self.depth -= 1;
        Ok(())
    }

    /// Start a new file in the current directory.
    ///
    /// Its data begins at the current end of the data region.
    #[instrument(skip(self), err)]
    pub fn start_file(&mut self, name: &str, timestamp: u32) -> Result<()> {
        self.finish_file()?;

        let offset = self.checked_cursor(name)?;
        self.current_file = Some(self.index.len());
        self.index.push(VpEntry::file(name, offset, 0, timestamp));
        Ok(())
    }

    #[instrument(skip(self), err)]
    fn finish_file(&mut self) -> Result<()> {
        let Some(position) = self.current_file.take() else {
            return Ok(());
        };

        let entry = &mut self.index[position];
        let name = entry.name().into_owned();
        let size = self.cursor - entry.offset as u64;
        if size == 0 {
            warn!(name = %name, "skipping empty file, a size of zero marks a directory");
            self.index.truncate(position);
            return Ok(());
        }
        if size > i32::MAX as u64 {
            return Err(Error::ArchiveTooLarge(name.into()));
        }

        entry.size = size as i32;
        debug!(name = %name, offset = entry.offset, size, "finished file");
        Ok(())
    }

    fn checked_cursor(&self, name: &str) -> Result<u32> {
        if self.cursor > i32::MAX as u64 {
            return Err(Error::ArchiveTooLarge(PathBuf::from(name)));
        }
        Ok(self.cursor as u32)
    }

    /// Add `path` as a directory of the current scope, with everything below it.
    ///
    /// The directory record is named after the last component of `path` and carries its
    /// modification time. Children are added sorted by file name so the result does not depend
    /// on the order the filesystem lists them in. Sub-directories are descended into as they come
    /// up, files are streamed in as they come up. Empty files can not be represented and are
    /// skipped, as is anything that is neither a file nor a directory.
    #[instrument(skip(self, path), err, fields(path = %path.as_ref().display()))]
    pub fn add_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.add_tree(path.as_ref(), true)
    }

    /// Like [`VpWriter::add_directory`], but the children of `path` are added to the current scope
    /// directly, without a record for `path` itself.
    #[instrument(skip(self, path), err, fields(path = %path.as_ref().display()))]
    pub fn add_directory_contents(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.add_tree(path.as_ref(), false)
    }

    fn add_tree(&mut self, root: &Path, include_root: bool) -> Result<()> {
        let base = usize::from(!include_root);
        let mut open = 0;

        for entry in WalkDir::new(root).min_depth(base).sort_by_file_name() {
            let entry = entry?;
            let depth = entry.depth() - base;
            while open > depth {
                self.end_directory()?;
                open -= 1;
            }

            let name = if entry.depth() == 0 {
                root_name(root)?
            } else {
                entry.file_name().to_string_lossy().into_owned()
            };
            let metadata = entry.metadata()?;

            if entry.file_type().is_dir() {
                debug!("adding directory {}", entry.path().display());
                self.start_directory(&name, modified(&metadata))?;
                open += 1;
            } else if entry.file_type().is_file() {
                if metadata.len() == 0 {
                    warn!("skipping empty file {}", entry.path().display());
                    continue;
                }

                info!("adding {}", entry.path().display());
                let timestamp = if self.options.file_timestamps {
                    modified(&metadata)
                } else {
                    0
                };
                self.start_file(&name, timestamp)?;

                let mut source = File::open(entry.path()).map_err(Error::at_path(entry.path()))?;
                io::copy(&mut source, self).map_err(Error::at_path(entry.path()))?;
                self.checked_cursor(&name)
                    .map_err(|_| Error::ArchiveTooLarge(entry.path().to_path_buf()))?;
            } else {
                warn!(
                    "skipping {}, it is neither a file nor a directory",
                    entry.path().display()
                );
            }
        }

        while open > 0 {
            self.end_directory()?;
            open -= 1;
        }
        Ok(())
    }

    /// Finish the last file, append the index and write the real header
    ///
    /// Directories still open are closed first. This will return the writer, but one should
    /// normally not append any data to the end of the file.
    #[instrument(skip(self), err)]
    pub fn finish(mut self) -> Result<W> {
        self.finish_file()?;
        while self.depth > 0 {
            debug!(depth = self.depth, "closing directory left open");
            self.end_directory()?;
        }

        let index_offset = self.checked_cursor("index")?;
        for entry in &self.index {
            entry.write(&mut self.inner)?;
        }

        let header = VpHeader {
            index_offset: index_offset as i32,
            entry_count: self.index.len() as i32,
            ..Default::default()
        };
        self.inner.rewind()?;
        header.write(&mut self.inner)?;
        self.inner.seek(SeekFrom::Start(
            index_offset as u64 + self.index.len() as u64 * ENTRY_SIZE as u64,
        ))?;
        self.inner.flush()?;

        info!(
            entries = header.entry_count,
            index_offset, "finished package"
        );
        Ok(self.inner)
    }
}

impl<W: Write + Seek> Write for VpWriter<W> {
    #[instrument(skip_all, err, ret(level = Level::TRACE), fields(size=buf.len()) )]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_file.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "No file has been started",
            ));
        }
        let written = self.inner.write(buf)?;
        self.cursor += written as u64;
        Ok(written)
    }

    #[instrument(skip(self), err)]
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Build a package at `output` from the directory `source`.
///
/// The package gets a single top level directory named after `source`. A failure part way through
/// leaves a partially written file behind.
#[instrument(skip_all, err, fields(source = %source.as_ref().display(), output = %output.as_ref().display()))]
pub fn build_from_directory(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: VpWriterOptions,
) -> Result<()> {
    let (source, output) = (source.as_ref(), output.as_ref());
    if !source.is_dir() {
        return Err(Error::PathIOError {
            path: source.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let out = File::create(output).map_err(Error::at_path(output))?;
    let mut vp = VpWriter::new(BufWriter::new(out), options)?;
    vp.add_directory(source)?;
    vp.finish()?;
    Ok(())
}

fn root_name(root: &Path) -> Result<String> {
    let name = match root.file_name() {
        Some(name) => name.to_os_string(),
        None => fs::canonicalize(root)
            .map_err(Error::at_path(root))?
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default(),
    };
    Ok(name.to_string_lossy().into_owned())
}

fn modified(metadata: &Metadata) -> u32 {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|since| since.as_secs() as u32)
        .unwrap_or_default()
}
