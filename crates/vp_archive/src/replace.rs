//! Replacing the contents of a single file inside a package
//!

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::error::{Error, FileNotFoundError, Result};
use crate::read::{file_entry, VpArchive};
use crate::tree::NodeId;
use crate::write::{VpWriter, VpWriterOptions};

/// How [`VpArchive::replace_file`] stored the new contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replaced {
    /// The data fit in the old slot and was written over it
    InPlace {
        /// Bytes at the end of the old slot no record points at anymore
        wasted: u64,
    },

    /// The package was extracted and written again from scratch
    Rebuilt,
}

impl VpArchive<File> {
    /// Replace the contents of a file with the contents of `source`.
    ///
    /// `name` is looked up as a `/` separated path first, see [`VpArchive::find_path`], and
    /// otherwise as the first file carrying that name, see [`VpArchive::find`].
    ///
    /// When the new data is no larger than the old it is written over the existing data and the
    /// index record is updated afterwards. Otherwise the package is extracted into a temporary
    /// directory, the file is swapped there and the package is rebuilt at its original path, which
    /// requires the archive to have been opened with [`VpArchive::open`]. Neither path is
    /// transactional.
    #[instrument(skip(self, source), err, fields(source = %source.as_ref().display()))]
    pub fn replace_file(&mut self, name: &str, source: impl AsRef<Path>) -> Result<Replaced> {
        let source = source.as_ref();
        let id = self
            .find_path(name)
            .or_else(|| self.find(name))
            .ok_or_else(|| FileNotFoundError::Name(name.to_owned()))?;
        let size = file_entry(self.tree(), id)?.size() as u64;

        let mut input = File::open(source).map_err(Error::at_path(source))?;
        let len = input.metadata().map_err(Error::at_path(source))?.len();
        if len == 0 {
            return Err(Error::EmptyFile(source.display().to_string()));
        }

        if len <= size {
            // the record has to exist before any data is overwritten
            self.locate_record(id)?;
            self.overwrite_in_place(id, &mut input, len)?;
            self.update_entry(id)?;

            let wasted = size - len;
            info!(wasted, "replaced {name} in place");
            return Ok(Replaced::InPlace { wasted });
        }

        self.rebuild_with(id, source)?;
        info!("replaced {name}, package rebuilt");
        Ok(Replaced::Rebuilt)
    }

    fn rebuild_with(&mut self, id: NodeId, source: &Path) -> Result<()> {
        let path = self.path().ok_or(Error::NoBackingPath)?.to_path_buf();

        let scratch = tempfile::Builder::new()
            .prefix("vptool-")
            .tempdir()
            .map_err(Error::at_path(std::env::temp_dir()))?;
        debug!("unpacking into {}", scratch.path().display());
        self.extract_all(scratch.path())?;

        let target = scratch.path().join(self.tree().path(id));
        fs::copy(source, &target).map_err(Error::at_path(&target))?;

        let out = File::create(&path).map_err(Error::at_path(&path))?;
        let mut vp = VpWriter::new(BufWriter::new(out), VpWriterOptions::default())?;
        vp.add_directory_contents(scratch.path())?;
        vp.finish()?;

        *self = VpArchive::open(&path)?;

        let scratch_path = scratch.path().to_path_buf();
        scratch.close().map_err(Error::at_path(scratch_path))?;
        Ok(())
    }
}
