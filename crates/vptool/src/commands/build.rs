use clap::Args;
use miette::{miette, Context, IntoDiagnostic, Result};
use std::{fs::File, io::BufWriter, path::PathBuf};
use tracing::{info, warn};
use vp_archive::{write::VpWriterOptions, VpWriter};

#[derive(Args)]
pub struct BuildArgs {
    /// An input directory, packed from its `data` subdirectory if it has one
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// A target VP file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Store zero instead of the modification time of each file
    #[arg(long, default_value_t = false)]
    no_timestamps: bool,
}

impl BuildArgs {
    pub fn handle(&self) -> Result<()> {
        if !self.directory.is_dir() {
            return Err(miette!("{} is not a directory", self.directory.display()));
        }

        let nested = self.directory.join("data");
        let source = if nested.is_dir() {
            nested
        } else {
            if self.directory.file_name().map_or(true, |n| n != "data") {
                warn!(
                    "{} is not named data, the game will not find files packed from it",
                    self.directory.display()
                );
            }
            self.directory.clone()
        };
        info!("creating {} from {}", self.file.display(), source.display());

        let out = if !self.overwrite {
            File::create_new(&self.file)
                .into_diagnostic()
                .context(format!("creating {}", &self.file.display()))?
        } else {
            File::create(&self.file)
                .into_diagnostic()
                .context(format!("creating {}", &self.file.display()))?
        };

        let options = VpWriterOptions::builder()
            .file_timestamps(!self.no_timestamps)
            .build();
        let mut vp = VpWriter::new(BufWriter::new(out), options)?;
        vp.add_directory(&source)
            .context(format!("packing {}", source.display()))?;
        vp.finish().context("finalizing vp file")?;

        Ok(())
    }
}
