use clap::Args;
use miette::{Context, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct ExtractArgs {
    /// An input VP file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    directory: PathBuf,
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let mut vp = super::open_read(&self.file)?;

        vp.extract_all(&self.directory)
            .context(format!("extracting into {}", self.directory.display()))?;
        info!("extracted {} files", vp.len());

        Ok(())
    }
}
