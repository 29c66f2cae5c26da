use clap::Args;
use miette::{miette, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct ExtractFileArgs {
    /// An input VP file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Name of the file to extract, or its path from the root of the package
    #[arg(short, long)]
    name: String,

    /// Target file, or a directory to create the file in
    #[arg(short, long, value_name = "OUT")]
    output: PathBuf,
}

impl ExtractFileArgs {
    pub fn handle(&self) -> Result<()> {
        let mut vp = super::open_read(&self.file)?;
        let id = vp
            .find_path(&self.name)
            .or_else(|| vp.find(&self.name))
            .ok_or(miette!("{} not found in {}", self.name, self.file.display()))?;

        let written = vp.extract_file(id, &self.output)?;
        info!("extracted {} to {}", self.name, written.display());

        Ok(())
    }
}
