use clap::Args;
use miette::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};
use vp_archive::{Replaced, VpArchive};

#[derive(Args)]
pub struct ReplaceArgs {
    /// The VP file to modify
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Name of the file to replace, or its path from the root of the package
    #[arg(short, long)]
    name: String,

    /// File holding the new contents
    #[arg(short, long, value_name = "INPUT")]
    input: PathBuf,
}

impl ReplaceArgs {
    pub fn handle(&self) -> Result<()> {
        let mut vp = VpArchive::open(&self.file)?;

        match vp
            .replace_file(&self.name, &self.input)
            .context(format!("replacing {} in {}", self.name, self.file.display()))?
        {
            Replaced::InPlace { wasted: 0 } => info!("replaced {} in place", self.name),
            Replaced::InPlace { wasted } => {
                warn!("replaced {} in place, leaving {wasted} unused bytes", self.name)
            }
            Replaced::Rebuilt => info!("replaced {}, {} was rebuilt", self.name, self.file.display()),
        }

        Ok(())
    }
}
