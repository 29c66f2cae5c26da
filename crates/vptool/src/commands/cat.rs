use clap::Args;
use miette::{miette, IntoDiagnostic, Result};
use std::{io::Write, path::PathBuf};

#[derive(Args)]
pub struct CatArgs {
    /// An input VP file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Name of the file to print, or its path from the root of the package
    #[arg(short, long)]
    name: String,
}

impl CatArgs {
    pub fn handle(&self) -> Result<()> {
        let mut vp = super::open_read(&self.file)?;
        let id = vp
            .find_path(&self.name)
            .or_else(|| vp.find(&self.name))
            .ok_or(miette!("{} not found in {}", self.name, self.file.display()))?;

        let mut stdout = std::io::stdout().lock();
        std::io::copy(&mut vp.open_file(id)?, &mut stdout).into_diagnostic()?;
        stdout.flush().into_diagnostic()?;

        Ok(())
    }
}
