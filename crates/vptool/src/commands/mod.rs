use miette::{Context, IntoDiagnostic, Result};
use std::{fs::File, path::Path};
use vp_archive::VpArchive;

pub mod build;
pub mod cat;
pub mod extract;
pub mod extract_file;
pub mod list;
pub mod replace;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Print the directory tree of a VP file
    List(list::ListArgs),
    /// Write the contents of a single file to stdout
    Cat(cat::CatArgs),
    /// Extract a single file from a VP file
    ExtractFile(extract_file::ExtractFileArgs),
    /// Extract a VP file into a directory
    Extract(extract::ExtractArgs),
    /// Replace the contents of a file inside a VP file
    Replace(replace::ReplaceArgs),
    /// Build a VP file from a directory
    Build(build::BuildArgs),
}

impl Commands {
    pub fn handle(&self) -> Result<()> {
        match self {
            Commands::List(list) => list.handle(),
            Commands::Cat(cat) => cat.handle(),
            Commands::ExtractFile(extract_file) => extract_file.handle(),
            Commands::Extract(extract) => extract.handle(),
            Commands::Replace(replace) => replace.handle(),
            Commands::Build(build) => build.handle(),
        }
    }
}

/// Open a package read-only
fn open_read(path: &Path) -> Result<VpArchive<File>> {
    let f = File::open(path)
        .into_diagnostic()
        .context(format!("path: {}", path.display()))?;
    VpArchive::new(f).context(format!("reading {}", path.display()))
}
