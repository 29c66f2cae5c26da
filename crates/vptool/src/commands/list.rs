use clap::Args;
use miette::Result;
use owo_colors::{OwoColorize, Stream::Stdout};
use std::path::PathBuf;

#[derive(Args)]
pub struct ListArgs {
    /// An input VP file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let vp = super::open_read(&self.file)?;

        for line in vp.listing().entries() {
            if line.node.is_dir() {
                println!(
                    "{}{}",
                    line.indent(),
                    line.label()
                        .if_supports_color(Stdout, |n| n.bold().blue().to_string())
                );
            } else {
                println!("{line}");
            }
        }

        Ok(())
    }
}
