//! Copy command - read one file and write its bytes to another.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use super::{Session, path_value};

#[derive(Args)]
pub struct CopyCommand {
    /// Source file
    pub from: PathBuf,
    /// Destination file (created or truncated)
    pub to: PathBuf,
}

impl CopyCommand {
    pub fn run(&self, session: &Session) -> Result<()> {
        let from = path_value(&self.from)?;
        let to = path_value(&self.to)?;

        let contents = session.settle(session.call("fsRead", &[from])?)?;
        let written = session.settle(session.call("fsWrite", &[to, contents])?)?;

        println!(
            "copied {} bytes: {} -> {}",
            written.as_number().unwrap_or_default(),
            self.from.display(),
            self.to.display()
        );
        Ok(())
    }
}
