//! Cat command - read a file through the loop and print it.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use super::{Session, path_value};

#[derive(Args)]
pub struct CatCommand {
    /// File to read
    pub path: PathBuf,
}

impl CatCommand {
    pub fn run(&self, session: &Session) -> Result<()> {
        let promise = session.call("fsRead", &[path_value(&self.path)?])?;
        let contents = session.settle(promise)?;

        let bytes = contents
            .as_array_buffer()
            .ok_or_else(|| anyhow::anyhow!("fsRead resolved with {}", contents.type_name()))?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(bytes.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}
