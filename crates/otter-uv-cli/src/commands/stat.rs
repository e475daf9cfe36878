//! Stat command - print file status as JSON.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use super::{Session, path_value};

#[derive(Args)]
pub struct StatCommand {
    /// Files to stat
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

impl StatCommand {
    pub fn run(&self, session: &Session) -> Result<()> {
        // Issue everything first so the stats run concurrently.
        let promises = self
            .paths
            .iter()
            .map(|path| session.call("fsStat", &[path_value(path)?]))
            .collect::<Result<Vec<_>>>()?;

        let mut failed = 0;
        for (path, promise) in self.paths.iter().zip(promises) {
            match session.settle(promise) {
                Ok(stat) => {
                    let mut json = stat.to_json();
                    if let Some(object) = json.as_object_mut() {
                        object.insert("path".into(), path.display().to_string().into());
                    }
                    println!("{}", serde_json::to_string_pretty(&json)?);
                }
                Err(err) => {
                    failed += 1;
                    eprintln!("{}: {}", path.display(), err);
                }
            }
        }

        if failed > 0 {
            anyhow::bail!("{} of {} paths could not be read", failed, self.paths.len());
        }
        Ok(())
    }
}
