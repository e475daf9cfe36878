use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

mod commands;
mod config;

use commands::Session;
use commands::cat::CatCommand;
use commands::copy::CopyCommand;
use commands::demo::DemoCommand;
use commands::serve::ServeCommand;
use commands::sleep::SleepCommand;
use commands::stat::StatCommand;

#[derive(Parser)]
#[command(name = "otter-uv", version, about = "Drive the otter-uv event loop from the shell")]
struct Cli {
    /// Path to an otter-uv.toml (searched upwards from the cwd by default)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace); RUST_LOG still applies
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a file
    Cat(CatCommand),
    /// Copy a file
    Copy(CopyCommand),
    /// Show file status
    Stat(StatCommand),
    /// Listen for TCP connections and report them
    Serve(ServeCommand),
    /// Wait on a timer
    Sleep(SleepCommand),
    /// Run the walkthrough of every operation
    Demo(DemoCommand),
}

// The loop owns its own runtime and blocks the calling thread while it runs,
// so main stays synchronous.
fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = config::load_config(cli.config.as_deref())?;
    let session = Session::new(config.uv)?;

    match &cli.command {
        Commands::Cat(cmd) => cmd.run(&session)?,
        Commands::Copy(cmd) => cmd.run(&session)?,
        Commands::Stat(cmd) => cmd.run(&session)?,
        Commands::Serve(cmd) => cmd.run(&session)?,
        Commands::Sleep(cmd) => cmd.run(&session)?,
        Commands::Demo(cmd) => cmd.run(&session)?,
    }

    session.close()
}
