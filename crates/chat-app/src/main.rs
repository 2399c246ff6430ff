use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use gatito::{LaunchOptions, launch};

/// Streaming companion chat in the terminal.
#[derive(Debug, Parser)]
#[command(name = "gatito", version, about)]
struct Cli {
    /// Settings file to use instead of the one in the user config directory.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Keep history in memory for this run only.
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let options = LaunchOptions {
        config_path: cli.config,
        ephemeral: cli.ephemeral,
    };

    match launch(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "chat exited with an error");
            eprintln!("gatito: {error}");
            ExitCode::FAILURE
        }
    }
}
