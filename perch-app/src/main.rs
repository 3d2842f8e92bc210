use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "perch", version, about = "Harvest and analyze an account's recent tweets")]
struct Cli {
    /// YAML configuration file; skipped when absent.
    #[arg(long, global = true, env = "PERCH_CONFIG", default_value = "perch.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Collect the trailing window of tweets into <data_dir>/<account>/tweets.csv.
    Fetch { account: String },
    /// Write keyword, engagement, posting and sentiment tables for a collected account.
    Analyze { account: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Fetch { account } => commands::fetch(&cli.config, &account).await,
        Command::Analyze { account } => commands::analyze(&cli.config, &account),
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "perch.failed");
        eprintln!("error: {err:#}");
        std::process::exit(commands::exit_code(&err));
    }
}
