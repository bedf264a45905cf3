use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "kelpie",
    version,
    about = "Control plane for SeaweedFS-style storage clusters",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control plane server
    Serve {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate configuration and print the cluster layout
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            kelpie::commands::serve::run(config.as_deref(), cli.log_format.as_deref(), cli.verbose)
                .await?;
        }
        Commands::Check { config } => {
            kelpie::commands::check::run(
                config.as_deref(),
                cli.log_format.as_deref(),
                cli.verbose,
            )?;
        }
    }

    Ok(())
}
