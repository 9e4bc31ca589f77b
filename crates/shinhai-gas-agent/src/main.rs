//! ShinHai Gas agent entry point.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use shinhai_gas_agent::config::{resolve, Overrides};
use shinhai_gas_agent::{fetch_once, info, parse_file, serve};

#[derive(Parser)]
#[command(
    name = "shinhai-gas-agent",
    about = "Poll ShinHai Gas bills and publish them as sensor snapshots",
    version
)]
struct Cli {
    /// Eleven-digit customer number.
    #[arg(short, long)]
    account: Option<String>,

    /// Bill query URL.
    #[arg(long)]
    endpoint: Option<String>,

    /// Path to a JSON config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds between normal scans.
    #[arg(long)]
    scan_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll on schedule and print every snapshot as a JSON line (default).
    ///
    /// Send SIGHUP after refreshing credentials to clear an expired session.
    Serve,

    /// Run one forced poll and print the snapshot.
    Fetch,

    /// Parse a saved bill page and print the snapshot it would produce.
    Parse {
        /// HTML file to read.
        file: PathBuf,
    },

    /// Print the resolved configuration as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   shinhai-gas-agent completions bash > ~/.local/share/bash-completion/completions/shinhai-gas-agent
    ///   shinhai-gas-agent completions zsh > ~/.zfunc/_shinhai-gas-agent
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let overrides = Overrides {
        account: cli.account,
        endpoint: cli.endpoint,
        config: cli.config,
        scan_interval_secs: cli.scan_secs,
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = resolve(overrides)?;
            serve(&config).await?;
        }

        Commands::Fetch => {
            let config = resolve(overrides)?;
            let snapshot = fetch_once(&config).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }

        Commands::Parse { file } => {
            let config = resolve(overrides)?;
            let snapshot = parse_file(&file, &config.account)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }

        Commands::Info => {
            let config = resolve(overrides)?;
            println!("{}", serde_json::to_string_pretty(&info(&config))?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "shinhai-gas-agent", &mut std::io::stdout());
        }
    }

    Ok(())
}
