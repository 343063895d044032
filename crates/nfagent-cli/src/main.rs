//! `nfagent` - turn NF-e / NFS-e invoices into spreadsheet rows.
//!
//! A file is handed to a format extractor, the text goes to a tool-calling
//! model, and the record the model fills in is written as CSV.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{batch, config, process, serve};

/// Brazilian invoice agent - extract NF-e/NFS-e data into spreadsheets
#[derive(Parser)]
#[command(name = "nfagent")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "The API key is read from OPENAI_API_KEY (or the variable named by \
llm.api_key_env); a .env file in the working directory is loaded first.")]
struct Cli {
    /// Log agent activity (-v tool calls, -vv model turns, -vvv HTTP and parser detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one invoice and save it as a spreadsheet row
    Process(process::ProcessArgs),

    /// Extract every invoice matching a glob, in one session
    Batch(batch::BatchArgs),

    /// Accept invoice uploads over HTTP
    Serve(serve::ServeArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

/// Log filter for a `-v` count. Only the agent's own crates get louder until
/// `-vvv`, which also opens up dependencies.
fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "warn,nfagent=info,nfagent_core=info",
        2 => "warn,nfagent=debug,nfagent_core=debug,tower_http=debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    // RUST_LOG wins over -v when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose >= 2)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Process(args) => process::run(args, cli.config.as_deref()).await,
        Commands::Batch(args) => batch::run(args, cli.config.as_deref()).await,
        Commands::Serve(args) => serve::run(args, cli.config.as_deref()).await,
        Commands::Config(args) => config::run(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_is_global() {
        let cli = Cli::try_parse_from(["nfagent", "config", "path", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(log_filter(cli.verbose), "warn,nfagent=debug,nfagent_core=debug,tower_http=debug");
    }

    #[test]
    fn test_every_filter_parses() {
        for verbose in 0..4 {
            assert!(EnvFilter::try_new(log_filter(verbose)).is_ok());
        }
    }
}
