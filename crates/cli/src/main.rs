//! netkeeper CLI - run a single network probe from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use netkeeper_core::config::{Config, LogFormat, LogLevel, LoggingConfig};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
    Layer,
};

mod commands;
mod output;

/// netkeeper - network endpoint probes
#[derive(Parser, Debug)]
#[command(name = "netkeeper")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ping, connect and download probes for monitoring tasks")]
pub struct Cli {
    /// Configuration file (.json, .toml or .yaml)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode
    #[arg(short = 'q', long = "quiet", global = true)]
    quiet: bool,

    /// Print the result as JSON
    #[arg(long = "json", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ping a host with the system ping command
    Ping {
        /// Host name or IP address
        address: String,
    },

    /// Open TCP connections to a port
    Connect {
        /// Host name or IP address
        address: String,
        /// TCP port
        port: u16,
    },

    /// Download a URL, aborting if the owning task stops
    Download {
        /// URL to fetch
        url: String,

        /// SQLite task database the download belongs to
        #[arg(long = "db", value_name = "PATH", requires = "task_id")]
        db: Option<PathBuf>,

        /// Task id inside the database
        #[arg(long = "task-id", value_name = "ID", requires = "db")]
        task_id: Option<i64>,

        /// Directory to store the file in
        #[arg(long = "dir", value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Keep the file after the transfer
        #[arg(long = "keep")]
        keep: bool,

        /// Do not follow redirects
        #[arg(long = "no-redirects")]
        no_redirects: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let config = Config::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            Some(config)
        }
        None => None,
    };

    init_logging(&cli, config.as_ref().map(|config| &config.logging))
        .context("Failed to initialize logging")?;

    info!("netkeeper CLI starting");
    debug!("CLI arguments: {:?}", cli);

    let config = config.unwrap_or_default();
    let outcome = commands::execute(&cli.command, config).await?;
    output::print_outcome(&outcome, cli.json)?;

    if !outcome.is_success() {
        if !cli.quiet && !cli.json {
            eprintln!("{}", "Probe failed".red().bold());
        }
        std::process::exit(2);
    }

    Ok(())
}

/// Initialize logging from CLI flags, falling back to the configured level
fn init_logging(cli: &Cli, logging: Option<&LoggingConfig>) -> Result<()> {
    let log_level = if cli.quiet {
        tracing::Level::ERROR
    } else {
        match cli.verbose {
            0 => logging.map(|l| to_level(l.level)).unwrap_or(tracing::Level::WARN),
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    };

    let defaults = LoggingConfig::default();
    let logging = logging.unwrap_or(&defaults);

    tracing_subscriber::registry()
        .with(fmt_layer(logging).with_filter(LevelFilter::from_level(log_level)))
        .try_init()
        .context("A global subscriber is already installed")?;

    Ok(())
}

/// Formatter for the configured log format, writing to stderr
fn fmt_layer<S>(logging: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_target(logging.module_names)
        .with_level(true)
        .with_writer(std::io::stderr);

    match (logging.format, logging.timestamps) {
        (LogFormat::Json, true) => layer.json().boxed(),
        (LogFormat::Json, false) => layer.json().without_time().boxed(),
        (LogFormat::Human, true) => layer.boxed(),
        (LogFormat::Human, false) => layer.without_time().boxed(),
    }
}

fn to_level(level: LogLevel) -> tracing::Level {
    match level {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
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
    fn test_parse_download_flags() {
        let cli = Cli::try_parse_from([
            "netkeeper",
            "--json",
            "download",
            "http://example.com/a.bin",
            "--db",
            "tasks.db",
            "--task-id",
            "7",
            "--keep",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Command::Download {
                url,
                db,
                task_id,
                keep,
                no_redirects,
                ..
            } => {
                assert_eq!(url, "http://example.com/a.bin");
                assert_eq!(db, Some(PathBuf::from("tasks.db")));
                assert_eq!(task_id, Some(7));
                assert!(keep);
                assert!(!no_redirects);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_db_requires_task_id() {
        let result = Cli::try_parse_from(["netkeeper", "download", "http://x/", "--db", "t.db"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(to_level(LogLevel::Debug), tracing::Level::DEBUG);
        assert_eq!(to_level(LogLevel::Error), tracing::Level::ERROR);
    }
}
