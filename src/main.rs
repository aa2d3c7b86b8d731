//! scrobbled - main entry point

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scrobbled::config::Config;
use scrobbled::dispatch::Dispatcher;
use scrobbled::error::{Error, Result};
use scrobbled::notify::Notifier;
use scrobbled::poller::Poller;
use scrobbled::{display, sink, source};

#[derive(Parser)]
#[command(name = "scrobbled")]
#[command(author, version, about = "A simple music scrobbler daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch sources and send scrobbles to configured sinks
    Run,

    /// Print scrobbles recorded by the given sink
    Scrobbles {
        /// Sink name (run `scrobbled sinks` to list them)
        sink: String,

        /// Maximum number of scrobbles to display (0 = unlimited)
        #[arg(short, long, default_value = "10")]
        limit: i64,

        /// Only display scrobbles after this time (RFC 3339; default: 14 days ago)
        #[arg(short, long)]
        from: Option<String>,

        /// Only display scrobbles before this time (RFC 3339; default: now)
        #[arg(short, long)]
        to: Option<String>,
    },

    /// Show or create the configuration file
    Config {
        /// Print current configuration
        #[arg(long)]
        show: bool,

        /// Create default configuration file
        #[arg(long)]
        init: bool,
    },

    /// Print all configured sources
    Sources,

    /// Print all configured sinks
    Sinks,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load and validate configuration
    let mut config = if let Some(ref path) = cli.config {
        Config::load_from(path)?
    } else {
        Config::load()?
    };
    config.validate();

    match cli.command {
        Commands::Run => run_daemon(config).await,

        Commands::Scrobbles {
            sink,
            limit,
            from,
            to,
        } => run_scrobbles(&config, &sink, limit, from.as_deref(), to.as_deref()).await,

        Commands::Config { show, init } => {
            if init {
                let default_config = Config::default();
                default_config.save()?;
                println!(
                    "Created default configuration at {}",
                    Config::config_path()?.display()
                );
            } else if show {
                let contents = toml::to_string_pretty(&config)?;
                println!("{contents}");
            } else {
                println!("Configuration path: {}", Config::config_path()?.display());
            }
            Ok(())
        }

        Commands::Sources => {
            for source in source::from_config(&config.sources).await {
                println!("{}", source.name());
            }
            Ok(())
        }

        Commands::Sinks => {
            for sink in sink::from_config(&config.sinks) {
                println!("{}", sink.name());
            }
            Ok(())
        }
    }
}

async fn run_daemon(config: Config) -> Result<()> {
    let sources = source::from_config(&config.sources).await;
    let sinks = sink::from_config(&config.sinks);

    let notifier = match Notifier::connect().await {
        Ok(notifier) => Some(notifier),
        Err(e) => {
            tracing::warn!(error = %e, "desktop notifications unavailable");
            None
        }
    };

    let dispatcher = Dispatcher::new(
        sinks,
        notifier,
        config.notify_on_scrobble,
        config.notify_on_error,
    );

    let mut poller = Poller::new(&config, sources, dispatcher);
    poller.run().await;

    tracing::info!("scrobbled stopped");
    Ok(())
}

async fn run_scrobbles(
    config: &Config,
    sink_name: &str,
    limit: i64,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<()> {
    let from = parse_bound(from, Utc::now() - Duration::days(14))?;
    let to = parse_bound(to, Utc::now())?;

    let sinks = sink::from_config(&config.sinks);
    let sink = sinks
        .iter()
        .find(|s| s.name() == sink_name)
        .ok_or_else(|| {
            Error::config("invalid sink name (run `scrobbled sinks` to list all configured sinks)")
        })?;

    let scrobbles = sink.scrobbles(limit, from, to).await?;
    display::print_scrobbles(&scrobbles);

    Ok(())
}

fn parse_bound(value: Option<&str>, default: DateTime<Utc>) -> Result<DateTime<Utc>> {
    match value {
        None => Ok(default),
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::config(format!("invalid timestamp {text:?}: {e}"))),
    }
}
