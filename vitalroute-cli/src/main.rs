//! VitalRoute command-line front end.
//!
//! ```text
//! vitalroute resolve "Hospital Municipal, São Carlos"
//! vitalroute suggest "Rua Episc"
//! vitalroute route "-22.0175,-47.8908" "Rua Episcopal, 1200"
//! vitalroute reverse -22.0175 -47.8908
//! vitalroute track drive.jsonl --to "Hospital Municipal"
//! vitalroute config set geocoding.geoapify_api_key <key>
//! ```

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use vitalroute::config::ConfigFile;
use vitalroute::logging::init_logging;

use commands::config::ConfigCommands;
use commands::track::TrackOptions;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "vitalroute", version, about = "Address resolution and live routing for dispatch")]
struct Cli {
    /// Log level or filter directive; overrides logging.level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve an address to coordinates
    Resolve {
        /// Free-text address
        address: String,
    },

    /// Suggest addresses for partial input
    Suggest {
        /// Partial address
        text: String,
    },

    /// Compute a driving route
    Route {
        /// Origin address or "lat,lon"
        #[arg(allow_hyphen_values = true)]
        from: String,

        /// Destination address or "lat,lon"
        #[arg(allow_hyphen_values = true)]
        to: String,

        /// Print every route point
        #[arg(long)]
        geometry: bool,
    },

    /// Describe a coordinate as a readable address
    #[command(allow_negative_numbers = true)]
    Reverse {
        /// Latitude in degrees
        lat: f64,

        /// Longitude in degrees
        lon: f64,
    },

    /// Replay a JSON-lines position log against a headless map
    Track {
        /// Position log, one JSON object per line
        file: PathBuf,

        /// Destination address or "lat,lon"
        #[arg(long, allow_hyphen_values = true)]
        to: String,

        /// Milliseconds between samples
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,

        /// Milliseconds to wait for late routes after the last sample
        #[arg(long, default_value_t = 3_000)]
        settle_ms: u64,
    },

    /// View or modify configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let command = match cli.command {
        Commands::Config(command) => return commands::config::run(command),
        command => command,
    };

    let mut config = ConfigFile::load()?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    // Before the runtime so the local UTC offset can be read.
    let _guard = init_logging(&config.logging)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(dispatch(command, config))
}

async fn dispatch(command: Commands, config: ConfigFile) -> Result<(), CliError> {
    use commands::{geocode, route, track, with_engine};

    match command {
        Commands::Resolve { address } => {
            with_engine(&config, |engine| geocode::run_resolve(engine, address)).await
        }
        Commands::Suggest { text } => {
            with_engine(&config, |engine| geocode::run_suggest(engine, text)).await
        }
        Commands::Route { from, to, geometry } => {
            with_engine(&config, |engine| route::run(engine, from, to, geometry)).await
        }
        Commands::Reverse { lat, lon } => {
            with_engine(&config, |engine| geocode::run_reverse(engine, lat, lon)).await
        }
        Commands::Track {
            file,
            to,
            interval_ms,
            settle_ms,
        } => {
            let options = TrackOptions {
                file,
                destination: to,
                interval: Duration::from_millis(interval_ms),
                settle: Duration::from_millis(settle_ms),
            };
            with_engine(&config, |engine| track::run(engine, options)).await
        }
        Commands::Config(command) => commands::config::run(command),
    }
}
