//! # Wind Harvest CLI (`windh`)
//!
//! ## Usage
//!
//! ```bash
//! windh --config ./config/windh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `windh serve` | Start the HTTP API and the periodic harvester |
//! | `windh harvest` | Run one harvest/backfill cycle and print its report |
//! | `windh latest` | Show the newest archived snapshot |
//! | `windh nearest <time>` | Show the snapshot nearest to a time |
//! | `windh stamp <time>` | Print the canonical stamp for a time |
//! | `windh list` | List archived stamps |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use wind_harvest::{config, logging, lookup, pipeline, scheduler, server};
use wind_harvest_core::stamp::{parse_time, Interval, Stamp};

/// Wind Harvest CLI: GFS wind snapshot harvester and archive.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/windh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "windh",
    about = "Wind Harvest: harvest, archive and look up GFS wind snapshots",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/windh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    ///
    /// Unless `--no-harvest` is given, a harvest cycle also runs at startup
    /// and then every `harvest.tick_secs`.
    Serve {
        /// Serve lookups only; do not harvest.
        #[arg(long)]
        no_harvest: bool,
    },

    /// Run one harvest/backfill cycle now.
    Harvest,

    /// Show the newest archived snapshot.
    Latest {
        /// Print the artifact content instead of its stamp and path.
        #[arg(long)]
        body: bool,
    },

    /// Show the archived snapshot nearest to a time.
    ///
    /// Steps backward from the time first, then forward.
    Nearest {
        /// ISO 8601 time, e.g. `2024-11-25T08:00:00Z`.
        time: String,

        /// Give up once the search is this many whole days from the time.
        #[arg(long)]
        limit_days: Option<u32>,

        /// Print the artifact content instead of its stamp and path.
        #[arg(long)]
        body: bool,
    },

    /// Print the canonical stamp for a time.
    Stamp {
        /// ISO 8601 time.
        time: String,

        /// Snapshot interval in hours.
        #[arg(long, default_value_t = 6)]
        interval_hours: u32,
    },

    /// List archived stamps, oldest first.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    // Commands that don't require config
    if let Commands::Stamp {
        time,
        interval_hours,
    } = &cli.command
    {
        let interval = Interval::new(*interval_hours)?;
        let at = parse_time(time).ok_or_else(|| anyhow::anyhow!("invalid time: '{}'", time))?;
        println!("{}", Stamp::from_time(at, interval));
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve { no_harvest } => {
            let harvesting = if no_harvest {
                None
            } else {
                let harvest = Arc::new(pipeline::HarvestPipeline::from_config(&cfg)?);
                Some(scheduler::spawn(harvest, cfg.harvest.tick()))
            };
            let served = server::run_server(&cfg).await;
            if let Some(handle) = harvesting {
                handle.abort();
            }
            served?;
        }
        Commands::Harvest => {
            pipeline::run_harvest(&cfg).await?;
        }
        Commands::Latest { body } => {
            lookup::run_latest(&cfg, body).await?;
        }
        Commands::Nearest {
            time,
            limit_days,
            body,
        } => {
            lookup::run_nearest(&cfg, &time, limit_days, body).await?;
        }
        Commands::List => {
            lookup::run_list(&cfg).await?;
        }
        Commands::Stamp { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
