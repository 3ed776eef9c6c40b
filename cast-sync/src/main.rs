//! cast-sync - Pull performance metrics for recently published content
//!
//! One-shot batch run; every successful fetch appends a new analytics
//! snapshot.

use clap::Parser;
use libcastwork::logging::LoggingConfig;
use libcastwork::{CastworkError, CastworkService, Config, Result, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "cast-sync")]
#[command(version)]
#[command(about = "Pull performance metrics for recently published content")]
#[command(long_about = "\
cast-sync - Pull performance metrics for recently published content

DESCRIPTION:
    cast-sync performs one analytics sync run: it selects platform targets
    published within the lookback window, skips those synced more recently
    than the freshness window, fetches current metrics from each platform
    and appends them as a new snapshot. Earlier snapshots are never changed.

    Only one analytics run may be active at a time. A second run started
    while the first still holds the lease exits with code 4.

USAGE EXAMPLES:
    # Sync everything published in the last week
    cast-sync

    # Look back a full month, ignoring the freshness window
    cast-sync --lookback-days 30 --force

    # One client's Facebook targets only
    cast-sync --client acme --platform facebook

CONFIGURATION:
    Configuration file: ~/.config/castwork/config.toml
    Database location: ~/.local/share/castwork/castwork.db

    [analytics]
    lookback_days = 7   # how far back published targets are considered
    freshness = \"1h\"    # minimum time between snapshots of one target

    Override with environment variables:
        CASTWORK_CONFIG      - Path to config file
        CASTWORK_DB_PATH     - Path to database file
        CASTWORK_LOG_FORMAT  - text, json or pretty
        CASTWORK_LOG_LEVEL   - error, warn, info, debug or trace

EXIT CODES:
    0 - Run finished without fetch failures (skips are not failures)
    1 - At least one metrics fetch failed
    2 - Database or configuration error
    3 - Invalid input (bad limit, lookback, platform, format)
    4 - Another analytics run is in progress
")]
struct Cli {
    /// Validate and report only; no platform calls, no snapshots
    #[arg(long)]
    dry_run: bool,

    /// Sync despite the freshness window and validation failures
    #[arg(long)]
    force: bool,

    /// Only targets belonging to this client
    #[arg(long, value_name = "ID")]
    client: Option<String>,

    /// Only targets on this platform
    #[arg(short, long, value_name = "NAME")]
    platform: Option<String>,

    /// Maximum number of targets (defaults to analytics.batch_limit)
    #[arg(short, long, value_name = "N")]
    limit: Option<usize>,

    /// Days of published content to consider (defaults to analytics.lookback_days)
    #[arg(long, value_name = "DAYS")]
    lookback_days: Option<u32>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    if cli.format != "text" && cli.format != "json" {
        return Err(CastworkError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            cli.format
        )));
    }

    let options = RunOptions {
        dry_run: cli.dry_run,
        force: cli.force,
        client_id: cli.client,
        platform: cli.platform.map(|p| p.to_lowercase()),
        limit: cli.limit,
        lookback_days: cli.lookback_days,
    };
    options.validate()?;

    let config = Config::load()?;
    let service = CastworkService::from_config(config).await?;

    let report = service.analytics().run(&options).await?;

    if cli.format == "json" {
        println!("{}", report.render_json());
    } else {
        print!("{}", report.render_text());
    }

    Ok(report.exit_code())
}
