//! cast-publish - Publish due content to its platform targets
//!
//! One-shot batch run meant to be driven by cron or a systemd timer.

use clap::Parser;
use libcastwork::logging::LoggingConfig;
use libcastwork::{CastworkError, CastworkService, Config, Result, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "cast-publish")]
#[command(version)]
#[command(about = "Publish due content to its platform targets")]
#[command(long_about = "\
cast-publish - Publish due content to its platform targets

DESCRIPTION:
    cast-publish performs one publish run: it selects content whose scheduled
    time has arrived, validates each platform target (credentials, media
    requirements), publishes through the platform adapter, and reconciles the
    per-target outcomes into the content item's status.

    Only one publish run may be active at a time. A second run started while
    the first still holds the lease exits with code 4.

USAGE EXAMPLES:
    # Publish everything that is due
    cast-publish

    # Show what would be published without touching anything
    cast-publish --dry-run

    # Publish one client's Instagram content, at most 10 items
    cast-publish --client acme --platform instagram --limit 10

    # Machine-readable report
    cast-publish --format json

CONFIGURATION:
    Configuration file: ~/.config/castwork/config.toml
    Database location: ~/.local/share/castwork/castwork.db

    Override with environment variables:
        CASTWORK_CONFIG      - Path to config file
        CASTWORK_DB_PATH     - Path to database file
        CASTWORK_LOG_FORMAT  - text, json or pretty
        CASTWORK_LOG_LEVEL   - error, warn, info, debug or trace

EXIT CODES:
    0 - Run finished without target failures (skips are not failures)
    1 - At least one target failed to publish
    2 - Database or configuration error
    3 - Invalid input (bad limit, platform, format)
    4 - Another publish run is in progress
")]
struct Cli {
    /// Validate and report only; nothing is published or written
    #[arg(long)]
    dry_run: bool,

    /// Publish despite validation failures (reported as warnings)
    #[arg(long)]
    force: bool,

    /// Only content belonging to this client
    #[arg(long, value_name = "ID")]
    client: Option<String>,

    /// Only targets on this platform
    #[arg(short, long, value_name = "NAME")]
    platform: Option<String>,

    /// Maximum number of content items (defaults to publish.batch_limit)
    #[arg(short, long, value_name = "N")]
    limit: Option<usize>,

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
        lookback_days: None,
    };
    options.validate()?;

    let config = Config::load()?;
    let service = CastworkService::from_config(config).await?;

    let report = service.publishing().run(&options).await?;

    if cli.format == "json" {
        println!("{}", report.render_json());
    } else {
        print!("{}", report.render_text());
    }

    Ok(report.exit_code())
}
