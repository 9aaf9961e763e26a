//! RuQaD monitor - Main entry point

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ruqad_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use ruqad_common::timestamp::parse_timestamp;
use ruqad_monitor::config::{CatalogConfig, KadiConfig, PipelineConfig};
use ruqad_monitor::crawler::{HttpCatalog, ValidateAndPublish};
use ruqad_monitor::kadi::{collect_records_created_after, download_eln_for, KadiClient, RecordId};
use ruqad_monitor::quality::{CheckOutcome, QualityChecker};
use ruqad_monitor::storage::config::StorageConfig;
use ruqad_monitor::{Monitor, MonitorConfig};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

/// RuQaD - quality-gated ingestion of research data records
#[derive(Parser, Debug)]
#[command(name = "ruqad")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the repository and process new records until interrupted
    Monitor,

    /// Print the ids of records created after a timestamp
    Collect {
        /// Exclusive lower bound, e.g. "2024-11-20T10:00:00+00:00"
        #[arg(long)]
        after: String,
    },

    /// Export one record as an .eln archive
    Export {
        #[arg(long)]
        record: RecordId,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run the quality pipeline on one file
    Check {
        #[arg(short, long)]
        file: PathBuf,

        /// Where the report bundle is written
        #[arg(long, default_value = ".")]
        target_dir: PathBuf,
    },

    /// Validate a staging directory and publish it to the catalog
    Crawl {
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        })
        .output(LogOutput::Console)
        .log_file_prefix("ruqad")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _guard = init_logging(&log_config).ok().flatten();

    if let Err(e) = execute_command(cli.command).await {
        error!(error = %format!("{:#}", e), "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Monitor => run_monitor().await,
        Commands::Collect { after } => {
            let cursor = parse_timestamp(&after)?;
            let client = KadiClient::new(&KadiConfig::from_env()?)?;
            for record in collect_records_created_after(&client, cursor).await? {
                println!("{}", record.id);
            }
            Ok(())
        },
        Commands::Export { record, output } => {
            let client = KadiClient::new(&KadiConfig::from_env()?)?;
            download_eln_for(&client, record, &output).await?;
            println!("{}", output.display());
            Ok(())
        },
        Commands::Check { file, target_dir } => {
            let checker =
                QualityChecker::from_config(&PipelineConfig::from_env()?, StorageConfig::from_env()?)?;
            match checker.check(&file, &target_dir).await? {
                CheckOutcome::Passed { artifact } => {
                    println!("passed: {}", artifact.display());
                    Ok(())
                },
                CheckOutcome::Failed(failure) => bail!("quality check failed: {}", failure),
            }
        },
        Commands::Crawl { dir } => {
            let catalog = Arc::new(HttpCatalog::new(&CatalogConfig::from_env())?);
            let outcome = ValidateAndPublish::new(catalog)?.process(&dir).await?;
            for check in &outcome.quality_checks {
                println!(
                    "{}\tlicense={}\ttotal={}\tpassing={}",
                    check.eln_file,
                    check.fair_license_check,
                    check.num_total_checks.map_or("-".to_string(), |n| n.to_string()),
                    check.num_passing_checks.map_or("-".to_string(), |n| n.to_string()),
                );
            }
            if !outcome.validated {
                bail!("validation failed, nothing was published");
            }
            Ok(())
        },
    }
}

async fn run_monitor() -> Result<()> {
    let config = MonitorConfig::load().context("Failed to load configuration")?;
    let monitor = Monitor::from_config(&config)?;
    let cursor = monitor.initial_cursor(config.cycle.start_cursor).await?;

    info!(
        cursor = %cursor,
        poll_interval_secs = config.cycle.poll_interval_secs,
        max_records = config.cycle.max_records_per_cycle,
        failure_policy = %config.cycle.failure_policy,
        "Starting monitor"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("Interrupt received, shutting down");
    };

    monitor.run(cursor, shutdown).await;
    Ok(())
}
