use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ai_client::{ChatModel, Claude, OpenRouter};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use refinery_admission::AdmissionEngine;
use refinery_audit::{ChatModelCaller, EvaluatorRegistry, Orchestrator};
use refinery_common::{load_config, FileConfig, Provider, Secrets};
use refinery_factory::{freshness_report, Cycle, Harvester, Ingestor};
use refinery_ledger::{AppendLog, GitSync, SignalArchive};
use refinery_store::PgSignalStore;

#[derive(Parser)]
#[command(name = "refinery", about = "Signal refinery: ingest, rank and audit collector signals")]
struct Cli {
    /// Path to config TOML file
    #[arg(long, default_value = "refinery.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the collector inbox into the record store
    Ingest {
        #[arg(long)]
        inbox: Option<PathBuf>,
    },
    /// Admit fresh signals and audit them into the ledger
    Run,
    /// Report per-source staleness
    Freshness,
    /// Delete stored signals past retention
    Harvest {
        #[arg(long)]
        days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let config = read_config(&cli)?;
    let secrets = Secrets::from_env();
    secrets.log_redacted();

    match cli.command {
        Command::Ingest { inbox } => {
            config.validate()?;
            let store = connect(&secrets).await?;
            let inbox = inbox.unwrap_or_else(|| config.ingest.inbox.clone());
            let report = Ingestor::new(store)
                .with_chunk_size(config.ingest.chunk_size)
                .ingest_dir(&inbox)
                .await?;
            info!(
                inserted = report.inserted(),
                failed_files = report.failed_files,
                unrouted_files = report.unrouted_files,
                "Ingest complete"
            );
        }
        Command::Run => {
            config.validate_for_run()?;
            let api_key = secrets.require_api_key(config.audit.provider)?;
            let store = connect(&secrets).await?;

            let chat: Arc<dyn ChatModel> = match config.audit.provider {
                Provider::Claude => Arc::new(Claude::new(api_key)),
                Provider::OpenRouter => Arc::new(OpenRouter::new(api_key)),
            };
            let caller = ChatModelCaller::new(
                chat,
                Duration::from_secs(config.audit.call_timeout_secs),
            );
            let registry = EvaluatorRegistry::from_config(&config.evaluators)?;
            info!(
                provider = %config.audit.provider,
                evaluators = registry.len(),
                "Evaluator panel ready"
            );
            let orchestrator = Orchestrator::new(registry, Arc::new(caller))
                .with_pool_size(config.audit.pool_size)
                .with_batch_size(config.audit.batch_size);

            let log = Arc::new(AppendLog::from_config(&config.ledger)?);
            let mut cycle = Cycle::new(
                store,
                AdmissionEngine::from_config(&config.admission),
                orchestrator,
                log,
            )
            .with_window(
                chrono::Duration::minutes(config.admission.window_minutes),
                config.admission.candidate_limit,
            );
            if config.ledger.sync {
                cycle = cycle.with_sync(Arc::new(GitSync::from_config(&config.ledger)));
            } else {
                info!("Ledger sync disabled, appending locally only");
            }

            let report = cycle.run(Utc::now()).await?;
            let audit = &report.audit;
            info!(
                candidates = report.candidates,
                admitted = report.admission.map(|s| s.admitted).unwrap_or(0),
                records = audit.records,
                skipped_seen = audit.skipped_seen,
                failures = audit.failures,
                drifted = audit.drifted,
                flush_failures = audit.flush_failures,
                syncs_ok = audit.syncs_ok,
                syncs_failed = audit.syncs_failed,
                "Cycle complete"
            );
        }
        Command::Freshness => {
            let store = connect(&secrets).await?;
            let report = freshness_report(store.as_ref(), &config.freshness, Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Harvest { days } => {
            let store = connect(&secrets).await?;
            let days = days.unwrap_or(config.retention.days);
            let mut harvester = Harvester::new(store)
                .with_archive(Arc::new(SignalArchive::from_config(&config.ledger)));
            if config.ledger.sync {
                let sync = GitSync::from_config(&config.ledger);
                sync.heal().await?;
                harvester = harvester.with_sync(Arc::new(sync));
            }
            let report = harvester.run(days, Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("refinery=info".parse()?);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn read_config(cli: &Cli) -> Result<FileConfig> {
    if !cli.config.exists() {
        warn!(config = %cli.config.display(), "Config file not found, using defaults");
        return Ok(FileConfig::default());
    }
    info!(config = %cli.config.display(), "Loading config");
    load_config(&cli.config)
}

async fn connect(secrets: &Secrets) -> Result<Arc<PgSignalStore>> {
    let url = secrets.require_database_url()?;
    let store = PgSignalStore::connect(url)
        .await
        .context("Failed to connect to the record store")?;
    info!("Connected to database");
    Ok(Arc::new(store))
}
