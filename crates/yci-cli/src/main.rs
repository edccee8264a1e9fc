use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use yci_loadgen::{LoadgenConfig, ParquetSink, RowSink};
use yci_sync::{build_ingest_scheduler, IngestComponents, IngestConfig};
use yci_web::AppState;

#[derive(Debug, Parser)]
#[command(name = "yci")]
#[command(about = "YouTube comment ingestion, sentiment scoring and synthetic load")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch one page of comments and publish them.
    Ingest,
    /// Serve the HTTP endpoints, optionally with a cron-triggered ingestion.
    Serve {
        #[arg(long, env = "YCI_WEB_PORT", default_value_t = yci_web::DEFAULT_PORT)]
        port: u16,
        /// Six-field cron expression; overrides `ingest_cron` from the config.
        #[arg(long)]
        cron: Option<String>,
    },
    /// Score a single comment.
    Score {
        #[arg(long)]
        text: String,
    },
    /// Stream synthetic comment rows into the analytical sink.
    Loadgen(LoadgenArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SinkKind {
    Bigquery,
    Parquet,
}

#[derive(Debug, Args)]
struct LoadgenArgs {
    #[arg(long)]
    hours: Option<u64>,
    #[arg(long)]
    records_per_hour: Option<u64>,
    #[arg(long)]
    interval_secs: Option<u64>,
    #[arg(long)]
    max_backdate_minutes: Option<u32>,
    #[arg(long)]
    project: Option<String>,
    #[arg(long)]
    dataset: Option<String>,
    #[arg(long)]
    table: Option<String>,
    #[arg(long, value_enum, default_value_t = SinkKind::Bigquery)]
    sink: SinkKind,
    /// Output directory for the parquet sink.
    #[arg(long, default_value = "loadgen-out")]
    out: PathBuf,
}

impl LoadgenArgs {
    fn apply(&self, config: &mut LoadgenConfig) {
        if let Some(v) = self.hours {
            config.hours = v;
        }
        if let Some(v) = self.records_per_hour {
            config.records_per_hour = v;
        }
        if let Some(v) = self.interval_secs {
            config.interval_seconds = v;
        }
        if let Some(v) = self.max_backdate_minutes {
            config.max_backdate_minutes = v;
        }
        if let Some(v) = &self.project {
            config.project_id = v.clone();
        }
        if let Some(v) = &self.dataset {
            config.dataset = v.clone();
        }
        if let Some(v) = &self.table {
            config.table = v.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Ingest) {
        Commands::Ingest => {
            let summary = yci_sync::run_ingest_once_from_env().await?;
            println!(
                "ingest complete: run_id={} fetched={} published={} failed={}",
                summary.run_id, summary.total_fetched, summary.published_count, summary.failed_count
            );
        }
        Commands::Serve { port, cron } => serve(port, cron).await?,
        Commands::Score { text } => {
            let config = IngestConfig::from_env()?;
            let components = IngestComponents::from_config(&config)?;
            let result = components.scorer.score(&text).await?;
            println!(
                "score={:.3} magnitude={:.3} label={}",
                result.score,
                result.magnitude,
                result.label()
            );
        }
        Commands::Loadgen(args) => loadgen(args).await?,
    }

    Ok(())
}

async fn serve(port: u16, cron: Option<String>) -> Result<()> {
    let config = IngestConfig::from_env()?;
    let components = IngestComponents::from_config(&config)?;

    let mut scheduler = match cron.or_else(|| config.ingest_cron.clone()) {
        Some(expr) => {
            let sched = build_ingest_scheduler(components.pipeline.clone(), &expr).await?;
            sched.start().await.context("starting ingest scheduler")?;
            info!(cron = %expr, "scheduled ingestion enabled");
            Some(sched)
        }
        None => None,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    yci_web::serve(addr, AppState::new(components), async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    })
    .await?;

    if let Some(sched) = scheduler.as_mut() {
        sched.shutdown().await.context("stopping ingest scheduler")?;
    }
    Ok(())
}

async fn loadgen(args: LoadgenArgs) -> Result<()> {
    let mut config = LoadgenConfig::from_env()?;
    args.apply(&mut config);

    let sink: Arc<dyn RowSink> = match args.sink {
        SinkKind::Bigquery => Arc::new(config.bigquery_sink()?),
        SinkKind::Parquet => Arc::new(ParquetSink::new(args.out.clone())),
    };

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received; stopping after the current tick");
            let _ = tx.send(true);
        }
    });

    let summary = yci_loadgen::run_loadgen(&config, sink, Some(rx)).await?;
    println!(
        "loadgen {}: ticks={} rows={} failed_rows={} failed_batches={}",
        if summary.cancelled { "cancelled" } else { "complete" },
        summary.ticks_completed,
        summary.rows_generated,
        summary.rows_failed,
        summary.failed_batches
    );
    Ok(())
}
