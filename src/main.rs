use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use etl_monitor::core::{
    ChannelListener, JobHistoryEntry, JobSnapshot, MonitorEvent, format_duration, metrics,
};
use etl_monitor::logging::{self, LogConfig};
use etl_monitor::{adapters, config, context::AppContext};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "etl-monitor")]
#[command(about = "Track ETL batch jobs and keep a reconciled job history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    overrides: ConfigArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll a job until it finishes and record it in history
    Track(TrackArgs),
    /// Show recorded jobs, newest first
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Fold fallback records into the history list
    Reconcile,
    /// Delete all recorded jobs
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args)]
struct TrackArgs {
    job_id: String,

    #[arg(long)]
    file_name: Option<String>,

    #[arg(long)]
    file_type: Option<String>,
}

#[derive(Args, Serialize)]
struct ConfigArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    api_base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    database_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    ephemeral: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    simulation: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::AppConfig::new(Some(&cli.overrides)).context("Failed to load configuration")?;
    logging::init(LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
    });

    let store = adapters::open_store(&config.database_path, config.ephemeral).await?;
    let source = adapters::status_source(
        &config.api_base_url,
        config.request_timeout(),
        config.simulation,
    )
    .context("Failed to build status client")?;
    let ctx = AppContext::new(config, store, source);

    match &cli.command {
        Commands::Track(args) => run_track(ctx, args).await.context("Failed to track job")?,
        Commands::History { limit } => run_history(ctx, *limit).await,
        Commands::Reconcile => run_reconcile(ctx).await,
        Commands::Clear { yes } => run_clear(ctx, *yes).await?,
    }

    Ok(())
}

async fn run_track(ctx: AppContext, args: &TrackArgs) -> Result<()> {
    ctx.history.load().await;

    let (listener, mut events) = ChannelListener::new();
    ctx.events.subscribe(listener);
    ctx.tracker.track(
        &args.job_id,
        args.file_name.as_deref(),
        args.file_type.as_deref(),
    )?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                ctx.tracker.stop();
                println!("Stopped tracking {}", args.job_id);
                return Ok(());
            }
            event = events.recv() => match event {
                Some(MonitorEvent::Snapshot(snapshot)) => print_snapshot(&snapshot),
                Some(MonitorEvent::JobCompleted(entry)) => {
                    println!();
                    print_entry(&entry);
                    return Ok(());
                }
                Some(MonitorEvent::HistoryChanged(_)) => {}
                None => bail!("event stream closed before job finished"),
            }
        }
    }
}

async fn run_history(ctx: AppContext, limit: Option<usize>) {
    let entries = ctx.history.load().await;
    if entries.is_empty() {
        println!("No job history available");
        return;
    }

    let shown = limit.unwrap_or(entries.len());
    for entry in entries.iter().take(shown) {
        print_entry(entry);
        println!();
    }
}

async fn run_reconcile(ctx: AppContext) {
    let entries = ctx.history.load().await;
    println!("History holds {} job(s)", entries.len());
}

async fn run_clear(ctx: AppContext, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("refusing to clear job history without --yes");
    }
    ctx.history.load().await;
    ctx.history.clear().await;
    println!("Job history cleared");
    Ok(())
}

fn print_snapshot(snapshot: &JobSnapshot) {
    let totals = metrics::totals(&snapshot.steps);
    let elapsed = snapshot
        .start_time
        .map(|start| (snapshot.end_time.unwrap_or_else(chrono::Utc::now) - start).num_milliseconds());

    println!(
        "[{}] {} | elapsed {} | threads {} | read {} write {} filter {} skip {}",
        snapshot.job_id,
        snapshot.status,
        format_duration(elapsed),
        snapshot
            .threads_used
            .map(|t| t.to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        totals.read_count,
        totals.write_count,
        totals.filter_count,
        totals.skip_count,
    );

    for step in &snapshot.steps {
        println!(
            "    {:<20} {:<10} read {:>8} write {:>8} efficiency {:>5.1}% duration {}",
            if step.step_name.is_empty() {
                "Unknown Step"
            } else {
                step.step_name.as_str()
            },
            step.status,
            step.read_count,
            step.write_count,
            metrics::efficiency(step),
            format_duration(step.duration_ms()),
        );
    }
}

fn print_entry(entry: &JobHistoryEntry) {
    println!("{}  {}", entry.job_id, entry.status);
    println!("  File:      {} ({})", entry.file_name, entry.file_type);
    println!("  Recorded:  {}", entry.timestamp);
    println!(
        "  Duration:  {}",
        format_duration(Some(entry.duration_ms as i64))
    );
    println!(
        "  Threads:   {}",
        if entry.threads_used > 0 {
            entry.threads_used.to_string()
        } else {
            "N/A".to_string()
        }
    );
    println!(
        "  Records:   read {} / written {} / filtered {} / skipped {}",
        entry.read_count, entry.write_count, entry.filter_count, entry.skip_count
    );
}
