use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::watch;
use stash_watcher_core::config::{self, AppConfig};
use stash_watcher_core::layout;
use stash_watcher_core::pipeline::{self, Pipeline};
use stash_watcher_core::poller::PollingCoordinator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(cfg).await,
        Commands::FixPerms { json } => run_fix_perms(cfg, json).await,
        Commands::Rescan { json, paths } => run_rescan(cfg, paths, json).await,
        Commands::WatchDirs { json } => run_watch_dirs(cfg, json).await,
    }
}

#[derive(Parser)]
#[command(name = "stash-watcher")]
#[command(about = "Keeps a Stash library in sync with the files on disk", long_about = None)]
struct Cli {
    /// Path to config file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch library roots and poll periodically until Ctrl-C (default)
    Run,
    /// Run one permission pass over the configured roots
    FixPerms {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Rescan the given paths (or the whole library) and run post-scan tasks
    Rescan {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
        /// Changed files or directories; none means a full rescan
        paths: Vec<PathBuf>,
    },
    /// Print the directories that would be watched
    WatchDirs {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

async fn run_daemon(cfg: AppConfig) -> Result<()> {
    if let Some(root) = &cfg.layout.data_root {
        layout::ensure_data_root(Path::new(root))
            .with_context(|| format!("creating data root layout under {}", root))?;
    }

    let pipeline = Arc::new(Pipeline::from_config(&cfg)?);
    pipeline.fix_permissions().await?;

    info!("running initial full rescan");
    match pipeline.rescan(&[]).await {
        Ok(report) => info!(
            "initial rescan done: scan job {}, {} duplicates deleted",
            report.scan_job,
            report.deleted_duplicates.len()
        ),
        Err(e) => error!("initial rescan failed: {}", e),
    }

    let server = pipeline.server();
    let dirs = layout::watch_directories(server.as_ref())
        .await
        .context("fetching library roots")?;
    layout::ensure_watch_dirs(&dirs);
    let watcher = watch::spawn_watcher(&dirs, &cfg.watch, pipeline.clone())?;

    let mut poller = PollingCoordinator::new(cfg.poll.interval());
    poller.start(pipeline.clone())?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");
    poller.stop();
    watcher.stop().await;
    poller.join().await;
    Ok(())
}

async fn run_fix_perms(cfg: AppConfig, json: bool) -> Result<()> {
    let pipeline = Pipeline::from_config(&cfg)?;
    let report = pipeline.fix_permissions().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "fix-perms: {} fixes applied, {} errors",
            report.fixed, report.errors
        );
    }
    Ok(())
}

async fn run_rescan(cfg: AppConfig, paths: Vec<PathBuf>, json: bool) -> Result<()> {
    let pipeline = Pipeline::from_config(&cfg)?;
    let report = pipeline.rescan(&paths).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "rescan: job {}, {} path(s), deleted {}, identified {}, shunned {}, tagged {}, ai tagger {}",
            report.scan_job,
            report.scan_paths.len(),
            report.deleted_duplicates.len(),
            report.identified.len(),
            report.shunned.len(),
            report.tagged,
            if report.ai_tagger_ran { "ran" } else { "skipped" }
        );
    }
    Ok(())
}

async fn run_watch_dirs(cfg: AppConfig, json: bool) -> Result<()> {
    let server = pipeline::build_server(&cfg)?;
    let dirs = layout::watch_directories(server.as_ref()).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&dirs)?);
    } else {
        for dir in &dirs {
            println!("{}", dir.display());
        }
    }
    Ok(())
}
