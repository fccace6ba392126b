use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use caldera::api::{ApiServer, AppState};
use caldera::config::AppConfig;
use caldera::generator::{ArticleGenerator, Generator, ModelClient};
use caldera::scheduler::{
    Clock, ConfigStore, LeaseLock, RunLock, SchedulerLoop, SqliteConfigStore, SystemClock,
    TickOutcome,
};
use caldera::storage::{ArticleRepository, SqliteArticleRepository};

#[derive(Parser)]
#[command(
    name = "caldera",
    version,
    about = "Autonomous SEO content engine for the Caldera Custom Homes marketing site",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler loop and the admin/content API
    Serve,

    /// Force a single generation run, ignoring the schedule
    RunOnce,

    /// Print the scheduler's current status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Serve => serve(config).await?,
        Commands::RunOnce => run_once(config).await?,
        Commands::Status => status(config).await?,
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("caldera=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("caldera=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Wire the stores, generator, lock, and loop from configuration
fn build(config: &AppConfig) -> Result<(Arc<SchedulerLoop>, AppState)> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let config_store: Arc<dyn ConfigStore> = Arc::new(SqliteConfigStore::new(
        &config.database.sqlite_path,
        clock.clone(),
    )?);

    let articles: Arc<dyn ArticleRepository> =
        Arc::new(SqliteArticleRepository::new(&config.database.sqlite_path)?);

    let generator: Arc<dyn Generator> = Arc::new(ArticleGenerator::new(
        config.model.clone(),
        config.brand.clone(),
    )?);

    // Lease-based lock in the shared store, so horizontally scaled
    // instances exclude each other and a crashed holder expires
    let lock: Arc<dyn RunLock> = Arc::new(LeaseLock::new(
        &config.database.sqlite_path,
        chrono::Duration::seconds(config.scheduler.lease_ttl_secs as i64),
        clock.clone(),
    )?);

    let scheduler = Arc::new(
        SchedulerLoop::new(
            config_store.clone(),
            articles.clone(),
            generator,
            lock,
            clock,
            config.brand.clone(),
        )
        .with_tick_interval(Duration::from_secs(config.scheduler.tick_interval_secs)),
    );

    let state = AppState::new(config_store, articles, scheduler.clone());
    Ok((scheduler, state))
}

async fn serve(config: AppConfig) -> Result<()> {
    tracing::info!("caldera content engine starting");

    let (scheduler, state) = build(&config)?;

    let probe = ModelClient::with_config(config.model.clone())?;
    if !probe.is_available().await {
        tracing::warn!(
            endpoint = %config.model.endpoint,
            "model endpoint not reachable; generation runs will fail until it is"
        );
    }

    let server = ApiServer::new(config.api.clone(), state);

    let loop_handle = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler.start().await;
        })
    };

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    };

    server.start_with_shutdown(shutdown).await?;

    // An interrupted in-flight run is reconciled on the next startup
    // from the persisted schedule; stopping here never corrupts it
    scheduler.stop().await;
    let _ = loop_handle.await;

    tracing::info!("caldera content engine stopped");
    Ok(())
}

async fn run_once(config: AppConfig) -> Result<()> {
    let (scheduler, _state) = build(&config)?;

    match scheduler.run_now().await {
        TickOutcome::Completed { slug } => {
            println!("Published article: {slug}");
        }
        TickOutcome::Failed { reason } => {
            println!("Generation run failed: {reason}");
        }
        TickOutcome::LockBusy => {
            println!("Another generation run is already in progress");
        }
        other => {
            println!("Unexpected outcome: {other:?}");
        }
    }

    Ok(())
}

async fn status(config: AppConfig) -> Result<()> {
    let (scheduler, _state) = build(&config)?;
    let status = scheduler.status().await?;
    print!("{}", status.display());
    Ok(())
}
