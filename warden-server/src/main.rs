use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_server::{
    config::{ConfigLoad, ConfigLoader, WardenConfig, loader::parse_bind},
    router, wiring,
};

#[derive(Debug, Parser)]
#[command(name = "warden-server", about = "Warden scan orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Debug, Clone, clap::Args)]
struct ServeArgs {
    /// Path to the TOML configuration file
    #[arg(long, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides server.bind)
    #[arg(long)]
    bind: Option<String>,

    /// Keep tenants, scans and job groups in process memory
    #[arg(long, default_value_t = false)]
    in_memory: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the task ingress (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.serve)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(cli.serve, config).await,
        Command::Migrate => run_migrate(&config).await,
    }
}

fn load_config(args: &ServeArgs) -> anyhow::Result<WardenConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad {
        mut config,
        source,
        env_file_loaded,
    } = loader.load().context("failed to load configuration")?;

    if let Some(bind) = &args.bind {
        config.server.bind = parse_bind(bind)?;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if env_file_loaded {
        info!("loaded .env file");
    }
    match &source {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => info!("no warden.toml found; using defaults and environment"),
    }

    let orchestrator = &config.orchestrator;
    info!(
        orchestrator.probe_cache_ttl_secs = orchestrator.probe_cache_ttl_secs,
        orchestrator.quota_window_secs = orchestrator.quota_window_secs,
        orchestrator.results_queue = %orchestrator.results_queue,
        orchestrator.on_abort = ?orchestrator.on_abort,
        orchestrator.lock_timeout_secs = orchestrator.lock.timeout_secs,
        "orchestrator configuration in effect"
    );

    Ok(config)
}

async fn run_migrate(config: &WardenConfig) -> anyhow::Result<()> {
    let database_url = config
        .database
        .url
        .as_deref()
        .context("database.url (or DATABASE_URL) is required to migrate")?;
    let store = wiring::connect_postgres(database_url).await?;
    store
        .migrate()
        .await
        .context("database migration failed")?;
    info!("Database migrations applied successfully");
    Ok(())
}

async fn run_server(args: ServeArgs, config: WardenConfig) -> anyhow::Result<()> {
    let runtime = if args.in_memory {
        wiring::in_memory(&config).await?
    } else {
        wiring::durable(&config).await?
    };
    info!(
        mode = %runtime.mode,
        operations = ?runtime.tasks.operations(),
        "task registry ready"
    );

    let addr: SocketAddr = config.server.bind;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Warden listening on http://{addr}");

    axum::serve(listener, router(runtime))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("Warden stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
    }
}
