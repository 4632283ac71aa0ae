use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dotenvy::Error as DotenvError;
use serde_json::{Map, Value};
use tracing::{error, info, instrument};
use tracing_subscriber::EnvFilter;

use pgwidget::app::AppContext;
use pgwidget::{config, http, metrics, view};

#[derive(Debug, Parser)]
#[command(author, version, about = "pgwidget: PostgreSQL cluster widget backend for Zabbix")]
struct Cli {
    /// Path to YAML configuration file. Defaults to env PGWIDGET_CONFIG or built-in defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the widget API over HTTP (default).
    Serve,
    /// Render one widget and print the payload as JSON.
    Render {
        /// JSON file holding the widget's configuration record.
        #[arg(long)]
        fields: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())?;
    let metrics = metrics::AppMetrics::new()?;
    let ctx = AppContext::connect(config, metrics)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(ctx).await,
        Command::Render { fields } => render_once(&ctx, &fields).await,
    }
}

#[instrument(skip_all)]
async fn serve(ctx: AppContext) -> anyhow::Result<()> {
    let bind_addr: SocketAddr = ctx
        .config
        .http
        .bind
        .parse()
        .context("invalid http.bind address")?;

    let router = http::create_router(ctx.clone());

    info!(upstream = %ctx.config.zabbix.url, "pgwidget listening on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .context("failed to bind HTTP listener")?;

    if let Err(err) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = ?err, "server terminated with error");
    }

    Ok(())
}

#[instrument(skip(ctx))]
async fn render_once(ctx: &AppContext, path: &Path) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read widget fields at {}", path.display()))?;
    let fields: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse widget fields at {}", path.display()))?;
    let fields: Map<String, Value> = match fields {
        Value::Object(map) => map,
        other => bail!("widget fields must be a JSON object, got {other}"),
    };

    let payload = view::render(ctx, &fields).await;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn load_env() {
    if let Err(err) = dotenvy::dotenv() {
        match err {
            DotenvError::Io(io_err) if io_err.kind() == ErrorKind::NotFound => {}
            other => eprintln!("warning: failed to load .env file: {other}"),
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pgwidget=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = ?err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
