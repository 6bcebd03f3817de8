//! Postgate Review Service (postgate-rv) - Main entry point
//!
//! Wires the workflow controller to the Discord reviewer surface and the
//! LinkedIn publisher, starts the reconciliation poller, and serves the
//! HTTP API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use postgate_common::config::{resolve_root_folder, TomlConfig};
use postgate_common::db::init::init_database;
use postgate_common::db::settings;
use postgate_common::events::event_channel;

use postgate_rv::api;
use postgate_rv::poller::Poller;
use postgate_rv::publisher::LinkedInPublisher;
use postgate_rv::surface::DiscordSurface;
use postgate_rv::workflow::{Workflow, WorkflowConfig};

/// Command-line arguments for postgate-rv
#[derive(Parser, Debug)]
#[command(name = "postgate-rv")]
#[command(about = "Review and publication gate for generated social content")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5780", env = "POSTGATE_PORT")]
    port: u16,

    /// Root folder for the database and state
    #[arg(short, long, env = "POSTGATE_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Configuration file path (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postgate_rv=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting Postgate Review Service on port {}", args.port);

    let root_folder = resolve_root_folder(
        args.root_folder.as_deref().and_then(|p| p.to_str()),
        "POSTGATE_ROOT_FOLDER",
    );
    info!("Root folder: {}", root_folder.display());

    let config = TomlConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?
        .apply_env();
    config.validate().context("Incomplete configuration")?;

    let db = init_database(&root_folder.join("postgate.db"))
        .await
        .context("Failed to initialize database")?;
    info!("Database ready");

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    // validate() already reported anything missing; these contexts are for
    // completeness
    let discord = config.discord.clone();
    let linkedin = config.linkedin.clone();
    let surface = Arc::new(DiscordSurface::new(
        http.clone(),
        discord.bot_token.context("missing discord.bot_token")?,
        discord
            .approval_channel_id
            .context("missing discord.approval_channel_id")?,
        discord.notification_channel_id,
    ));
    let publisher = Arc::new(LinkedInPublisher::new(
        http.clone(),
        linkedin.access_token.context("missing linkedin.access_token")?,
        linkedin.person_id.context("missing linkedin.person_id")?,
    ));

    let events = event_channel();
    let workflow_config = WorkflowConfig::from_settings(&db)
        .await
        .context("Failed to load workflow settings")?;
    info!("Workflow settings: {:?}", workflow_config);

    let workflow = Arc::new(Workflow::new(
        db.clone(),
        surface,
        publisher,
        events.clone(),
        workflow_config,
    ));

    let poll_interval = settings::poll_interval_seconds(&db)
        .await
        .context("Failed to load poll interval")?;
    let poller = Poller::new(workflow.clone(), Duration::from_secs(poll_interval as u64));
    tokio::spawn(poller.run());

    let app_state = api::AppState {
        db,
        workflow,
        events,
        http,
        generation_webhook_url: config.generation_webhook_url.clone(),
        port: args.port,
    };
    let app = api::create_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
