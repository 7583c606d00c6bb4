//! Application entry point and server initialization
//!
//! This module contains the main function that:
//! - Loads environment configuration
//! - Opens the link database
//! - Starts the HTTP server with graceful shutdown support, or runs one of
//!   the maintenance subcommands (export, import, dump)

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;

use golinks::config::Config;
use golinks::route::{create_app, AppState};
use golinks::middleware::HeaderIdentity;
use golinks::transfer::Snapshot;

#[derive(Parser)]
#[command(name = "golinks", about = "Go-link redirector: short keywords for long URLs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Write every link, list and variable to a JSON snapshot
    Export { file: PathBuf },
    /// Load a JSON snapshot into the database
    Import { file: PathBuf },
    /// Print one tab-separated line per link
    Dump,
}

/// Application entry point
///
/// # Environment Variables
///
/// - `PORT` - Server port number (default: 8080)
/// - `DATABASE_URL` - Path to database file (default: "data.db")
/// - `GO_STORAGE` - `redb` or `memory` (default: redb)
/// - `GO_USER_HEADER` - Header carrying the username (default: x-forwarded-user)
/// - `AUTHORIZATION` - Token required on `/api` requests when set
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "golinks=debug,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let db = config
        .open_database()
        .with_context(|| format!("failed to open database {}", config.database_url))?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, db).await,
        Command::Export { file } => {
            let snapshot = db.export_snapshot()?;
            let out = BufWriter::new(File::create(&file)?);
            serde_json::to_writer_pretty(out, &snapshot)?;
            info!(
                "exported {} links and {} lists to {}",
                snapshot.links.len(),
                snapshot.lists.len(),
                file.display()
            );
            Ok(())
        }
        Command::Import { file } => {
            let reader = BufReader::new(File::open(&file)?);
            let snapshot: Snapshot = serde_json::from_reader(reader)
                .with_context(|| format!("{} is not a snapshot", file.display()))?;
            db.import_snapshot(snapshot)?;
            Ok(())
        }
        Command::Dump => {
            db.dump_tsv(&mut io::stdout().lock())?;
            Ok(())
        }
    }
}

async fn serve(config: Config, db: golinks::registry::LinkDatabase) -> anyhow::Result<()> {
    let identity = HeaderIdentity::new(&config.user_header, &config.default_user);
    let state = AppState::new(db).with_identity(identity);

    // Create the Axum router with all routes configured
    let app = create_app(state).layer(TraceLayer::new_for_http());

    // Bind to all network interfaces on the specified port
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("server running at http://localhost:{}", config.port);
    info!("using {:?} storage at {}", config.storage, config.database_url);

    // Start the server with graceful shutdown support
    // The server will continue running until it receives SIGTERM or SIGINT
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

/// Handles graceful shutdown signals
///
/// Returns on SIGINT (Ctrl+C) or, on Unix, SIGTERM. In-flight requests are
/// allowed to finish; the database handle is dropped with the router, so
/// no write transaction is cut short.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    // On non-Unix systems (Windows), only handle Ctrl+C
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
