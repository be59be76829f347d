//! Sitemapper — resumable sitemap generation server and CLI.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sitemapper_runtime::{trigger, SystemProbe};

mod import;
mod routes;
mod routing;
mod state;
mod worker;

use state::AppState;

#[derive(Parser)]
#[command(name = "sitemapper")]
#[command(about = "Resumable sitemap generation: job queue, chunk cache and public sitemap URLs")]
#[command(version)]
struct Cli {
    /// Data directory (defaults to SITEMAPPER_DATA_DIR, then ./data)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server and recurring dispatch worker (default)
    Serve,

    /// Enqueue a full regeneration and dispatch until the queue drains
    Regenerate {
        /// Regenerate even when the checksum says content is unchanged
        #[arg(long)]
        force: bool,

        /// Upper bound on dispatch ticks
        #[arg(long, default_value = "1000")]
        max_ticks: usize,
    },

    /// Continue an interrupted run from the resumption cursor
    Resume {
        #[arg(long, default_value = "1000")]
        max_ticks: usize,
    },

    /// Run a single budget-bounded dispatch tick
    Dispatch,

    /// Show queue, lease and produced buckets
    Status,

    /// Clear the resumption cursor and checksum
    Deactivate,

    /// Load content items from a JSON export
    Import {
        /// JSON file: an array of items or {"items": [...]}
        file: PathBuf,
    },
}

fn resolve_data_dir() -> PathBuf {
    std::env::var("SITEMAPPER_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(resolve_data_dir);
    info!("Data directory: {}", data_dir.display());

    let config = sitemapper_core::SitemapperConfig::from_env(&data_dir)?;
    let state = Arc::new(AppState::open(config)?);
    let scheduler = state.scheduler.clone();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await?,
        Command::Regenerate { force, max_ticks } => {
            let outcome = trigger::regenerate(&scheduler, force)?;
            let report = trigger::drain(&scheduler, SystemProbe::start, max_ticks)?;
            print_json(&serde_json::json!({ "outcome": outcome, "drain": report }))?;
            if report.remaining > 0 {
                std::process::exit(1);
            }
        }
        Command::Resume { max_ticks } => {
            let outcome = trigger::resume(&scheduler)?;
            let report = trigger::drain(&scheduler, SystemProbe::start, max_ticks)?;
            print_json(&serde_json::json!({ "outcome": outcome, "drain": report }))?;
            if report.remaining > 0 {
                std::process::exit(1);
            }
        }
        Command::Dispatch => {
            let report = scheduler.dispatch(&SystemProbe::start())?;
            print_json(&report)?;
        }
        Command::Status => {
            print_json(&serde_json::json!({
                "queue": scheduler.status()?,
                "buckets": scheduler.cache().buckets()?,
            }))?;
        }
        Command::Deactivate => {
            trigger::deactivate(&scheduler)?;
            println!("Sitemap generation state cleared");
        }
        Command::Import { file } => {
            let report = import::import_file(scheduler.store(), &file);
            import::print_report(&report);
            std::process::exit(if report.errors.is_empty() { 0 } else { 1 });
        }
    }

    Ok(())
}

async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let port = state.config.port;

    // Start recurring dispatch
    worker::start_dispatch_worker(state.clone());

    // Build router
    let app = routes::build_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Sitemapper server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
