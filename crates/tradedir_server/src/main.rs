//! Directory API server entrypoint.

use std::time::Duration;
use tradedir_core::DEFAULT_PORT;
use tradedir_server::{config::Config, db::Database, serve_router, spawn_sync_workers, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct CliFlags {
    help: bool,
    restore: bool,
}

fn parse_cli_flags(args: &[String]) -> anyhow::Result<CliFlags> {
    let mut flags = CliFlags::default();
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" => flags.help = true,
            "--restore" => flags.restore = true,
            value if value.starts_with('-') => {
                anyhow::bail!(
                    "Unknown option: '{}'. Use --help to see supported options.",
                    value
                );
            }
            value => {
                anyhow::bail!(
                    "Unexpected positional argument: '{}'. Use --help to see supported options.",
                    value
                );
            }
        }
    }
    Ok(flags)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradedir=info,tradedir_core=info,tradedir_server=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let cli_flags = parse_cli_flags(&args)?;

    if cli_flags.help {
        print_help();
        return Ok(());
    }

    let config = Config::from_env();
    let database = Database::new(&config.db_path)?;
    let state = AppState::new(config.clone(), database)?;

    if cli_flags.restore {
        let index_sync = state.index_sync.clone();
        let report = tokio::task::spawn_blocking(move || index_sync.restore_all()).await??;
        for collection in &report.collections {
            tracing::info!(
                collection = %collection.collection,
                indexed = collection.indexed,
                pruned = collection.pruned,
                failed = collection.failed,
                "Restored collection"
            );
        }
    }

    let workers = spawn_sync_workers(
        state.dispatcher.clone(),
        state.wake.clone(),
        config.sync_workers,
        Duration::from_millis(config.sync_poll_ms),
    );
    // Pick up work left queued by a previous run.
    state.wake.notify_one();

    let allow_public = tradedir_server::config::env_flag_enabled("ALLOW_PUBLIC_ACCESS");
    if allow_public {
        tracing::warn!("Public access enabled - server will accept requests from any origin");
    }
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN is not set - admin endpoints are disabled");
    }

    let bind_addr = tradedir_server::resolve_bind_address(&config, allow_public);
    if !bind_addr.ip().is_loopback() {
        tracing::warn!(
            "Binding to non-localhost address: {} - ensure proper security measures are in place",
            bind_addr
        );
    }

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let actual_addr = listener.local_addr().unwrap_or(bind_addr);
    tracing::info!("tradedir running at http://{}", actual_addr);

    let db = state.db.clone();
    let serve_result = serve_router(listener, state, allow_public, shutdown_signal()).await;

    workers.shutdown().await;
    match db.outbox.pending_len() {
        Ok(0) => tracing::info!("Outbox drained"),
        Ok(pending) => tracing::info!(pending, "Outbox items left for the next start"),
        Err(err) => tracing::error!("Failed to read outbox: {}", err),
    }

    serve_result?;

    Ok(())
}

fn print_help() {
    println!("tradedir server\n");
    println!("Usage: tradedir [OPTIONS]\n");
    println!("Options:");
    println!("  --restore         Rebuild the search index before serving");
    println!("  --help            Show this help message");
    println!("\nEnvironment variables:");
    println!("  DB_PATH           Record store directory (default: ~/.cache/tradedir/db)");
    println!("  INDEX_PATH        Search index directory (default: DB_PATH)");
    println!(
        "  PORT              Server port (default: {})",
        DEFAULT_PORT
    );
    println!("  PAGE_SIZE         Default search page size");
    println!("  MAX_BODY_SIZE     Maximum request body in bytes (default: 1MB)");
    println!("  SYNC_WORKERS      Background sync workers (default: 2)");
    println!("  SYNC_MAX_ATTEMPTS Attempts before a failing sync is dropped (default: 3)");
    println!("  SYNC_POLL_MS      Idle worker poll interval (default: 500)");
    println!("  CATEGORY_DELETE_POLICY  keep | detach (default: keep)");
    println!("  ADMIN_TOKEN       Token required by admin endpoints");
    println!("  ALLOW_PUBLIC_ACCESS  Allow CORS from any origin");
    println!(
        "  BIND              Override bind address (e.g. 0.0.0.0:{})",
        DEFAULT_PORT
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_cli_flags, CliFlags};

    #[test]
    fn parse_cli_flags_accepts_known_options() {
        let args = vec![
            "tradedir".to_string(),
            "--restore".to_string(),
            "--help".to_string(),
        ];
        let flags = parse_cli_flags(&args).expect("known options should parse");
        assert_eq!(
            flags,
            CliFlags {
                help: true,
                restore: true,
            }
        );
    }

    #[test]
    fn parse_cli_flags_rejects_unknown_and_positional_arguments() {
        let unknown = parse_cli_flags(&["tradedir".to_string(), "--verbose".to_string()])
            .expect_err("unknown flag");
        assert!(unknown.to_string().contains("Unknown option"));

        let positional = parse_cli_flags(&["tradedir".to_string(), "data".to_string()])
            .expect_err("positional");
        assert!(positional.to_string().contains("Unexpected positional argument"));
    }
}
