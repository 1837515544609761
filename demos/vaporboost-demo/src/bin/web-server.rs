//! Observer server for running sessions.
//!
//! Run with: cargo run -p vaporboost-demo --bin web-server [CONFIG_DIR]
//!
//! Loads accounts and settings, starts every account, and serves
//! `ws://localhost:3000/ws` and `http://localhost:3000/snapshot` until Ctrl-C.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Result;
use tracing::{info, warn};
use vaporboost_demo::{OfflineFactory, init_tracing, load, open_store};
use vaporboost_guard::ConsoleResolver;
use vaporboost_session::{FileMessageLog, SessionManager};
use vaporboost_transport::websocket::create_router;

#[tokio::main]
async fn main() -> Result<()> {
    let store = open_store(std::env::args_os().nth(1).map(PathBuf::from))?;
    let (settings, accounts) = load(&store).await?;
    init_tracing(settings.debug);

    let manager = Arc::new(
        SessionManager::new(OfflineFactory, settings)
            .with_resolver(Arc::new(ConsoleResolver::stdin()))
            .with_message_sink(Arc::new(FileMessageLog::new(store.root()))),
    );

    let starter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            let report = manager.start_accounts(accounts).await;
            for (id, e) in &report.failed {
                warn!(account = %id, error = %e, "Account did not start");
            }
        })
    };

    let app = create_router(manager.clone());
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Observer listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    starter.abort();
    manager.stop_all().await;

    let summary = manager.report().summary();
    info!(
        accounts = summary.accounts,
        hours = summary.hours_gained,
        messages = summary.messages,
        errors = summary.errors,
        "Session ended"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
    }
    info!("Shutting down...");
}
