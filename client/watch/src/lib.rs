//! # Queue Watch
//!
//! Terminal viewer for one shop's queue.
//!
//! ## Flow
//! 1. Load [`Config`] from the environment, `--api-url` overrides `QUEUE_API_URL`.
//!
//! 2. Open the shop with a [`ConnectionManager`]. If the initial load fails, retry it every few seconds until it works
//!    or the process is asked to stop. The socket and the poller are already running in the meantime.
//!
//! 3. Log every published view and every notice until ctrl-c or SIGTERM.
//!
//! 4. Tear the manager down so the socket closes cleanly.
use std::{sync::Arc, time::Duration};

use anyhow::Context;
use mirror::{Config, ConnectionManager, LogSession};
use tokio::{
    signal::{
        ctrl_c,
        unix::{SignalKind, signal},
    },
    sync::broadcast::error::RecvError,
    time::sleep,
};
use tracing::{error, info, warn};

pub mod utils;

use utils::{describe, summarize};

const INITIAL_LOAD_RETRY: Duration = Duration::from_secs(5);

pub async fn watch_queue(shop_id: &str, api_url: Option<String>) -> anyhow::Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(api_url) = api_url {
        config = config.with_api_url(api_url);
    }
    info!("Using API at {}", config.api_url);

    let mut manager = ConnectionManager::new(config, Arc::new(LogSession))
        .context("Failed to build the queue client")?;
    let mut views = manager.subscribe_view();
    let mut notices = manager.subscribe_notices();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut loaded = manager.init(shop_id).await;
    while let Err(err) = loaded {
        warn!("Queue for shop {shop_id} unavailable ({err}), retrying in {INITIAL_LOAD_RETRY:?}");

        tokio::select! {
            _ = &mut shutdown => {
                manager.teardown().await;
                return Ok(());
            }
            _ = sleep(INITIAL_LOAD_RETRY) => {}
        }

        loaded = manager.retry_initial_load().await;
    }

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }

                let view = views.borrow_and_update().clone();
                info!("{}", summarize(&view));
            }
            notice = notices.recv() => match notice {
                Ok(notice) => warn!("{}", describe(&notice)),
                Err(RecvError::Lagged(skipped)) => warn!("Missed {skipped} notices"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.teardown().await;
    info!("Stopped watching shop {shop_id}");

    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(err) => {
                error!("Failed to install Ctrl+C handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                error!("Failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
