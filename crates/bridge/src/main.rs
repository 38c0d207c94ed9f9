//! Herald bridge binary entrypoint.

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use herald_common::config::BridgeConfig;
use herald_common::monitor::{Monitor, TracingMonitor};
use herald_common::redis_pool::create_redis_pool;
use herald_common::session::ChatSession;
use herald_irc::IrcSession;
use herald_notifier::NotifyBridge;
use herald_queue::RedisQueue;

use herald_bridge::routes::create_router;
use herald_bridge::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "herald_bridge=info,herald_notifier=info,herald_irc=info,herald_queue=info,tower_http=info",
            )
        }))
        .json()
        .init();

    tracing::info!("Herald bridge starting...");

    // Load configuration
    let config = BridgeConfig::from_env()?;

    // Connect to Redis
    let redis = create_redis_pool(&config.redis_url).await?;
    tracing::info!("Redis connection established");

    let monitor: Arc<dyn Monitor> = Arc::new(TracingMonitor::new());
    let session: Arc<dyn ChatSession> =
        Arc::new(IrcSession::new(config.irc.clone(), monitor.clone()));
    let queue = Arc::new(RedisQueue::new(redis));

    let mut bridge = NotifyBridge::new(session.clone(), queue, monitor, config.queue_name.clone());
    bridge.start().await?;

    if let Some(addr) = config.health_addr {
        let app = create_router(AppState::new(session, bridge.stats()))
            .layer(TraceLayer::new_for_http());
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Health server listening on {}", addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Health server exited with error");
            }
        });
    }

    // Run until Ctrl+C or until the consumer gives up
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
        _ = bridge.finished() => {
            tracing::warn!("Queue consumer stopped, shutting down");
        }
    }

    if let Err(e) = bridge.terminate().await {
        tracing::error!(error = %e, "Herald bridge exited with error");
        return Err(e.into());
    }

    tracing::info!("Herald bridge stopped.");
    Ok(())
}
