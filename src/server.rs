use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::services::registry::{
    ExpirationSweeper, LeaseConfig, RegistrationService, RegistryStore, router,
};

pub async fn start(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(config.bind_address()).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        ttl_secs = config.lease.ttl_seconds,
        "Registry server listening"
    );

    // Ctrl-C 触发优雅关闭
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received");
        signal.cancel();
    });

    serve(listener, config.lease, shutdown).await?;
    Ok(())
}

/// 在给定监听器上运行注册中心，直到 `shutdown` 被取消
pub async fn serve(
    listener: TcpListener,
    lease: LeaseConfig,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let store = RegistryStore::new();
    let sweeper = ExpirationSweeper::start(store.clone(), lease);
    let app = router(RegistrationService::new(store, lease));

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await;

    sweeper.shutdown().await;
    tracing::info!("Registry server stopped");
    result
}
