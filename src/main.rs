// Image gallery: uploads go to Gemini for a title/description, then land in
// a GCS bucket alongside their metadata.

use std::sync::Arc;

use anyhow::{Context, Result};
use gcs_image_captioner::{
    captioner::GeminiCaptioner, config::Config, create_router, secrets::SecretProvider,
    storage::ObjectStoreGateway, AppState,
};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "gcs_image_captioner=debug,tower_http=info".to_string());
    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    // Must outlive the server: owns the temporary credential file.
    let secrets = SecretProvider::new(&config)
        .initialize()
        .await
        .context("failed to load secrets")?;

    let storage = match &config.bucket_name {
        Some(bucket) => {
            tracing::info!("Using bucket {}", bucket);
            Some(ObjectStoreGateway::gcs(bucket, secrets.storage_credential.path())?)
        }
        None => {
            tracing::warn!("GCS_BUCKET_NAME is not set; storage routes will fail");
            None
        }
    };

    let captioner = Arc::new(GeminiCaptioner::new(&config, secrets.gemini_api_key.clone()));
    let addr = config.bind_addr();
    let state = AppState {
        config: Arc::new(config),
        storage,
        captioner,
    };

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    drop(secrets);
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received");
}
