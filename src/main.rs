use checkout_rs::api::{self, AppState};
use checkout_rs::application::CheckoutService;
use checkout_rs::infrastructure::{
    CheckoutConfig, FilePendingOrderStore, HttpBackendAdapter, TracingCheckoutEvents,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Starting Checkout Service...");

    let config = CheckoutConfig::from_env()?;
    info!("Backend: {}", config.backend_base_url);

    let backend = Arc::new(HttpBackendAdapter::new(
        &config.backend_base_url,
        config.backend_api_token.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )?);

    let store = Arc::new(FilePendingOrderStore::new(&config.pending_order_path));
    info!("Pending order marker at {}", store.path().display());

    let checkout = Arc::new(CheckoutService::new(
        backend.clone(),
        backend,
        store,
        Arc::new(TracingCheckoutEvents),
        config.checkout_settings()?,
    ));

    let app = api::create_router(AppState { checkout });

    let addr = config.listen_addr();
    info!("Server listening on {}", addr);
    info!("Available endpoints:");
    info!("  GET  /health - Health check");
    info!("  POST /api/checkout/start - Enter checkout");
    info!("  POST /api/checkout/submit - Place order");
    info!("  GET  /payment/{{success,failure,callback}} - Gateway return routes");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
