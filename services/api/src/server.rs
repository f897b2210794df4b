use crate::cli::ServeArgs;
use crate::infra::{AppState, ConfiguredIdentityProvider, InMemoryDirectory};
use crate::routes::with_donation_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use food_rescue::config::AppConfig;
use food_rescue::donations::{DonationService, MemoryEntityStore};
use food_rescue::error::AppError;
use food_rescue::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let identity = ConfiguredIdentityProvider::from_grants(&config.identity.access_tokens);
    if identity.is_empty() {
        warn!("APP_ACCESS_TOKENS is empty; every mutating route will answer 401");
    }

    let directory = Arc::new(InMemoryDirectory::default());
    let donation_service = Arc::new(DonationService::new(
        Arc::new(MemoryEntityStore::new()),
        directory.clone(),
        Arc::new(identity),
    ));

    let app = with_donation_routes(donation_service, directory)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "food rescue coordinator ready");

    axum::serve(listener, app).await?;
    Ok(())
}
