use crate::cli::ServeArgs;
use crate::infra::{AppState, Backend, StaticTokenDirectory};
use crate::routes::with_api_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use society_hub::config::AppConfig;
use society_hub::error::AppError;
use society_hub::telemetry;
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

    let directory = StaticTokenDirectory::from_config(&config.auth);
    if directory.is_empty() {
        warn!("APP_ACTOR_TOKENS is empty; every request will be anonymous");
    }
    let backend = Backend::in_memory(&config.polls);

    let app = with_api_routes(&backend, Arc::new(directory))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        tie_break = ?config.polls.policy.tie_break,
        "society hub ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
