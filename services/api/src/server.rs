use crate::cli::ServeArgs;
use crate::infra::{
    build_providers, AppState, EvidenceFixtures, InMemoryApplicationRepository,
    LogNotificationSink,
};
use crate::routes::with_verification_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use solar_verify::config::AppConfig;
use solar_verify::error::AppError;
use solar_verify::telemetry;
use solar_verify::workflows::verification::VerificationService;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

/// Upper bound on applications re-queued from `verifying` at startup.
const RESUME_BATCH: usize = 500;

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

    let repository = Arc::new(InMemoryApplicationRepository::default());
    let notifier = Arc::new(LogNotificationSink::default());
    let providers = build_providers(&config.verification, &EvidenceFixtures::default());
    let verification_service = Arc::new(VerificationService::new(
        repository,
        notifier,
        providers,
        config.verification.pipeline,
    ));
    let settings = verification_service.settings();
    info!(
        approve_threshold = settings.thresholds.approve(),
        review_threshold = settings.thresholds.review(),
        check_timeout = ?settings.check_timeout,
        pipeline_timeout = ?settings.pipeline_timeout,
        "verification pipeline configured"
    );

    let resumed = verification_service.resume_in_flight(RESUME_BATCH)?;
    if !resumed.is_empty() {
        info!(count = resumed.len(), "resumed in-flight verifications");
    }

    let app = with_verification_routes(verification_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        "solar verification service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
