use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::error::AppError;

use super::domain::{ApplicationId, InitialApplication, LegacySubmission, OwnerId, VerificationSubmission};
use super::notify::NotificationSink;
use super::repository::ApplicationRepository;
use super::service::{ServiceError, VerificationService};

/// Header carrying the authenticated caller identity, set by the upstream gateway.
pub const OWNER_HEADER: &str = "x-owner-id";

/// Router builder exposing intake, verification trigger, status and report endpoints.
pub fn verification_router<R, N>(service: Arc<VerificationService<R, N>>) -> Router
where
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route("/api/v1/applications", post(create_handler::<R, N>))
        .route("/api/v1/applications/submit", post(legacy_submit_handler::<R, N>))
        .route(
            "/api/v1/applications/:application_id",
            get(status_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/verification",
            post(verification_handler::<R, N>),
        )
        .route(
            "/api/v1/verifications/:application_id/report",
            get(report_handler::<R, N>),
        )
        .with_state(service)
}

/// Owner identity taken from [`OWNER_HEADER`]; requests without it are unauthorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub OwnerId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| CallerIdentity(OwnerId(value.to_string())))
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "missing caller identity" })),
                )
            })
    }
}

pub(crate) async fn create_handler<R, N>(
    State(service): State<Arc<VerificationService<R, N>>>,
    CallerIdentity(owner): CallerIdentity,
    Json(request): Json<InitialApplication>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.create_initial(owner, request) {
        Ok(application) => (StatusCode::CREATED, Json(application.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn legacy_submit_handler<R, N>(
    State(service): State<Arc<VerificationService<R, N>>>,
    CallerIdentity(owner): CallerIdentity,
    Json(request): Json<LegacySubmission>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.submit_legacy(owner, request) {
        Ok(ack) => (StatusCode::ACCEPTED, Json(ack)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn verification_handler<R, N>(
    State(service): State<Arc<VerificationService<R, N>>>,
    CallerIdentity(owner): CallerIdentity,
    Path(application_id): Path<String>,
    Json(request): Json<VerificationSubmission>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    let id = ApplicationId(application_id);
    match service.submit_verification(&owner, &id, request) {
        Ok(ack) => (StatusCode::ACCEPTED, Json(ack)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn status_handler<R, N>(
    State(service): State<Arc<VerificationService<R, N>>>,
    CallerIdentity(owner): CallerIdentity,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    let id = ApplicationId(application_id);
    match service.get(&owner, &id) {
        Ok(application) => (StatusCode::OK, Json(application.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn report_handler<R, N>(
    State(service): State<Arc<VerificationService<R, N>>>,
    CallerIdentity(owner): CallerIdentity,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    let id = ApplicationId(application_id);
    match service.report(&owner, &id) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: ServiceError) -> Response {
    AppError::from(err).into_response()
}
