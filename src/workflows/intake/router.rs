use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    ActionId, AdminCheckId, ApplicantId, CompanyId, CompletedBy, DashboardId, DeviceKind, FormId,
};
use super::messaging::{DeliveryCallback, DeliveryOutcome};
use super::page::PageError;
use super::repository::{
    BlobStore, IntakeStore, MessageDeliveryProvider, ReviewQueue, StoreError,
};
use super::review::{AdminVerdict, ReviewError};
use super::service::{IntakeError, IntakeService};

/// Router builder exposing the intake, review, and delivery endpoints.
pub fn intake_router<S, B, Q, M>(service: Arc<IntakeService<S, B, Q, M>>) -> Router
where
    S: IntakeStore + 'static,
    B: BlobStore + 'static,
    Q: ReviewQueue + 'static,
    M: MessageDeliveryProvider + 'static,
{
    Router::new()
        .route(
            "/api/v1/intake/dashboards/:company_id/:dashboard_id/publish",
            post(publish_handler::<S, B, Q, M>),
        )
        .route(
            "/api/v1/intake/dashboards/:company_id/:dashboard_id/counters",
            get(counters_handler::<S, B, Q, M>),
        )
        .route(
            "/api/v1/intake/dashboards/:company_id/:dashboard_id/reconcile",
            post(reconcile_handler::<S, B, Q, M>),
        )
        .route(
            "/api/v1/intake/forms/:form_id/docs/:slot/pages/:page_number",
            post(submit_page_handler::<S, B, Q, M>),
        )
        .route(
            "/api/v1/intake/admin-checks/:admin_check_id/docs/:slot/pages/:page_number",
            post(resolve_page_handler::<S, B, Q, M>),
        )
        .route(
            "/api/v1/intake/actions/:action_id/complete",
            post(complete_action_handler::<S, B, Q, M>),
        )
        .route(
            "/api/v1/intake/deliveries",
            post(delivery_handler::<S, B, Q, M>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitPageRequest {
    /// Submission count the client read before uploading.
    pub(crate) expected_submission_count: u32,
    /// Declared content type of the payload.
    pub(crate) content_type: String,
    pub(crate) device: DeviceKind,
    /// Raw page payload.
    pub(crate) content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolvePageRequest {
    pub(crate) verdict: AdminVerdict,
    pub(crate) completed_by: CompletedBy,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompleteActionRequest {
    pub(crate) completed_by: CompletedBy,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeliveryCallbackRequest {
    pub(crate) company_id: CompanyId,
    pub(crate) dashboard_id: DashboardId,
    pub(crate) applicant_id: ApplicantId,
    #[serde(flatten)]
    pub(crate) callback: DeliveryCallback,
}

pub(crate) async fn publish_handler<S, B, Q, M>(
    State(service): State<Arc<IntakeService<S, B, Q, M>>>,
    Path((company_id, dashboard_id)): Path<(String, String)>,
) -> Response
where
    S: IntakeStore + 'static,
    B: BlobStore + 'static,
    Q: ReviewQueue + 'static,
    M: MessageDeliveryProvider + 'static,
{
    let result = service.publish_dashboard(&CompanyId(company_id), &DashboardId(dashboard_id));
    match result {
        Ok(published) => (StatusCode::OK, axum::Json(published)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn counters_handler<S, B, Q, M>(
    State(service): State<Arc<IntakeService<S, B, Q, M>>>,
    Path((company_id, dashboard_id)): Path<(String, String)>,
) -> Response
where
    S: IntakeStore + 'static,
    B: BlobStore + 'static,
    Q: ReviewQueue + 'static,
    M: MessageDeliveryProvider + 'static,
{
    let result = service.dashboard_counters(&CompanyId(company_id), &DashboardId(dashboard_id));
    match result {
        Ok(counters) => (StatusCode::OK, axum::Json(counters)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reconcile_handler<S, B, Q, M>(
    State(service): State<Arc<IntakeService<S, B, Q, M>>>,
    Path((company_id, dashboard_id)): Path<(String, String)>,
) -> Response
where
    S: IntakeStore + 'static,
    B: BlobStore + 'static,
    Q: ReviewQueue + 'static,
    M: MessageDeliveryProvider + 'static,
{
    let result = service.reconcile_dashboard(&CompanyId(company_id), &DashboardId(dashboard_id));
    match result {
        Ok(counters) => (StatusCode::OK, axum::Json(counters)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_page_handler<S, B, Q, M>(
    State(service): State<Arc<IntakeService<S, B, Q, M>>>,
    Path((form_id, slot, page_number)): Path<(String, String, u32)>,
    axum::Json(request): axum::Json<SubmitPageRequest>,
) -> Response
where
    S: IntakeStore + 'static,
    B: BlobStore + 'static,
    Q: ReviewQueue + 'static,
    M: MessageDeliveryProvider + 'static,
{
    let result = service.submit_page(
        &FormId(form_id),
        &slot,
        page_number,
        request.expected_submission_count,
        request.content.as_bytes(),
        &request.content_type,
        request.device,
    );
    match result {
        Ok(form) => (StatusCode::ACCEPTED, axum::Json(form)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn resolve_page_handler<S, B, Q, M>(
    State(service): State<Arc<IntakeService<S, B, Q, M>>>,
    Path((admin_check_id, slot, page_number)): Path<(String, String, u32)>,
    axum::Json(request): axum::Json<ResolvePageRequest>,
) -> Response
where
    S: IntakeStore + 'static,
    B: BlobStore + 'static,
    Q: ReviewQueue + 'static,
    M: MessageDeliveryProvider + 'static,
{
    let result = service.resolve_admin_page(
        &AdminCheckId(admin_check_id),
        &slot,
        page_number,
        request.verdict,
        request.completed_by,
    );
    match result {
        Ok(check) => (StatusCode::OK, axum::Json(check)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn complete_action_handler<S, B, Q, M>(
    State(service): State<Arc<IntakeService<S, B, Q, M>>>,
    Path(action_id): Path<String>,
    axum::Json(request): axum::Json<CompleteActionRequest>,
) -> Response
where
    S: IntakeStore + 'static,
    B: BlobStore + 'static,
    Q: ReviewQueue + 'static,
    M: MessageDeliveryProvider + 'static,
{
    let result = service.complete_action(&ActionId(action_id), request.completed_by);
    match result {
        Ok(action) => (StatusCode::OK, axum::Json(action)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delivery_handler<S, B, Q, M>(
    State(service): State<Arc<IntakeService<S, B, Q, M>>>,
    axum::Json(request): axum::Json<DeliveryCallbackRequest>,
) -> Response
where
    S: IntakeStore + 'static,
    B: BlobStore + 'static,
    Q: ReviewQueue + 'static,
    M: MessageDeliveryProvider + 'static,
{
    let result = service.record_delivery(
        &request.company_id,
        &request.dashboard_id,
        &request.applicant_id,
        request.callback,
    );
    match result {
        Ok(DeliveryOutcome::Resolved(status)) => {
            let payload = json!({ "outcome": "resolved", "status": status });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Ok(DeliveryOutcome::Ignored) => {
            let payload = json!({ "outcome": "ignored" });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

/// Stale writes are conflicts the caller retries; bad transitions and
/// incomplete drafts are unprocessable; unknown entities are 404.
fn error_response(error: IntakeError) -> Response {
    let status = match &error {
        IntakeError::Page(PageError::StaleSubmission { .. })
        | IntakeError::Page(PageError::ConcurrentUpdate)
        | IntakeError::Review(ReviewError::StaleReview { .. })
        | IntakeError::Review(ReviewError::StaleSnapshot) => StatusCode::CONFLICT,
        IntakeError::Page(PageError::InvalidTransition { .. })
        | IntakeError::Publish(_)
        | IntakeError::Review(ReviewError::InvalidTransition { .. })
        | IntakeError::PageOutOfRange { .. }
        | IntakeError::UnsupportedFormat { .. }
        | IntakeError::PageTooLarge { .. }
        | IntakeError::NothingToReview(_)
        | IntakeError::AlreadyPublished(_)
        | IntakeError::NotPublished(_)
        | IntakeError::InviteMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        IntakeError::NotFound { .. }
        | IntakeError::UnknownSlot { .. }
        | IntakeError::Review(ReviewError::UnknownSlot { .. })
        | IntakeError::Review(ReviewError::UnknownPage { .. })
        | IntakeError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}
