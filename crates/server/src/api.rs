//! JSON surface of the decision engine.
//!
//! - `POST /webhooks/gateway`                           inbound gateway events
//! - `POST /api/v1/tickets/classify`                    classify a ticket or free text
//! - `POST /api/v1/tickets/{ticket_id}/request-reply`   ask a contact about a ticket

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use deskpilot_agent::ClassificationEngine;
use deskpilot_core::audit::AuditContext;
use deskpilot_core::conversation::{ContactKey, MAX_REPLY_TTL_SECS};
use deskpilot_core::domain::ticket::{ClassificationRequest, ClassificationResult, TicketId};
use deskpilot_core::errors::{ApplicationError, DomainError, InterfaceError, InterfaceErrorKind};
use deskpilot_db::repositories::{RepositoryError, TicketRepository};
use deskpilot_db::SettingsProvider;
use deskpilot_gateway::{InboundEvent, InboundRouter, RouteError, RouteOutcome};

pub const WEBHOOK_SECRET_HEADER: &str = "x-deskpilot-webhook-secret";

#[derive(Clone)]
pub struct ApiState {
    pub classifier: Arc<ClassificationEngine>,
    pub settings: Arc<dyn SettingsProvider>,
    pub tickets: Arc<dyn TicketRepository>,
    pub router: Arc<InboundRouter>,
    pub webhook_secret: Option<SecretString>,
    /// Channel instance used when a reply request does not name one.
    pub instance_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyBody {
    /// When present, the result is written back to this ticket.
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(flatten)]
    pub request: ClassificationRequest,
}

#[derive(Debug, Deserialize)]
pub struct RequestReplyBody {
    pub contact_id: String,
    #[serde(default)]
    pub channel_instance_id: Option<String>,
    pub prompt_text: String,
    #[serde(default)]
    pub ttl_secs: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RequestReplyResponse {
    pub ticket_id: TicketId,
    pub contact_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

type ApiFailure = (StatusCode, Json<ApiError>);

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/webhooks/gateway", post(gateway_webhook))
        .route("/api/v1/tickets/classify", post(classify_ticket))
        .route("/api/v1/tickets/{ticket_id}/request-reply", post(request_reply))
        .with_state(state)
}

async fn gateway_webhook(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(event): Json<InboundEvent>,
) -> Result<Json<RouteOutcome>, ApiFailure> {
    if let Some(secret) = &state.webhook_secret {
        let provided = headers.get(WEBHOOK_SECRET_HEADER).and_then(|value| value.to_str().ok());
        if provided != Some(secret.expose_secret()) {
            warn!(
                event_name = "ingress.webhook.rejected",
                correlation_id = %event.message_id,
                "webhook secret missing or invalid"
            );
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ApiError {
                    error: "missing or invalid webhook secret".to_string(),
                    correlation_id: event.message_id,
                }),
            ));
        }
    }

    state
        .router
        .route(&event)
        .await
        .map(Json)
        .map_err(|error| interface_failure(route_error(error).into_interface(&event.message_id)))
}

async fn classify_ticket(
    State(state): State<ApiState>,
    Json(body): Json<ClassifyBody>,
) -> Result<Json<ClassificationResult>, ApiFailure> {
    let correlation_id = Uuid::new_v4().to_string();
    let fail = |error: ApplicationError| interface_failure(error.into_interface(&correlation_id));

    if body.request.message_text.trim().is_empty() {
        return Err(fail(ApplicationError::from(DomainError::InvariantViolation(
            "message_text is empty".to_string(),
        ))));
    }

    let ticket_id = body.ticket_id.map(TicketId);
    if let Some(id) = &ticket_id {
        let exists = state.tickets.find_by_id(id).await.map_err(|e| fail(repository_error(e)))?;
        if exists.is_none() {
            return Err(fail(ApplicationError::NotFound(format!("ticket {id}"))));
        }
    }

    let snapshot = state.settings.snapshot().await;
    let audit = AuditContext::new(ticket_id.clone(), None, correlation_id.clone(), "api");
    let result = state.classifier.classify_with_context(&body.request, &snapshot, &audit).await;

    if let Some(id) = &ticket_id {
        state
            .tickets
            .apply_classification(id, &result)
            .await
            .map_err(|e| fail(repository_error(e)))?;
    }

    info!(
        event_name = "api.ticket.classified",
        correlation_id = %correlation_id,
        ticket_id = ticket_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
        priority = result.priority.as_str(),
        mode = result.mode.as_str(),
        degraded = result.degraded,
        "classification served"
    );
    Ok(Json(result))
}

async fn request_reply(
    State(state): State<ApiState>,
    Path(ticket_id): Path<String>,
    Json(body): Json<RequestReplyBody>,
) -> Result<Json<RequestReplyResponse>, ApiFailure> {
    let correlation_id = format!("reply-request-{ticket_id}");
    let fail = |error: ApplicationError| interface_failure(error.into_interface(&correlation_id));

    if body.contact_id.trim().is_empty() || body.prompt_text.trim().is_empty() {
        return Err(fail(ApplicationError::from(DomainError::InvariantViolation(
            "contact_id and prompt_text are required".to_string(),
        ))));
    }
    if body.ttl_secs.is_some_and(|ttl| !(1..=MAX_REPLY_TTL_SECS).contains(&ttl)) {
        return Err(fail(ApplicationError::from(DomainError::InvariantViolation(format!(
            "ttl_secs must be between 1 and {MAX_REPLY_TTL_SECS}"
        )))));
    }

    let ticket_id = TicketId(ticket_id);
    let key = ContactKey::new(
        body.contact_id.trim(),
        body.channel_instance_id.unwrap_or_else(|| state.instance_id.clone()),
    );
    let expires_at = state
        .router
        .request_reply(&ticket_id, &key, &body.prompt_text, body.ttl_secs, Utc::now())
        .await
        .map_err(|error| fail(route_error(error)))?;

    Ok(Json(RequestReplyResponse { ticket_id, contact_id: key.contact_id, expires_at }))
}

fn repository_error(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::NotFound(what) => ApplicationError::NotFound(what),
        RepositoryError::InvalidInput(message) => {
            ApplicationError::from(DomainError::InvariantViolation(message))
        }
        other => ApplicationError::Persistence(other.to_string()),
    }
}

fn route_error(error: RouteError) -> ApplicationError {
    match error {
        RouteError::Repository(error) => repository_error(error),
        RouteError::Transition(error) => ApplicationError::from(DomainError::from(error)),
        RouteError::UnknownTicket(id) => ApplicationError::NotFound(format!("ticket {id}")),
        RouteError::NotAwaiting(id) => ApplicationError::Configuration(format!(
            "reply request for ticket {id} was not applied"
        )),
    }
}

fn interface_failure(error: InterfaceError) -> ApiFailure {
    let status = match error.kind {
        InterfaceErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        InterfaceErrorKind::NotFound => StatusCode::NOT_FOUND,
        InterfaceErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "api.request_failed",
        correlation_id = %error.correlation_id,
        status = status.as_u16(),
        error = %error.detail,
        "request failed"
    );
    let error_text = error.user_message().to_string();
    (status, Json(ApiError { error: error_text, correlation_id: error.correlation_id }))
}
