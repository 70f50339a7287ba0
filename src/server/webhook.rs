//! Webhook intake endpoint.
//!
//! Verifies the delivery signature, parses the payload and hands it to the
//! normalizer. Only a bad signature is reported to the sender; every other
//! failure is logged and the delivery acknowledged.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::types::DeliveryId;
use crate::webhooks::parse_webhook;

const HEADER_EVENT: &str = "x-github-event";
const HEADER_DELIVERY: &str = "x-github-delivery";
pub(super) const HEADER_SIGNATURE: &str = "x-hub-signature-256";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid signature")]
    InvalidSignature,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::InvalidSignature => {
                (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
            }
        }
    }
}

/// `POST /webhook`
///
/// - 202 Accepted: signature valid (or verification disabled)
/// - 401 Unauthorized: signature missing or wrong
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let accepted = Ok((StatusCode::ACCEPTED, "Accepted"));

    if !app_state
        .webhook_secret()
        .verify(&body, header(&headers, HEADER_SIGNATURE))
    {
        warn!(delivery_id = ?header(&headers, HEADER_DELIVERY), "Invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    let (Some(event_type), Some(delivery_id)) = (
        header(&headers, HEADER_EVENT),
        header(&headers, HEADER_DELIVERY),
    ) else {
        warn!("Webhook without event type or delivery ID, dropping");
        return accepted;
    };
    let delivery_id = DeliveryId::new(delivery_id);

    let webhook = match parse_webhook(event_type, delivery_id.clone(), &body) {
        Ok(Some(webhook)) => webhook,
        Ok(None) => {
            debug!(%delivery_id, event_type, "Ignoring unsupported webhook type");
            return accepted;
        }
        Err(e) => {
            warn!(%delivery_id, event_type, error = %e, "Failed to parse webhook payload");
            return accepted;
        }
    };

    match app_state.event_handler().handle_webhook(&webhook).await {
        Ok(event) => info!(
            %delivery_id,
            kind = %event.kind,
            repository = %event.repository,
            branch = %event.branch,
            "Stored webhook event"
        ),
        Err(e) => error!(%delivery_id, error = %e, "Failed to store webhook event"),
    }

    accepted
}

pub(super) fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
