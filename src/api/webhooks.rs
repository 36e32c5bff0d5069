// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Provider-facing entry points: the Pub/Sub push consumer for Gmail and
//! the Graph webhook for Outlook.
//!
//! Neither endpoint is client-facing and neither propagates pipeline
//! failures as panics; each signal is processed, logged and answered with
//! the status its provider's delivery contract expects.

use actix_web::{web, HttpResponse};
use base64::{engine::general_purpose, Engine as _};
use log::{error, info, warn};
use serde::Deserialize;

use super::errors::ApiErrorResponse;
use crate::pipeline::{self, GmailSignal, GraphNotification};
use crate::state::AppState;

/// Pub/Sub push envelope. The payload lives base64-encoded in
/// `message.data`.
#[derive(Debug, Deserialize)]
pub struct PubSubEnvelope {
    pub message: Option<PubSubMessage>,
}

#[derive(Debug, Deserialize)]
pub struct PubSubMessage {
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphValidationQuery {
    pub validation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphEnvelope {
    #[serde(default)]
    value: Vec<GraphNotification>,
}

// Handler for POST /notifications/gmail (Pub/Sub push subscription)
//
// 2xx acknowledges the message. A processing failure answers 500 so
// Pub/Sub redelivers; the pipeline's cursor ordering makes the retry
// re-derive exactly the events that were not durably queued.
pub async fn gmail_notification(
    state: web::Data<AppState>,
    envelope: web::Json<PubSubEnvelope>,
) -> HttpResponse {
    let data = match envelope.message.as_ref().and_then(|m| m.data.as_ref()) {
        Some(data) => data,
        None => {
            info!("Pub/Sub push without message data; acknowledging");
            return HttpResponse::NoContent().finish();
        }
    };

    let decoded = match general_purpose::STANDARD.decode(data) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!("Undecodable Pub/Sub payload: {}", e);
            return HttpResponse::BadRequest().json(ApiErrorResponse {
                error: "Invalid payload".to_string(),
            });
        }
    };
    let signal: GmailSignal = match serde_json::from_slice(&decoded) {
        Ok(signal) => signal,
        Err(e) => {
            warn!("Malformed Gmail change signal: {}", e);
            return HttpResponse::BadRequest().json(ApiErrorResponse {
                error: "Invalid payload".to_string(),
            });
        }
    };

    match pipeline::process_gmail_signal(&state, &signal).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => {
            error!("Gmail signal for {} failed: {}", signal.email_address, e);
            HttpResponse::InternalServerError().json(ApiErrorResponse {
                error: "Signal processing failed".to_string(),
            })
        }
    }
}

// Handler for POST /notifications/outlook (Graph webhook)
//
// Graph first probes the endpoint with a validationToken query parameter
// that must be echoed back verbatim as text/plain. Notification batches
// are processed per entry and always answered 202; a non-2xx would only
// make Graph retry a batch that partially succeeded.
pub async fn outlook_notification(
    state: web::Data<AppState>,
    query: web::Query<GraphValidationQuery>,
    body: web::Bytes,
) -> HttpResponse {
    if let Some(token) = &query.validation_token {
        info!("Answering Graph subscription validation handshake");
        return HttpResponse::Ok()
            .content_type("text/plain")
            .body(token.clone());
    }

    let envelope: GraphEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Undecodable Graph notification batch: {}", e);
            return HttpResponse::Accepted().finish();
        }
    };

    for notification in &envelope.value {
        if let Err(e) = pipeline::process_graph_notification(&state, notification).await {
            error!(
                "Graph notification for subscription {} failed: {}",
                notification.subscription_id, e
            );
        }
    }

    HttpResponse::Accepted().finish()
}
