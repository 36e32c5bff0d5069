// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Client-facing lifecycle endpoints: device registration and app-opened.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::errors::ApiError;
use crate::state::AppState;
use crate::store::{ProviderKind, RegistrationKey, UserRegistration};
use crate::subscription::{self, RENEWAL_THRESHOLD_HOURS};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    pub email: Option<String>,
    pub device_token: Option<String>,
    pub auth_code: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceResponse {
    pub success: bool,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_expiry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_expiry: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppOpenedRequest {
    pub email: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AppOpenedResponse {
    pub success: bool,
    pub renewed: bool,
    pub expiry: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Check the shared-secret header before anything else in a handler.
fn authorize(req: &HttpRequest, expected: &str) -> Result<(), ApiError> {
    let presented = req
        .headers()
        .get("X-API-Key")
        .and_then(|value| value.to_str().ok());
    if presented != Some(expected) {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

/// Fallback route for the registered paths: anything but POST is a 405.
pub async fn method_not_allowed() -> Result<HttpResponse, ApiError> {
    Err(ApiError::MethodNotAllowed)
}

fn iso8601(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// Handler for POST /registerDevice
pub async fn register_device(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RegisterDeviceRequest>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &state.settings.api_key)?;

    let body = body.into_inner();
    let email = body.email.filter(|v| !v.is_empty());
    let device_token = body.device_token.filter(|v| !v.is_empty());
    let auth_code = body.auth_code.filter(|v| !v.is_empty());
    let provider = body.provider.filter(|v| !v.is_empty());

    let (email, device_token, auth_code, provider) =
        match (email, device_token, auth_code, provider) {
            (Some(email), Some(device_token), Some(auth_code), Some(provider)) => {
                (email, device_token, auth_code, provider)
            }
            _ => return Err(ApiError::BadRequest("Missing required fields".to_string())),
        };
    let provider = ProviderKind::parse(&provider)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown provider: {}", provider)))?;

    let credentials = subscription::establish(&state, provider, &auth_code).await?;
    let expiry = credentials.expiry();

    let registration = UserRegistration::new(email.clone(), device_token, credentials);
    state.store.upsert(registration).await?;

    info!("Registered {} for {} notifications", email, provider);

    let mut response = RegisterDeviceResponse {
        success: true,
        provider: provider.to_string(),
        watch_expiry: None,
        subscription_expiry: None,
    };
    match provider {
        ProviderKind::Gmail => response.watch_expiry = Some(iso8601(expiry)),
        ProviderKind::Outlook => response.subscription_expiry = Some(iso8601(expiry)),
    }
    Ok(HttpResponse::Ok().json(response))
}

// Handler for POST /appOpened
pub async fn app_opened(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<AppOpenedRequest>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &state.settings.api_key)?;

    let body = body.into_inner();
    let email = body.email.filter(|v| !v.is_empty());
    let provider = body.provider.filter(|v| !v.is_empty());
    let (email, provider) = match (email, provider) {
        (Some(email), Some(provider)) => (email, provider),
        _ => return Err(ApiError::BadRequest("Missing required fields".to_string())),
    };
    let provider = ProviderKind::parse(&provider)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown provider: {}", provider)))?;

    let key = RegistrationKey { email, provider };
    let registration = state
        .store
        .get(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    // The user is looking at the mailbox; whatever was pending is seen.
    state.store.clear_events(&key).await?;

    let response =
        match subscription::renew_if_expiring(&state, &registration, RENEWAL_THRESHOLD_HOURS).await
        {
            Ok(Some(renewed)) => AppOpenedResponse {
                success: true,
                renewed: true,
                expiry: iso8601(renewed.expiry()),
                error: None,
            },
            Ok(None) => AppOpenedResponse {
                success: true,
                renewed: false,
                expiry: iso8601(registration.credentials.expiry()),
                error: None,
            },
            // The old channel usually outlives a failed renewal attempt;
            // surfacing a hard error here would only make the client retry
            // into the same failure.
            Err(e) => {
                warn!("Channel renewal for {} failed: {}", key, e);
                AppOpenedResponse {
                    success: true,
                    renewed: false,
                    expiry: iso8601(registration.credentials.expiry()),
                    error: Some("Renewal failed".to_string()),
                }
            }
        };

    Ok(HttpResponse::Ok().json(response))
}
