// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mailbox provider integrations.
//!
//! Each provider module exchanges OAuth codes for tokens, keeps a
//! change-notification channel alive (Gmail watch, Graph subscription)
//! and turns a provider signal into the new messages behind it.

pub mod gmail;
pub mod outlook;

use crate::error::NotifyError;
use serde::Deserialize;

/// Token endpoint response shared by both OAuth providers.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Absent when the grant does not rotate the refresh token.
    pub refresh_token: Option<String>,
}

/// Outcome of establishing or renewing a notification channel.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    /// Provider-side position or identity of the channel. For Gmail this is
    /// the mailbox history id, for Graph the subscription id.
    pub position: String,
    pub expiry: chrono::DateTime<chrono::Utc>,
}

/// Maps a non-success provider response onto the error taxonomy.
///
/// 401 means the access token is no longer honored and a refresh should be
/// attempted; 404 means the addressed resource is gone and can be skipped
/// or recreated by the caller.
pub(crate) async fn error_for_status(
    response: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response, NotifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 => Err(NotifyError::AuthExpired(format!(
            "{}: {} {}",
            context, status, body
        ))),
        404 => Err(NotifyError::NotFound(format!(
            "{}: {} {}",
            context, status, body
        ))),
        _ => Err(NotifyError::Provider(format!(
            "{}: {} {}",
            context, status, body
        ))),
    }
}
