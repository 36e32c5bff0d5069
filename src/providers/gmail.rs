// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Gmail integration: OAuth token grants, mailbox watch registration and
//! history-delta resolution.
//!
//! Gmail signals new mail through a Pub/Sub topic the watch publishes to.
//! The payload only says "something changed"; the actual messages are
//! recovered by listing history from the cursor stored at registration
//! time and advancing it once the messages are safely queued.

use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error, info};
use serde::Deserialize;

use super::{error_for_status, SubscriptionHandle, TokenResponse};
use crate::config::GmailConfig;
use crate::error::NotifyError;
use crate::store::PendingEvent;

/// Messages added to the inbox since a stored history cursor.
#[derive(Debug, Default)]
pub struct HistoryDelta {
    /// Distinct message ids, in the order the provider reported them.
    pub message_ids: Vec<String>,
    /// Mailbox position to persist once every message is queued.
    pub latest_history_id: Option<String>,
    /// Set when the provider no longer remembers the cursor. The caller
    /// must re-establish the watch to obtain a fresh position; an empty
    /// delta with this flag set never means "no mail".
    pub needs_full_resync: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchResponse {
    history_id: String,
    /// Epoch milliseconds, encoded as a decimal string.
    expiration: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryListResponse {
    #[serde(default)]
    history: Vec<HistoryEntry>,
    history_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryEntry {
    #[serde(default)]
    messages_added: Vec<MessageAdded>,
}

#[derive(Debug, Deserialize)]
struct MessageAdded {
    message: Option<MessageRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    id: String,
    #[serde(default)]
    label_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageResponse {
    payload: Option<MessagePayload>,
    internal_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<MessageHeader>,
}

#[derive(Debug, Deserialize)]
struct MessageHeader {
    name: String,
    value: String,
}

/// Gmail REST client bound to one OAuth application.
#[derive(Debug, Clone)]
pub struct GmailClient {
    config: GmailConfig,
    http: reqwest::Client,
}

impl GmailClient {
    pub fn new(config: GmailConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    /// Exchange a one-time authorization code for a token pair.
    pub async fn exchange_code(&self, auth_code: &str) -> Result<TokenResponse, NotifyError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", auth_code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        info!("Exchanging Gmail authorization code for tokens");

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Gmail token exchange failed: HTTP {} - {}", status, body);
            return Err(NotifyError::Provider(format!(
                "Gmail token exchange: HTTP {}: {}",
                status, body
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Provider(format!("Gmail token exchange: JSON parse: {}", e)))?;
        Ok(tokens)
    }

    /// Mint a fresh access token from a stored refresh token.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, NotifyError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        debug!("Refreshing Gmail access token");

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Gmail token refresh failed: HTTP {} - {}", status, body);
            return Err(NotifyError::AuthExpired(format!(
                "Gmail token refresh: HTTP {}: {}",
                status, body
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Provider(format!("Gmail token refresh: JSON parse: {}", e)))?;
        Ok(tokens)
    }

    /// Register (or replace) the inbox watch that publishes change signals
    /// to the configured Pub/Sub topic. Calling it again resets the cursor
    /// to the mailbox's current position.
    pub async fn establish_watch(
        &self,
        access_token: &str,
    ) -> Result<SubscriptionHandle, NotifyError> {
        let body = serde_json::json!({
            "topicName": self.config.pubsub_topic,
            "labelIds": ["INBOX"],
        });

        let response = self
            .http
            .post(format!("{}/users/me/watch", self.config.api_base_url))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;
        let response = error_for_status(response, "Gmail watch").await?;

        let watch: WatchResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Provider(format!("Gmail watch: JSON parse: {}", e)))?;
        let expiry = parse_epoch_millis(&watch.expiration)
            .ok_or_else(|| NotifyError::Provider(format!(
                "Gmail watch: bad expiration {}",
                watch.expiration
            )))?;

        info!(
            "Gmail watch established (history id {}, expires {})",
            watch.history_id, expiry
        );

        Ok(SubscriptionHandle {
            position: watch.history_id,
            expiry,
        })
    }

    /// List inbox messages added since `start_history_id`.
    ///
    /// A provider 404 means the cursor aged out of the history window and
    /// comes back as a resync request instead of an error.
    pub async fn list_new_messages(
        &self,
        access_token: &str,
        start_history_id: &str,
    ) -> Result<HistoryDelta, NotifyError> {
        let response = self
            .http
            .get(format!("{}/users/me/history", self.config.api_base_url))
            .bearer_auth(access_token)
            .query(&[
                ("startHistoryId", start_history_id),
                ("historyTypes", "messageAdded"),
                ("labelId", "INBOX"),
            ])
            .send()
            .await?;

        let response = match error_for_status(response, "Gmail history").await {
            Ok(response) => response,
            Err(NotifyError::NotFound(reason)) => {
                debug!("Gmail history cursor expired: {}", reason);
                return Ok(HistoryDelta {
                    needs_full_resync: true,
                    ..HistoryDelta::default()
                });
            }
            Err(e) => return Err(e),
        };

        let listing: HistoryListResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Provider(format!("Gmail history: JSON parse: {}", e)))?;

        let mut message_ids: Vec<String> = Vec::new();
        for entry in listing.history {
            for added in entry.messages_added {
                if let Some(message) = added.message {
                    if message.label_ids.iter().any(|l| l == "INBOX")
                        && !message_ids.contains(&message.id)
                    {
                        message_ids.push(message.id);
                    }
                }
            }
        }

        Ok(HistoryDelta {
            message_ids,
            latest_history_id: listing.history_id,
            needs_full_resync: false,
        })
    }

    /// Fetch sender/subject/arrival metadata for one message.
    pub async fn fetch_event(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> Result<PendingEvent, NotifyError> {
        let response = self
            .http
            .get(format!(
                "{}/users/me/messages/{}",
                self.config.api_base_url, message_id
            ))
            .bearer_auth(access_token)
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "From"),
                ("metadataHeaders", "Subject"),
            ])
            .send()
            .await?;
        let response = error_for_status(response, "Gmail message fetch").await?;

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Provider(format!("Gmail message fetch: JSON parse: {}", e)))?;

        let headers = message
            .payload
            .map(|p| p.headers)
            .unwrap_or_default();
        let from_header = header_value(&headers, "From").unwrap_or_default();
        let subject = header_value(&headers, "Subject")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "(No subject)".to_string());

        let timestamp = message
            .internal_date
            .as_deref()
            .and_then(parse_epoch_millis)
            .ok_or_else(|| {
                NotifyError::Provider(format!("Gmail message {}: bad internalDate", message_id))
            })?;

        Ok(PendingEvent {
            sender: display_name(&from_header),
            subject,
            timestamp,
        })
    }
}

fn header_value(headers: &[MessageHeader], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name == name)
        .map(|h| h.value.clone())
}

/// Extract the display name from a raw From header.
///
/// Everything before the first `<` is the name, trimmed and with double
/// quotes stripped. A header with no name part before the bracket (or no
/// bracket at all, after quote-stripping the whole value) is used as-is.
fn display_name(from_header: &str) -> String {
    match from_header.find('<') {
        Some(0) => from_header.to_string(),
        Some(idx) => from_header[..idx].trim().replace('"', ""),
        None => from_header.trim().replace('"', ""),
    }
}

fn parse_epoch_millis(raw: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = raw.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}
