// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Outlook integration: Microsoft identity platform token grants and Graph
//! change-notification subscriptions.
//!
//! Graph pushes webhook notifications directly to this service. Each
//! subscription carries a per-registration `clientState` secret that
//! inbound notifications must echo back, and a hard expiry that has to be
//! extended before it lapses (Graph caps mail subscriptions at a few days).

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};
use serde::Deserialize;

use super::{error_for_status, SubscriptionHandle, TokenResponse};
use crate::config::OutlookConfig;
use crate::error::NotifyError;
use crate::store::PendingEvent;

const OAUTH_SCOPE: &str = "Mail.Read Mail.ReadWrite User.Read offline_access";

/// Longest lifetime Graph grants a mail subscription, in minutes.
const SUBSCRIPTION_LIFETIME_MINUTES: i64 = 4200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionResponse {
    id: String,
    expiration_date_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageResponse {
    from: Option<Recipient>,
    subject: Option<String>,
    received_date_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    email_address: Option<EmailAddress>,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    name: Option<String>,
    address: Option<String>,
}

/// Microsoft Graph client bound to one OAuth application.
#[derive(Debug, Clone)]
pub struct OutlookClient {
    config: OutlookConfig,
    http: reqwest::Client,
}

impl OutlookClient {
    pub fn new(config: OutlookConfig, http: reqwest::Client) -> Self {
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
            ("scope", OAUTH_SCOPE),
        ];

        info!("Exchanging Outlook authorization code for tokens");

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Outlook token exchange failed: HTTP {} - {}", status, body);
            return Err(NotifyError::Provider(format!(
                "Outlook token exchange: HTTP {}: {}",
                status, body
            )));
        }

        let tokens: TokenResponse = response.json().await.map_err(|e| {
            NotifyError::Provider(format!("Outlook token exchange: JSON parse: {}", e))
        })?;
        Ok(tokens)
    }

    /// Mint a fresh access token from a stored refresh token.
    ///
    /// Microsoft rotates refresh tokens on every grant; when the response
    /// carries none the old token is still the live one, so it is echoed
    /// back for the caller to persist.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, NotifyError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
            ("scope", OAUTH_SCOPE),
        ];

        debug!("Refreshing Outlook access token");

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Outlook token refresh failed: HTTP {} - {}", status, body);
            return Err(NotifyError::AuthExpired(format!(
                "Outlook token refresh: HTTP {}: {}",
                status, body
            )));
        }

        let mut tokens: TokenResponse = response.json().await.map_err(|e| {
            NotifyError::Provider(format!("Outlook token refresh: JSON parse: {}", e))
        })?;
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }
        Ok(tokens)
    }

    /// Create an inbox change-notification subscription.
    ///
    /// `client_state` is the shared secret Graph echoes back in every
    /// notification for this subscription.
    pub async fn create_subscription(
        &self,
        access_token: &str,
        client_state: &str,
    ) -> Result<SubscriptionHandle, NotifyError> {
        let expiration = Utc::now() + Duration::minutes(SUBSCRIPTION_LIFETIME_MINUTES);
        let body = serde_json::json!({
            "changeType": "created",
            "notificationUrl": self.config.notification_url,
            "resource": "me/mailFolders('inbox')/messages",
            "expirationDateTime": expiration.to_rfc3339(),
            "clientState": client_state,
        });

        let response = self
            .http
            .post(format!("{}/subscriptions", self.config.graph_base_url))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;
        let response = error_for_status(response, "Graph subscription create").await?;

        let subscription: SubscriptionResponse = response.json().await.map_err(|e| {
            NotifyError::Provider(format!("Graph subscription create: JSON parse: {}", e))
        })?;

        info!(
            "Graph subscription {} created, expires {}",
            subscription.id, subscription.expiration_date_time
        );

        Ok(SubscriptionHandle {
            position: subscription.id,
            expiry: subscription.expiration_date_time,
        })
    }

    /// Extend an existing subscription's expiry.
    ///
    /// Fails with `NotFound` when Graph already dropped the subscription
    /// server-side; the caller recovers by creating a new one.
    pub async fn renew_subscription(
        &self,
        access_token: &str,
        subscription_id: &str,
    ) -> Result<SubscriptionHandle, NotifyError> {
        let expiration = Utc::now() + Duration::minutes(SUBSCRIPTION_LIFETIME_MINUTES);
        let body = serde_json::json!({
            "expirationDateTime": expiration.to_rfc3339(),
        });

        let response = self
            .http
            .patch(format!(
                "{}/subscriptions/{}",
                self.config.graph_base_url, subscription_id
            ))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;
        let response = error_for_status(response, "Graph subscription renew").await?;

        let subscription: SubscriptionResponse = response.json().await.map_err(|e| {
            NotifyError::Provider(format!("Graph subscription renew: JSON parse: {}", e))
        })?;

        Ok(SubscriptionHandle {
            position: subscription.id,
            expiry: subscription.expiration_date_time,
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
                "{}/me/messages/{}",
                self.config.graph_base_url, message_id
            ))
            .bearer_auth(access_token)
            .query(&[("$select", "from,subject,receivedDateTime")])
            .send()
            .await?;
        let response = error_for_status(response, "Graph message fetch").await?;

        let message: MessageResponse = response.json().await.map_err(|e| {
            NotifyError::Provider(format!("Graph message fetch: JSON parse: {}", e))
        })?;

        let address = message.from.and_then(|f| f.email_address);
        let sender = address
            .as_ref()
            .and_then(|a| a.name.clone())
            .filter(|s| !s.is_empty())
            .or_else(|| address.as_ref().and_then(|a| a.address.clone()))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        let subject = message
            .subject
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "(No subject)".to_string());

        Ok(PendingEvent {
            sender,
            subject,
            timestamp: message.received_date_time,
        })
    }
}
