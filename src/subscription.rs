// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Subscription lifecycle: establishing the provider-side "tell me about
//! new mail" channel and renewing it before it lapses.
//!
//! Renewal is deliberately checked only from the app-opened lifecycle
//! call, never while processing a change signal. Signal handling is
//! latency-sensitive and a renewal failure must not suppress a
//! notification, so the two never share a failure domain.

use chrono::{Duration, Utc};
use log::{info, warn};
use uuid::Uuid;

use crate::error::NotifyError;
use crate::state::AppState;
use crate::store::{ProviderCredentials, ProviderKind, UserRegistration};

/// Channels are renewed once their remaining validity drops below this.
pub const RENEWAL_THRESHOLD_HOURS: i64 = 24;

/// Exchange a one-time authorization code and open the change channel for
/// the chosen provider. Returns the credential state to persist.
pub async fn establish(
    state: &AppState,
    provider: ProviderKind,
    auth_code: &str,
) -> Result<ProviderCredentials, NotifyError> {
    match provider {
        ProviderKind::Gmail => {
            let tokens = state.gmail.exchange_code(auth_code).await?;
            let refresh_token = tokens.refresh_token.ok_or_else(|| {
                NotifyError::Provider("Gmail token exchange returned no refresh token".to_string())
            })?;
            let watch = state.gmail.establish_watch(&tokens.access_token).await?;
            Ok(ProviderCredentials::Gmail {
                refresh_token,
                history_id: watch.position,
                watch_expiry: watch.expiry,
            })
        }
        ProviderKind::Outlook => {
            let tokens = state.outlook.exchange_code(auth_code).await?;
            let refresh_token = tokens.refresh_token.ok_or_else(|| {
                NotifyError::Provider(
                    "Outlook token exchange returned no refresh token".to_string(),
                )
            })?;
            // Per-registration webhook secret; Graph echoes it back in
            // every notification for this subscription.
            let client_state = Uuid::new_v4().to_string();
            let subscription = state
                .outlook
                .create_subscription(&tokens.access_token, &client_state)
                .await?;
            Ok(ProviderCredentials::Outlook {
                refresh_token,
                subscription_id: subscription.position,
                client_state,
                subscription_expiry: subscription.expiry,
            })
        }
    }
}

/// Renew the registration's channel when its remaining validity is below
/// `threshold_hours`. The renewed credential state is persisted before it
/// is returned; `None` means the channel was still comfortably valid.
pub async fn renew_if_expiring(
    state: &AppState,
    registration: &UserRegistration,
    threshold_hours: i64,
) -> Result<Option<ProviderCredentials>, NotifyError> {
    let expiry = registration.credentials.expiry();
    if expiry - Utc::now() >= Duration::hours(threshold_hours) {
        return Ok(None);
    }

    info!(
        "Renewing {} channel for {} (expires {})",
        registration.provider(),
        registration.email,
        expiry
    );

    let renewed = match &registration.credentials {
        ProviderCredentials::Gmail { .. } => reestablish_gmail_watch(state, registration).await?,
        ProviderCredentials::Outlook {
            refresh_token,
            subscription_id,
            client_state,
            ..
        } => {
            let tokens = state.outlook.refresh_access_token(refresh_token).await?;
            let rotated = tokens
                .refresh_token
                .unwrap_or_else(|| refresh_token.clone());
            let subscription = match state
                .outlook
                .renew_subscription(&tokens.access_token, subscription_id)
                .await
            {
                Ok(handle) => handle,
                Err(NotifyError::NotFound(reason)) => {
                    // Graph dropped the subscription server-side; the only
                    // way back is a brand new one under the same secret.
                    warn!(
                        "Graph subscription {} for {} is gone ({}); creating a new one",
                        subscription_id, registration.email, reason
                    );
                    state
                        .outlook
                        .create_subscription(&tokens.access_token, client_state)
                        .await?
                }
                Err(e) => return Err(e),
            };
            let credentials = ProviderCredentials::Outlook {
                refresh_token: rotated,
                subscription_id: subscription.position,
                client_state: client_state.clone(),
                subscription_expiry: subscription.expiry,
            };
            state
                .store
                .update_credentials(&registration.key(), credentials.clone())
                .await?;
            credentials
        }
    };

    Ok(Some(renewed))
}

/// Re-register the Gmail watch, resetting the stored cursor to the
/// mailbox's current position. Used for renewal and for recovery when the
/// provider reports the old cursor as expired.
pub async fn reestablish_gmail_watch(
    state: &AppState,
    registration: &UserRegistration,
) -> Result<ProviderCredentials, NotifyError> {
    let refresh_token = registration.credentials.refresh_token();
    let tokens = state.gmail.refresh_access_token(refresh_token).await?;
    let rotated = tokens
        .refresh_token
        .unwrap_or_else(|| refresh_token.to_string());
    let watch = state.gmail.establish_watch(&tokens.access_token).await?;

    let credentials = ProviderCredentials::Gmail {
        refresh_token: rotated,
        history_id: watch.position,
        watch_expiry: watch.expiry,
    };
    state
        .store
        .update_credentials(&registration.key(), credentials.clone())
        .await?;
    Ok(credentials)
}
