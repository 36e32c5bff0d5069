// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The notification pipeline: provider change signals in, one coalesced
//! push notification out.
//!
//! A run never advances the stored history cursor until every event it
//! resolved has been durably queued; advancing past an unqueued event
//! would lose it forever, while re-processing a queued one is harmless
//! (delivery is at-least-once and appends deduplicate).

use log::{debug, info, warn};
use serde::Deserialize;
use std::fmt;

use crate::error::NotifyError;
use crate::notify::{format_digest, NotificationContent};
use crate::state::AppState;
use crate::store::{
    PendingEvent, ProviderCredentials, ProviderKind, RegistrationKey, UserRegistration,
};
use crate::subscription;

/// Mailbox position in a Gmail change signal. The wire format documents a
/// string but real payloads carry a bare number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HistoryId {
    Text(String),
    Number(u64),
}

impl fmt::Display for HistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryId::Text(s) => write!(f, "{}", s),
            HistoryId::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Decoded Gmail change signal, published through Pub/Sub by the watch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailSignal {
    pub email_address: String,
    pub history_id: HistoryId,
}

/// One entry of a Graph change-notification batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNotification {
    pub subscription_id: String,
    pub client_state: Option<String>,
    pub change_type: Option<String>,
    pub resource: Option<String>,
    pub resource_data: Option<GraphResourceData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphResourceData {
    pub id: Option<String>,
}

/// Process one Gmail change signal end to end.
///
/// The signal itself only says "this mailbox moved"; the stored cursor
/// determines which messages are new. Signals for unknown users are
/// dropped quietly so stale watches cannot poison the queue consumer.
pub async fn process_gmail_signal(
    state: &AppState,
    signal: &GmailSignal,
) -> Result<(), NotifyError> {
    let key = RegistrationKey {
        email: signal.email_address.clone(),
        provider: ProviderKind::Gmail,
    };
    let registration = match state.store.get(&key).await? {
        Some(registration) => registration,
        None => {
            info!("Ignoring Gmail signal for unknown user {}", signal.email_address);
            return Ok(());
        }
    };

    debug!(
        "Gmail signal for {} (mailbox position {})",
        signal.email_address, signal.history_id
    );

    let (stored_refresh_token, stored_cursor, watch_expiry) = match &registration.credentials {
        ProviderCredentials::Gmail {
            refresh_token,
            history_id,
            watch_expiry,
        } => (refresh_token.clone(), history_id.clone(), *watch_expiry),
        _ => {
            return Err(NotifyError::Provider(format!(
                "registration {} does not hold Gmail credentials",
                key
            )))
        }
    };

    let tokens = state.gmail.refresh_access_token(&stored_refresh_token).await?;
    let mut access_token = tokens.access_token;
    let mut refresh_token = stored_refresh_token;
    if let Some(rotated) = tokens.refresh_token {
        state
            .store
            .update_credentials(
                &key,
                ProviderCredentials::Gmail {
                    refresh_token: rotated.clone(),
                    history_id: stored_cursor.clone(),
                    watch_expiry,
                },
            )
            .await?;
        refresh_token = rotated;
    }

    let delta = state
        .gmail
        .list_new_messages(&access_token, &stored_cursor)
        .await?;

    if delta.needs_full_resync {
        warn!(
            "Gmail cursor {} for {} expired; re-establishing watch",
            stored_cursor, signal.email_address
        );
        subscription::reestablish_gmail_watch(state, &registration).await?;
        return Ok(());
    }

    if delta.message_ids.is_empty() {
        debug!("No new inbox messages for {}", signal.email_address);
        return Ok(());
    }

    let mut refreshed_once = false;
    for message_id in &delta.message_ids {
        let event = fetch_gmail_event(
            state,
            &refresh_token,
            &mut access_token,
            &mut refreshed_once,
            message_id,
        )
        .await?;
        if let Some(event) = event {
            state.store.append_event(&key, event).await?;
        }
    }

    // Every resolved event is durably queued; only now may the cursor move.
    if let Some(latest) = delta.latest_history_id {
        state
            .store
            .update_credentials(
                &key,
                ProviderCredentials::Gmail {
                    refresh_token,
                    history_id: latest,
                    watch_expiry,
                },
            )
            .await?;
    }

    push_digest(state, &registration, &key).await
}

/// Fetch one message's metadata, refreshing the access token at most once
/// across the whole run when the provider rejects it mid-flight.
/// `Ok(None)` means the message vanished and is skipped.
async fn fetch_gmail_event(
    state: &AppState,
    refresh_token: &str,
    access_token: &mut String,
    refreshed_once: &mut bool,
    message_id: &str,
) -> Result<Option<PendingEvent>, NotifyError> {
    match state.gmail.fetch_event(access_token, message_id).await {
        Ok(event) => Ok(Some(event)),
        Err(NotifyError::NotFound(reason)) => {
            debug!("Message {} vanished before fetch: {}", message_id, reason);
            Ok(None)
        }
        Err(NotifyError::AuthExpired(reason)) if !*refreshed_once => {
            debug!("Gmail access token rejected mid-run: {}", reason);
            *refreshed_once = true;
            let tokens = state.gmail.refresh_access_token(refresh_token).await?;
            *access_token = tokens.access_token;
            match state.gmail.fetch_event(access_token, message_id).await {
                Ok(event) => Ok(Some(event)),
                Err(NotifyError::NotFound(reason)) => {
                    debug!("Message {} vanished before fetch: {}", message_id, reason);
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

/// Process one entry of a Graph change-notification batch.
///
/// The notification's `clientState` must match the secret issued when the
/// subscription was created; a mismatch is dropped and logged, never
/// processed. Refresh-token rotation is persisted before any fetch so a
/// crash mid-run cannot strand the registration on a dead token.
pub async fn process_graph_notification(
    state: &AppState,
    notification: &GraphNotification,
) -> Result<(), NotifyError> {
    let registration = match state
        .store
        .find_by_subscription(&notification.subscription_id)
        .await?
    {
        Some(registration) => registration,
        None => {
            info!(
                "Ignoring Graph notification for unknown subscription {}",
                notification.subscription_id
            );
            return Ok(());
        }
    };
    let key = registration.key();

    let (stored_refresh_token, subscription_id, client_state, subscription_expiry) =
        match &registration.credentials {
            ProviderCredentials::Outlook {
                refresh_token,
                subscription_id,
                client_state,
                subscription_expiry,
            } => (
                refresh_token.clone(),
                subscription_id.clone(),
                client_state.clone(),
                *subscription_expiry,
            ),
            _ => {
                return Err(NotifyError::Provider(format!(
                    "registration {} does not hold Outlook credentials",
                    key
                )))
            }
        };

    if notification.client_state.as_deref() != Some(client_state.as_str()) {
        warn!(
            "Dropping Graph notification for {} with mismatched client state",
            registration.email
        );
        return Ok(());
    }

    let tokens = state
        .outlook
        .refresh_access_token(&stored_refresh_token)
        .await?;
    let refresh_token = tokens
        .refresh_token
        .clone()
        .unwrap_or_else(|| stored_refresh_token.clone());
    // Rotation is silent and immediate on this provider; persist the
    // returned token even when it looks unchanged.
    state
        .store
        .update_credentials(
            &key,
            ProviderCredentials::Outlook {
                refresh_token: refresh_token.clone(),
                subscription_id: subscription_id.clone(),
                client_state: client_state.clone(),
                subscription_expiry,
            },
        )
        .await?;

    let message_id = notification
        .resource_data
        .as_ref()
        .and_then(|data| data.id.clone());
    match message_id {
        Some(message_id) => {
            let event = match state.outlook.fetch_event(&tokens.access_token, &message_id).await {
                Ok(event) => Some(event),
                Err(NotifyError::NotFound(reason)) => {
                    debug!("Message {} vanished before fetch: {}", message_id, reason);
                    None
                }
                Err(NotifyError::AuthExpired(reason)) => {
                    debug!("Outlook access token rejected mid-run: {}", reason);
                    let retry = state.outlook.refresh_access_token(&refresh_token).await?;
                    let rotated = retry
                        .refresh_token
                        .clone()
                        .unwrap_or_else(|| refresh_token.clone());
                    state
                        .store
                        .update_credentials(
                            &key,
                            ProviderCredentials::Outlook {
                                refresh_token: rotated,
                                subscription_id,
                                client_state,
                                subscription_expiry,
                            },
                        )
                        .await?;
                    match state.outlook.fetch_event(&retry.access_token, &message_id).await {
                        Ok(event) => Some(event),
                        Err(NotifyError::NotFound(reason)) => {
                            debug!("Message {} vanished before fetch: {}", message_id, reason);
                            None
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            };
            if let Some(event) = event {
                state.store.append_event(&key, event).await?;
            }
        }
        None => {
            debug!(
                "Graph notification for {} carries no resource data; nothing to append",
                registration.email
            );
        }
    }

    push_digest(state, &registration, &key).await
}

/// Format the registration's pending queue and deliver it.
///
/// An empty queue sends nothing: a signal that resolved to no durable
/// events (already-deleted mail, resource-less notifications) must not
/// wake the device. Delivery failures are logged and swallowed; the
/// events stay queued and ride along with the next signal's digest.
async fn push_digest(
    state: &AppState,
    registration: &UserRegistration,
    key: &RegistrationKey,
) -> Result<(), NotifyError> {
    let pending = state.store.list_events(key).await?;
    if pending.is_empty() {
        debug!("No pending events for {}; skipping push", key);
        return Ok(());
    }

    let content = format_digest(&state.settings.app_name, &pending);
    notify_device(state, registration, &content, pending.len()).await;
    Ok(())
}

async fn notify_device(
    state: &AppState,
    registration: &UserRegistration,
    content: &NotificationContent,
    pending_count: usize,
) {
    match state.apns.send(&registration.device_token, content).await {
        Ok(()) => {
            info!(
                "Notified {} ({} pending events)",
                registration.email, pending_count
            );
        }
        Err(NotifyError::DeliveryRejected(reason)) => {
            warn!(
                "Device token for {} permanently rejected ({}); registration should be retired",
                registration.email, reason
            );
        }
        Err(e) => {
            warn!(
                "Push delivery to {} failed, events stay queued: {}",
                registration.email, e
            );
        }
    }
}
