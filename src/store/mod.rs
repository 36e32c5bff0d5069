// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Durable registration storage.
//!
//! One record per (email, provider) pair holds the device token, the provider
//! credential state and the queue of pending mail events that have not been
//! shown to the user yet. All mutations go through the [`RegistrationStore`]
//! trait so the pipeline can run against the JSON-file backend in production
//! and the in-memory backend in tests.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod file;
pub mod memory;

pub use file::FileRegistrationStore;
pub use memory::MemoryRegistrationStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Registration not found: {0}")]
    NotFound(String),
}

/// Which mail provider a registration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gmail,
    Outlook,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "gmail" => Some(ProviderKind::Gmail),
            "outlook" => Some(ProviderKind::Outlook),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gmail => "gmail",
            ProviderKind::Outlook => "outlook",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mail arrival that has not been surfaced to the user yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEvent {
    pub sender: String,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
}

/// Provider credential state. Access tokens are minted on demand from the
/// refresh token and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderCredentials {
    Gmail {
        refresh_token: String,
        /// Resumable history cursor; advancing it acknowledges processed mail.
        history_id: String,
        watch_expiry: DateTime<Utc>,
    },
    Outlook {
        refresh_token: String,
        subscription_id: String,
        /// Shared secret echoed back in every webhook notification.
        client_state: String,
        subscription_expiry: DateTime<Utc>,
    },
}

impl ProviderCredentials {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderCredentials::Gmail { .. } => ProviderKind::Gmail,
            ProviderCredentials::Outlook { .. } => ProviderKind::Outlook,
        }
    }

    /// When the provider-side watch or subscription stops delivering signals.
    pub fn expiry(&self) -> DateTime<Utc> {
        match self {
            ProviderCredentials::Gmail { watch_expiry, .. } => *watch_expiry,
            ProviderCredentials::Outlook {
                subscription_expiry,
                ..
            } => *subscription_expiry,
        }
    }

    pub fn refresh_token(&self) -> &str {
        match self {
            ProviderCredentials::Gmail { refresh_token, .. } => refresh_token,
            ProviderCredentials::Outlook { refresh_token, .. } => refresh_token,
        }
    }
}

/// Identity of one registration: a user can hold one per provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistrationKey {
    pub email: String,
    pub provider: ProviderKind,
}

impl RegistrationKey {
    pub fn new<E: Into<String>>(email: E, provider: ProviderKind) -> Self {
        Self {
            email: email.into(),
            provider,
        }
    }
}

impl fmt::Display for RegistrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.email, self.provider)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRegistration {
    pub email: String,
    pub device_token: String,
    pub credentials: ProviderCredentials,
    #[serde(default)]
    pub pending_events: Vec<PendingEvent>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl UserRegistration {
    pub fn new<E: Into<String>, D: Into<String>>(
        email: E,
        device_token: D,
        credentials: ProviderCredentials,
    ) -> Self {
        let now = Utc::now();
        Self {
            email: email.into(),
            device_token: device_token.into(),
            credentials,
            pending_events: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.credentials.kind()
    }

    pub fn key(&self) -> RegistrationKey {
        RegistrationKey::new(self.email.clone(), self.provider())
    }

    fn matches(&self, key: &RegistrationKey) -> bool {
        self.email == key.email && self.provider() == key.provider
    }
}

/// Storage contract for registrations and their pending-event queues.
///
/// Implementations must make every mutating call atomic per key: two signals
/// for the same user arriving near-simultaneously must not lose an event.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Look up a registration. Missing keys are `Ok(None)`, not an error.
    async fn get(&self, key: &RegistrationKey) -> Result<Option<UserRegistration>, StoreError>;

    /// Insert or replace the registration for its (email, provider) key.
    async fn upsert(&self, registration: UserRegistration) -> Result<(), StoreError>;

    /// Reverse lookup by webhook subscription id.
    async fn find_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserRegistration>, StoreError>;

    /// Append one event and return the full queue after the append.
    ///
    /// An event whose (sender, subject, timestamp) triple is already queued is
    /// skipped inside the same transaction, so redelivered signals cannot
    /// double-book one email.
    async fn append_event(
        &self,
        key: &RegistrationKey,
        event: PendingEvent,
    ) -> Result<Vec<PendingEvent>, StoreError>;

    /// Read-only snapshot of the queue. Missing keys yield an empty list.
    async fn list_events(&self, key: &RegistrationKey) -> Result<Vec<PendingEvent>, StoreError>;

    /// Drain the queue. Clearing a missing or already-empty key is a no-op.
    async fn clear_events(&self, key: &RegistrationKey) -> Result<(), StoreError>;

    /// Overwrite the credential state in a single atomic update. Used for
    /// cursor advances, refresh-token rotation and subscription renewal.
    async fn update_credentials(
        &self,
        key: &RegistrationKey,
        credentials: ProviderCredentials,
    ) -> Result<(), StoreError>;
}
