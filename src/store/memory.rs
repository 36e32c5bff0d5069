// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-memory registration store, used by tests and local experiments.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    PendingEvent, ProviderCredentials, RegistrationKey, RegistrationStore, StoreError,
    UserRegistration,
};

#[derive(Default)]
pub struct MemoryRegistrationStore {
    registrations: Mutex<HashMap<RegistrationKey, UserRegistration>>,
}

impl MemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn get(&self, key: &RegistrationKey) -> Result<Option<UserRegistration>, StoreError> {
        let registrations = self.registrations.lock().await;
        Ok(registrations.get(key).cloned())
    }

    async fn upsert(&self, registration: UserRegistration) -> Result<(), StoreError> {
        let mut registrations = self.registrations.lock().await;
        registrations.insert(registration.key(), registration);
        Ok(())
    }

    async fn find_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserRegistration>, StoreError> {
        let registrations = self.registrations.lock().await;
        Ok(registrations
            .values()
            .find(|r| {
                matches!(
                    &r.credentials,
                    ProviderCredentials::Outlook { subscription_id: id, .. } if id == subscription_id
                )
            })
            .cloned())
    }

    async fn append_event(
        &self,
        key: &RegistrationKey,
        event: PendingEvent,
    ) -> Result<Vec<PendingEvent>, StoreError> {
        let mut registrations = self.registrations.lock().await;
        let registration = registrations
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if !registration.pending_events.contains(&event) {
            registration.pending_events.push(event);
        }
        registration.updated_at = chrono::Utc::now();

        Ok(registration.pending_events.clone())
    }

    async fn list_events(&self, key: &RegistrationKey) -> Result<Vec<PendingEvent>, StoreError> {
        let registrations = self.registrations.lock().await;
        Ok(registrations
            .get(key)
            .map(|r| r.pending_events.clone())
            .unwrap_or_default())
    }

    async fn clear_events(&self, key: &RegistrationKey) -> Result<(), StoreError> {
        let mut registrations = self.registrations.lock().await;
        if let Some(registration) = registrations.get_mut(key) {
            registration.pending_events.clear();
            registration.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn update_credentials(
        &self,
        key: &RegistrationKey,
        credentials: ProviderCredentials,
    ) -> Result<(), StoreError> {
        let mut registrations = self.registrations.lock().await;
        let registration = registrations
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        registration.credentials = credentials;
        registration.updated_at = chrono::Utc::now();

        Ok(())
    }
}
