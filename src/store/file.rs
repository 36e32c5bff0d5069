// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! JSON-file registration store.
//!
//! The whole registration set lives in one document that is rewritten
//! atomically (temp file + rename) on every mutation. A single async lock
//! serializes read-modify-write cycles, which is what makes `append_event`
//! and `update_credentials` safe against concurrent signals in this
//! single-node deployment.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::fs as async_fs;
use tokio::sync::Mutex;

use super::{
    PendingEvent, ProviderCredentials, RegistrationKey, RegistrationStore, StoreError,
    UserRegistration,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistrationsDocument {
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    registrations: Vec<UserRegistration>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for RegistrationsDocument {
    fn default() -> Self {
        Self {
            version: default_version(),
            registrations: Vec::new(),
        }
    }
}

pub struct FileRegistrationStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRegistrationStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create the backing file (and parent directory) if it does not exist.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        if !self.path.exists() {
            info!("Creating registration store at: {:?}", self.path);

            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    async_fs::create_dir_all(parent).await?;
                }
            }

            self.save_document(&RegistrationsDocument::default())
                .await?;
        }

        Ok(())
    }

    async fn load_document(&self) -> Result<RegistrationsDocument, StoreError> {
        if !self.path.exists() {
            return Ok(RegistrationsDocument::default());
        }

        let contents = async_fs::read_to_string(&self.path).await?;
        let document: RegistrationsDocument = serde_json::from_str(&contents)?;

        debug!(
            "Loaded {} registrations from store",
            document.registrations.len()
        );
        Ok(document)
    }

    async fn save_document(&self, document: &RegistrationsDocument) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(document)?;

        // Write to a temporary file first, then rename for atomicity.
        let temp_path = self.path.with_extension("tmp");
        async_fs::write(&temp_path, json.as_bytes()).await?;

        // Refresh tokens live in this file; keep it owner-only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = async_fs::metadata(&temp_path).await?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o600);
            async_fs::set_permissions(&temp_path, permissions).await?;
        }

        async_fs::rename(&temp_path, &self.path).await?;

        debug!(
            "Saved {} registrations to store",
            document.registrations.len()
        );
        Ok(())
    }

    /// Load, apply `mutate`, save. The lock spans the whole cycle so updates
    /// from concurrent signal handlers never clobber each other.
    async fn with_document<T, F>(&self, mutate: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut RegistrationsDocument) -> Result<T, StoreError>,
    {
        let _guard = self.write_lock.lock().await;

        let mut document = self.load_document().await?;
        let value = mutate(&mut document)?;
        self.save_document(&document).await?;

        Ok(value)
    }
}

#[async_trait]
impl RegistrationStore for FileRegistrationStore {
    async fn get(&self, key: &RegistrationKey) -> Result<Option<UserRegistration>, StoreError> {
        let document = self.load_document().await?;
        Ok(document
            .registrations
            .into_iter()
            .find(|r| r.matches(key)))
    }

    async fn upsert(&self, registration: UserRegistration) -> Result<(), StoreError> {
        let key = registration.key();
        self.with_document(move |document| {
            document.registrations.retain(|r| !r.matches(&key));
            document.registrations.push(registration);
            Ok(())
        })
        .await
    }

    async fn find_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserRegistration>, StoreError> {
        let document = self.load_document().await?;
        Ok(document.registrations.into_iter().find(|r| {
            matches!(
                &r.credentials,
                ProviderCredentials::Outlook { subscription_id: id, .. } if id == subscription_id
            )
        }))
    }

    async fn append_event(
        &self,
        key: &RegistrationKey,
        event: PendingEvent,
    ) -> Result<Vec<PendingEvent>, StoreError> {
        self.with_document(move |document| {
            let registration = document
                .registrations
                .iter_mut()
                .find(|r| r.matches(key))
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

            if !registration.pending_events.contains(&event) {
                registration.pending_events.push(event);
            }
            registration.updated_at = chrono::Utc::now();

            Ok(registration.pending_events.clone())
        })
        .await
    }

    async fn list_events(&self, key: &RegistrationKey) -> Result<Vec<PendingEvent>, StoreError> {
        let document = self.load_document().await?;
        Ok(document
            .registrations
            .into_iter()
            .find(|r| r.matches(key))
            .map(|r| r.pending_events)
            .unwrap_or_default())
    }

    async fn clear_events(&self, key: &RegistrationKey) -> Result<(), StoreError> {
        self.with_document(move |document| {
            if let Some(registration) =
                document.registrations.iter_mut().find(|r| r.matches(key))
            {
                registration.pending_events.clear();
                registration.updated_at = chrono::Utc::now();
            }
            Ok(())
        })
        .await
    }

    async fn update_credentials(
        &self,
        key: &RegistrationKey,
        credentials: ProviderCredentials,
    ) -> Result<(), StoreError> {
        self.with_document(move |document| {
            let registration = document
                .registrations
                .iter_mut()
                .find(|r| r.matches(key))
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

            registration.credentials = credentials;
            registration.updated_at = chrono::Utc::now();

            Ok(())
        })
        .await
    }
}
