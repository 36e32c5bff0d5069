// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error taxonomy shared by the provider adapters, the push dispatcher and
//! the notification pipeline.
//!
//! The variants matter more than the messages: the pipeline recovers from
//! `AuthExpired` with one token refresh, skips `NotFound` messages, aborts a
//! run on `Provider`, and treats `Transient` as retry-safe because nothing
//! was persisted at the point of failure.

use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum NotifyError {
    /// The provider rejected our access token. Recoverable by minting a
    /// fresh one from the refresh token, at most once per fetch.
    #[error("Access token rejected: {0}")]
    AuthExpired(String),

    /// The message or resource vanished upstream. Skippable, never fatal.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other upstream 4xx/5xx. Aborts the current run; the next signal
    /// retries naturally because signals are not acked until processing
    /// completes.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The push gateway says the device token is permanently invalid.
    /// Retrying cannot help; the registration should be removed.
    #[error("Push delivery rejected: {0}")]
    DeliveryRejected(String),

    /// Network failure or timeout. Safe to retry.
    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            NotifyError::Transient(err.to_string())
        } else {
            NotifyError::Provider(err.to_string())
        }
    }
}
