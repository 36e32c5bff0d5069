// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Library core for RustyPush.
//!
//! Gmail delivers Pub/Sub messages carrying a history cursor, Microsoft
//! Graph delivers webhook notifications carrying a message id. Both are
//! normalized into per-user pending events, and every processed signal
//! ends with a single digest push summarizing the whole queue.

// --- Modules ---
pub mod api;
pub mod config;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod providers;
pub mod state;
pub mod store;
pub mod subscription;

// CONSOLIDATED PRELUDE
pub mod prelude {
    // Config
    pub use crate::config::Settings;

    // Core types
    pub use crate::error::NotifyError;
    pub use crate::state::AppState;
    pub use crate::store::{
        PendingEvent, ProviderCredentials, ProviderKind, RegistrationStore, UserRegistration,
    };

    // Common Libs
    pub use log::{debug, error, info, trace, warn};
    pub use std::sync::Arc;
}
