// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Shared application state handed to every request handler.

use std::sync::Arc;

use crate::config::Settings;
use crate::notify::ApnsClient;
use crate::providers::{gmail::GmailClient, outlook::OutlookClient};
use crate::store::RegistrationStore;

/// Everything a handler or pipeline run needs: configuration, the durable
/// registration store, the provider clients and the push dispatcher.
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub store: Arc<dyn RegistrationStore>,
    pub gmail: GmailClient,
    pub outlook: OutlookClient,
    pub apns: Arc<ApnsClient>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        store: Arc<dyn RegistrationStore>,
        apns: Arc<ApnsClient>,
        http: reqwest::Client,
    ) -> Self {
        let gmail = GmailClient::new(settings.gmail.clone(), http.clone());
        let outlook = OutlookClient::new(settings.outlook.clone(), http);
        Self {
            settings,
            store,
            gmail,
            outlook,
            apns,
        }
    }
}
