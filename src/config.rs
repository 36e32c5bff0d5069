// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use config::{Environment, File};
use log::warn;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

/// Google OAuth and Gmail API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Must match the redirect URI the mobile client used for the auth code.
    pub redirect_uri: String,
    /// Fully qualified Pub/Sub topic the Gmail watch publishes to.
    pub pubsub_topic: String,
    pub token_url: String,
    pub api_base_url: String,
}

/// Microsoft OAuth and Graph API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlookConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Public URL Graph delivers webhook notifications to.
    pub notification_url: String,
    pub token_url: String,
    pub graph_base_url: String,
}

/// APNs delivery credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApnsConfig {
    pub team_id: String,
    pub key_id: String,
    /// Path to the .p8 signing key (PKCS#8 PEM), read once at startup.
    pub key_path: String,
    pub bundle_id: String,
    pub collapse_id: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub log: LogConfig,
    /// Shared secret the mobile client presents in X-API-Key.
    pub api_key: String,
    /// Display name used as the notification title.
    pub app_name: String,
    pub store_path: String,
    pub request_timeout_secs: u64,
    pub gmail: GmailConfig,
    pub outlook: OutlookConfig,
    pub apns: ApnsConfig,
}

impl Settings {
    pub fn new(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        // Default configuration values
        let mut config_builder = config::Config::builder()
            // Server defaults
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            // Log defaults
            .set_default("log.level", "info")?
            .set_default("app_name", "RustyPush")?
            .set_default("store_path", "data/registrations.json")?
            .set_default("request_timeout_secs", 10)?
            // Provider endpoints; overridable so tests can point at a mock
            .set_default("gmail.token_url", "https://oauth2.googleapis.com/token")?
            .set_default("gmail.api_base_url", "https://gmail.googleapis.com/gmail/v1")?
            .set_default(
                "outlook.token_url",
                "https://login.microsoftonline.com/common/oauth2/v2.0/token",
            )?
            .set_default("outlook.graph_base_url", "https://graph.microsoft.com/v1.0")?
            .set_default("apns.endpoint", "https://api.push.apple.com")?
            .set_default("apns.collapse_id", "rustypush-inbox")?;

        // Add configuration from file
        if let Some(path) = config_path {
            config_builder = config_builder.add_source(File::with_name(path));
        }

        // Add environment variables with prefix
        // e.g. `RUSTYPUSH_SERVER_PORT=...` would override `server.port`
        config_builder = config_builder.add_source(
            Environment::with_prefix("RUSTYPUSH")
                .separator("_")
                .ignore_empty(true),
        );

        // Add direct environment variables for important settings
        // e.g. `GOOGLE_CLIENT_ID=...` would override `gmail.client_id`
        let env_vars = [
            ("HOST", "server.host"),
            ("PORT", "server.port"),
            ("API_KEY", "api_key"),
            ("APP_NAME", "app_name"),
            ("STORE_PATH", "store_path"),
            ("GOOGLE_CLIENT_ID", "gmail.client_id"),
            ("GOOGLE_CLIENT_SECRET", "gmail.client_secret"),
            ("GOOGLE_REDIRECT_URI", "gmail.redirect_uri"),
            ("PUBSUB_TOPIC", "gmail.pubsub_topic"),
            ("MS_CLIENT_ID", "outlook.client_id"),
            ("MS_CLIENT_SECRET", "outlook.client_secret"),
            ("MS_REDIRECT_URI", "outlook.redirect_uri"),
            ("MS_NOTIFICATION_URL", "outlook.notification_url"),
            ("APNS_TEAM_ID", "apns.team_id"),
            ("APNS_KEY_ID", "apns.key_id"),
            ("APNS_KEY_PATH", "apns.key_path"),
            ("APNS_BUNDLE_ID", "apns.bundle_id"),
            ("APNS_ENDPOINT", "apns.endpoint"),
        ];

        for (env_var, config_path) in &env_vars {
            if let Ok(value) = env::var(env_var) {
                // Handle special case for port which needs to be parsed to integer
                if *env_var == "PORT" {
                    if let Ok(port) = value.parse::<u16>() {
                        config_builder = config_builder.set_override(*config_path, port)?;
                    } else {
                        warn!("Invalid port value in {}: {}", env_var, value);
                    }
                } else {
                    config_builder = config_builder.set_override(*config_path, value)?;
                }
            }
        }

        // Build the config and deserialize it into Settings
        config_builder.build()?.try_deserialize()
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
