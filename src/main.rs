// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use clap::Parser;
use env_logger::Env;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use rustypush::api::configure_routes;
use rustypush::config::Settings;
use rustypush::notify::ApnsClient;
use rustypush::state::AppState;
use rustypush::store::file::FileRegistrationStore;

#[derive(Parser, Debug)]
#[command(
    name = "rustypush-server",
    about = "Coalescing push-notification bridge between mailbox providers and APNs"
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "RUSTYPUSH_CONFIG")]
    config: Option<String>,
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::new(cli.config.as_deref())
        .map_err(|e| startup_error("Configuration error", e))?;

    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or(settings.log.level.clone()))
        .init();

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()
        .map_err(|e| startup_error("HTTP client error", e))?;

    let apns_key = std::fs::read(&settings.apns.key_path).map_err(|e| {
        startup_error(
            &format!("Cannot read APNs signing key {}", settings.apns.key_path),
            e,
        )
    })?;
    let apns = ApnsClient::new(settings.apns.clone(), &apns_key, http.clone())
        .map_err(|e| startup_error("APNs client error", e))?;

    let store = FileRegistrationStore::new(&settings.store_path);
    store
        .initialize()
        .await
        .map_err(|e| startup_error("Registration store error", e))?;

    let state = AppState::new(settings.clone(), Arc::new(store), Arc::new(apns), http);
    let app_data = web::Data::new(state);

    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    info!("Starting rustypush server at http://{}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(app_data.clone())
            .configure(configure_routes)
    })
    .bind(&bind_addr)?
    .run()
    .await
}
