// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use actix_web::web;

use crate::api::handlers::{app_opened, method_not_allowed, register_device};
use crate::api::webhooks::{gmail_notification, outlook_notification};

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // Client-facing lifecycle endpoints; POST only, anything else is 405.
    cfg.service(
        web::resource("/registerDevice")
            .route(web::post().to(register_device))
            .default_service(web::route().to(method_not_allowed)),
    );
    cfg.service(
        web::resource("/appOpened")
            .route(web::post().to(app_opened))
            .default_service(web::route().to(method_not_allowed)),
    );

    // Provider-facing webhook endpoints.
    cfg.service(
        web::scope("/notifications")
            .route("/gmail", web::post().to(gmail_notification))
            .route("/outlook", web::post().to(outlook_notification)),
    );
}
