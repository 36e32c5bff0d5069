// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Notification formatting and delivery.

pub mod apns;
pub mod digest;

pub use apns::ApnsClient;
pub use digest::{format_digest, NotificationContent};
