// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Digest formatting: the accumulated pending events of one registration
//! rendered as a single notification.

use std::collections::HashMap;

use crate::store::PendingEvent;

/// Per-line rendering is readable up to this many events; past it the
/// digest collapses to a per-sender summary.
const LINE_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
}

/// Render pending events into one notification, newest first.
///
/// Zero events say so explicitly. Up to three events get a line each.
/// Beyond that the body becomes a count plus per-sender tallies, senders
/// ordered by the recency of their newest message.
pub fn format_digest(app_name: &str, events: &[PendingEvent]) -> NotificationContent {
    if events.is_empty() {
        return NotificationContent {
            title: app_name.to_string(),
            body: "No new emails".to_string(),
        };
    }

    let mut sorted: Vec<&PendingEvent> = events.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    if sorted.len() <= LINE_LIMIT {
        let lines: Vec<String> = sorted
            .iter()
            .map(|e| format!("• {}: {}", e.sender, e.subject))
            .collect();
        return NotificationContent {
            title: app_name.to_string(),
            body: lines.join("\n"),
        };
    }

    let mut sender_counts: HashMap<&str, usize> = HashMap::new();
    let mut sender_order: Vec<&str> = Vec::new();
    for event in &sorted {
        *sender_counts.entry(event.sender.as_str()).or_insert(0) += 1;
        if !sender_order.contains(&event.sender.as_str()) {
            sender_order.push(event.sender.as_str());
        }
    }

    let sender_parts: Vec<String> = sender_order
        .iter()
        .map(|sender| {
            let count = sender_counts[sender];
            if count > 1 {
                format!("{} ({})", sender, count)
            } else {
                (*sender).to_string()
            }
        })
        .collect();

    NotificationContent {
        title: app_name.to_string(),
        body: format!("{} new emails • {}", sorted.len(), sender_parts.join(" • ")),
    }
}
