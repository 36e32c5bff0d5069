// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests for channel establishment and renewal.

use chrono::{TimeZone, Utc};
use mockito::Matcher;

use rustypush::error::NotifyError;
use rustypush::store::{ProviderCredentials, ProviderKind, RegistrationStore};
use rustypush::subscription::{establish, renew_if_expiring, RENEWAL_THRESHOLD_HOURS};

use crate::common::{
    gmail_registration, hours_from_now, outlook_registration, test_state,
};

// 2025-06-14T12:00:00Z
const WATCH_EXPIRATION_MS: &str = "1749902400000";

#[tokio::test]
async fn test_establish_gmail_opens_watch() {
    let mut server = mockito::Server::new_async().await;
    let state = test_state(&server.url());

    let token_mock = server
        .mock("POST", "/google/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("code".into(), "auth-1".into()),
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("client_id".into(), "google-client".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"at-1","refresh_token":"rt-1","expires_in":3599}"#)
        .create_async()
        .await;
    let watch_mock = server
        .mock("POST", "/gmail/v1/users/me/watch")
        .match_header("authorization", "Bearer at-1")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "topicName": "projects/rustypush/topics/gmail-updates",
            "labelIds": ["INBOX"],
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"historyId":"100","expiration":"{}"}}"#,
            WATCH_EXPIRATION_MS
        ))
        .create_async()
        .await;

    let credentials = establish(&state, ProviderKind::Gmail, "auth-1")
        .await
        .expect("establish gmail");

    token_mock.assert_async().await;
    watch_mock.assert_async().await;

    match credentials {
        ProviderCredentials::Gmail {
            refresh_token,
            history_id,
            watch_expiry,
        } => {
            assert_eq!(refresh_token, "rt-1");
            assert_eq!(history_id, "100");
            assert_eq!(
                watch_expiry,
                Utc.with_ymd_and_hms(2025, 6, 14, 12, 0, 0).single().expect("valid")
            );
        }
        other => panic!("expected Gmail credentials, got {:?}", other),
    }
}

#[tokio::test]
async fn test_establish_gmail_requires_refresh_token() {
    let mut server = mockito::Server::new_async().await;
    let state = test_state(&server.url());

    server
        .mock("POST", "/google/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"at-1","expires_in":3599}"#)
        .create_async()
        .await;

    let result = establish(&state, ProviderKind::Gmail, "auth-1").await;
    match result {
        Err(NotifyError::Provider(reason)) => assert!(reason.contains("refresh token")),
        other => panic!("expected Provider error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_establish_outlook_creates_subscription() {
    let mut server = mockito::Server::new_async().await;
    let state = test_state(&server.url());

    let token_mock = server
        .mock("POST", "/ms/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("code".into(), "auth-2".into()),
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"at-1","refresh_token":"rt-1"}"#)
        .create_async()
        .await;
    let create_mock = server
        .mock("POST", "/graph/subscriptions")
        .match_header("authorization", "Bearer at-1")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "changeType": "created",
            "resource": "me/mailFolders('inbox')/messages",
            "notificationUrl": "https://push.example.com/notifications/outlook",
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"sub-1","expirationDateTime":"2025-06-13T10:00:00Z"}"#)
        .create_async()
        .await;

    let credentials = establish(&state, ProviderKind::Outlook, "auth-2")
        .await
        .expect("establish outlook");

    token_mock.assert_async().await;
    create_mock.assert_async().await;

    match credentials {
        ProviderCredentials::Outlook {
            refresh_token,
            subscription_id,
            client_state,
            subscription_expiry,
        } => {
            assert_eq!(refresh_token, "rt-1");
            assert_eq!(subscription_id, "sub-1");
            // Freshly minted UUID secret.
            assert_eq!(client_state.len(), 36);
            assert_eq!(client_state.matches('-').count(), 4);
            assert_eq!(
                subscription_expiry,
                Utc.with_ymd_and_hms(2025, 6, 13, 10, 0, 0).single().expect("valid")
            );
        }
        other => panic!("expected Outlook credentials, got {:?}", other),
    }
}

#[tokio::test]
async fn test_renewal_skipped_while_channel_valid() {
    let server = mockito::Server::new_async().await;
    let state = test_state(&server.url());

    let registration = gmail_registration("a@example.com", "100", hours_from_now(25));
    state
        .store
        .upsert(registration.clone())
        .await
        .expect("seed registration");

    let renewed = renew_if_expiring(&state, &registration, RENEWAL_THRESHOLD_HOURS)
        .await
        .expect("renewal check");
    assert!(renewed.is_none());
}

#[tokio::test]
async fn test_renewal_reissues_gmail_watch() {
    let mut server = mockito::Server::new_async().await;
    let state = test_state(&server.url());

    let registration = gmail_registration("a@example.com", "100", hours_from_now(23));
    let key = registration.key();
    state
        .store
        .upsert(registration.clone())
        .await
        .expect("seed registration");

    server
        .mock("POST", "/google/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("refresh_token".into(), "gmail-refresh-1".into()),
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"at-2"}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/gmail/v1/users/me/watch")
        .match_header("authorization", "Bearer at-2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"historyId":"999","expiration":"{}"}}"#,
            WATCH_EXPIRATION_MS
        ))
        .create_async()
        .await;

    let renewed = renew_if_expiring(&state, &registration, RENEWAL_THRESHOLD_HOURS)
        .await
        .expect("renewal")
        .expect("channel was renewed");

    // A re-issued watch restarts the cursor at the mailbox's current position.
    match &renewed {
        ProviderCredentials::Gmail {
            refresh_token,
            history_id,
            ..
        } => {
            assert_eq!(refresh_token, "gmail-refresh-1");
            assert_eq!(history_id, "999");
        }
        other => panic!("expected Gmail credentials, got {:?}", other),
    }

    // The renewed state was persisted before being returned.
    let stored = state
        .store
        .get(&key)
        .await
        .expect("get")
        .expect("registration present");
    assert_eq!(stored.credentials, renewed);
}

#[tokio::test]
async fn test_renewal_patches_graph_subscription() {
    let mut server = mockito::Server::new_async().await;
    let state = test_state(&server.url());

    let registration =
        outlook_registration("b@example.com", "sub-1", "secret-1", hours_from_now(2));
    let key = registration.key();
    state
        .store
        .upsert(registration.clone())
        .await
        .expect("seed registration");

    server
        .mock("POST", "/ms/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"at-3","refresh_token":"outlook-refresh-2"}"#)
        .create_async()
        .await;
    let renew_mock = server
        .mock("PATCH", "/graph/subscriptions/sub-1")
        .match_header("authorization", "Bearer at-3")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"sub-1","expirationDateTime":"2025-06-13T10:00:00Z"}"#)
        .create_async()
        .await;

    let renewed = renew_if_expiring(&state, &registration, RENEWAL_THRESHOLD_HOURS)
        .await
        .expect("renewal")
        .expect("channel was renewed");
    renew_mock.assert_async().await;

    match &renewed {
        ProviderCredentials::Outlook {
            refresh_token,
            subscription_id,
            client_state,
            ..
        } => {
            assert_eq!(refresh_token, "outlook-refresh-2");
            assert_eq!(subscription_id, "sub-1");
            assert_eq!(client_state, "secret-1");
        }
        other => panic!("expected Outlook credentials, got {:?}", other),
    }

    let stored = state
        .store
        .get(&key)
        .await
        .expect("get")
        .expect("registration present");
    assert_eq!(stored.credentials, renewed);
}

#[tokio::test]
async fn test_renewal_recreates_lost_graph_subscription() {
    let mut server = mockito::Server::new_async().await;
    let state = test_state(&server.url());

    let registration =
        outlook_registration("b@example.com", "sub-1", "secret-1", hours_from_now(2));
    state
        .store
        .upsert(registration.clone())
        .await
        .expect("seed registration");

    server
        .mock("POST", "/ms/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"at-3"}"#)
        .create_async()
        .await;
    server
        .mock("PATCH", "/graph/subscriptions/sub-1")
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":{"code":"ResourceNotFound"}}"#)
        .create_async()
        .await;
    // Recovery path: a brand new subscription under the same secret.
    let recreate_mock = server
        .mock("POST", "/graph/subscriptions")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "clientState": "secret-1",
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"sub-2","expirationDateTime":"2025-06-13T10:00:00Z"}"#)
        .create_async()
        .await;

    let renewed = renew_if_expiring(&state, &registration, RENEWAL_THRESHOLD_HOURS)
        .await
        .expect("renewal")
        .expect("channel was renewed");
    recreate_mock.assert_async().await;

    match renewed {
        ProviderCredentials::Outlook {
            subscription_id,
            client_state,
            ..
        } => {
            assert_eq!(subscription_id, "sub-2");
            assert_eq!(client_state, "secret-1");
        }
        other => panic!("expected Outlook credentials, got {:?}", other),
    }
}
