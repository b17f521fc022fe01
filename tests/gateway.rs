//! End-to-end tests: a real server on an ephemeral port, driven by the
//! crate's WebSocket client and plain HTTP calls.

#![allow(clippy::panic, missing_docs)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use notify_gateway::app_state::AppState;
use notify_gateway::auth::{JwtValidator, TokenValidator};
use notify_gateway::client::NotificationClient;
use notify_gateway::domain::{Notification, UserId};
use notify_gateway::server;
use notify_gateway::service::DeliveryResult;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const SECRET: &[u8] = b"integration-secret";

struct Harness {
    addr: SocketAddr,
    state: AppState,
    jwt: JwtValidator,
    http: reqwest::Client,
}

impl Harness {
    async fn start() -> Self {
        let validator: Arc<dyn TokenValidator> = Arc::new(JwtValidator::new(SECRET, None));
        let state = AppState::new(validator, 16, 64);

        let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        tokio::spawn(server::serve(listener, state.clone()));

        Self {
            addr,
            state,
            jwt: JwtValidator::new(SECRET, None),
            http: reqwest::Client::new(),
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    fn token(&self, user: i64) -> String {
        let Ok(token) = self.jwt.issue(UserId::new(user), 300) else {
            panic!("signing failed");
        };
        token
    }

    async fn connect(&self, user: i64) -> (NotificationClient, mpsc::UnboundedReceiver<Notification>) {
        let token = self.token(user);
        let Ok(client) = NotificationClient::connect(&self.ws_url(), UserId::new(user), &token).await
        else {
            panic!("connect refused for user {user}");
        };
        let (tx, rx) = mpsc::unbounded_channel();
        client.on_notification(move |n| {
            let _ = tx.send(n.clone());
        });
        (client, rx)
    }

    async fn wait_for_connections(&self, user: i64, expected: usize) {
        let user = UserId::new(user);
        for _ in 0..200 {
            if self.state.registry.connection_count(user).await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("user {user} never reached {expected} connections");
    }

    async fn notify(&self, user: i64, payload: Value) -> DeliveryResult {
        let url = format!("http://{}/api/v1/users/{user}/notifications", self.addr);
        let Ok(response) = self.http.post(url).json(&json!({ "payload": payload })).send().await
        else {
            panic!("notify request failed");
        };
        let Ok(body) = response.json::<Value>().await else {
            panic!("notify response was not JSON");
        };
        DeliveryResult {
            notification_id: body
                .get("notification_id")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            user_id: UserId::new(user),
            attempted: count(&body, "attempted"),
            delivered: count(&body, "delivered"),
            failed: count(&body, "failed"),
        }
    }

    async fn get_json(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let Ok(response) = self.http.get(format!("http://{}{path}", self.addr)).send().await else {
            panic!("GET {path} failed");
        };
        let status = response.status();
        let Ok(body) = response.json::<Value>().await else {
            panic!("GET {path} returned non-JSON");
        };
        (status, body)
    }
}

fn count(body: &Value, key: &str) -> usize {
    body.get(key)
        .and_then(Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(usize::MAX)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Option<Notification> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn fan_out_to_every_connection_then_narrow_after_close() {
    let h = Harness::start().await;
    let (c1, mut rx1) = h.connect(42).await;
    let (c2, mut rx2) = h.connect(42).await;
    assert_ne!(c1.connection_id(), c2.connection_id());
    h.wait_for_connections(42, 2).await;

    let first = h.notify(42, json!("hello")).await;
    assert_eq!(first.attempted, 2);
    assert_eq!(first.delivered, 2);
    assert_eq!(next(&mut rx1).await.map(|n| n.payload), Some(json!("hello")));
    assert_eq!(next(&mut rx2).await.map(|n| n.payload), Some(json!("hello")));

    assert!(c1.disconnect().await.is_ok());
    h.wait_for_connections(42, 1).await;

    let second = h.notify(42, json!("again")).await;
    assert_eq!(second.attempted, 1);
    assert_eq!(next(&mut rx2).await.map(|n| n.payload), Some(json!("again")));
    assert!(next(&mut rx1).await.is_none());

    assert!(c2.disconnect().await.is_ok());
}

#[tokio::test]
async fn offline_user_gets_nothing() {
    let h = Harness::start().await;
    let result = h.notify(7, json!({"kind": "profile_update"})).await;
    assert_eq!(result.attempted, 0);

    let (status, body) = h.get_json("/api/v1/users/7/presence").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body.get("online"), Some(&json!(false)));
}

#[tokio::test]
async fn invalid_token_is_refused_without_registry_change() {
    let h = Harness::start().await;
    let (existing, _rx) = h.connect(42).await;
    h.wait_for_connections(42, 1).await;

    let refused = NotificationClient::connect(&h.ws_url(), UserId::new(42), "forged").await;
    assert!(refused.is_err());

    let other_users_token = h.token(43);
    let mismatched =
        NotificationClient::connect(&h.ws_url(), UserId::new(42), &other_users_token).await;
    assert!(mismatched.is_err());

    let ids: Vec<_> = h
        .state
        .registry
        .connections_for(UserId::new(42))
        .await
        .iter()
        .map(|c| c.id())
        .collect();
    assert_eq!(ids, vec![existing.connection_id()]);

    let Ok(response) = h
        .http
        .get(format!("http://{}/ws?user_id=42&token=forged", h.addr))
        .send()
        .await
    else {
        panic!("plain GET failed");
    };
    assert!(response.status().is_client_error());

    assert!(existing.disconnect().await.is_ok());
}

#[tokio::test]
async fn reconnect_is_fresh_and_does_not_replay() {
    let h = Harness::start().await;
    let (first, _rx) = h.connect(42).await;
    let first_id = first.connection_id();
    h.wait_for_connections(42, 1).await;

    assert!(first.disconnect().await.is_ok());
    h.wait_for_connections(42, 0).await;

    let missed = h.notify(42, json!("while away")).await;
    assert_eq!(missed.attempted, 0);

    let (second, mut rx) = h.connect(42).await;
    assert_ne!(second.connection_id(), first_id);
    h.wait_for_connections(42, 1).await;
    assert!(
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err()
    );

    let _ = h.notify(42, json!("welcome back")).await;
    assert_eq!(next(&mut rx).await.map(|n| n.payload), Some(json!("welcome back")));

    assert!(second.disconnect().await.is_ok());
}

#[tokio::test]
async fn logout_releases_connection_and_presence() {
    let h = Harness::start().await;
    let (client, _rx) = h.connect(5).await;
    h.wait_for_connections(5, 1).await;

    let (_, body) = h.get_json("/api/v1/presence").await;
    assert_eq!(body.get("user_ids"), Some(&json!([5])));

    assert!(client.logout().await.is_ok());
    h.wait_for_connections(5, 0).await;

    let (_, body) = h.get_json("/api/v1/users/5/presence").await;
    assert_eq!(body.get("online"), Some(&json!(false)));
    assert_eq!(body.get("connections"), Some(&json!(0)));
}

#[tokio::test]
async fn multi_user_dispatch_validates_recipients() {
    let h = Harness::start().await;
    let url = format!("http://{}/api/v1/notifications", h.addr);

    let Ok(empty) = h
        .http
        .post(&url)
        .json(&json!({ "user_ids": [], "payload": "x" }))
        .send()
        .await
    else {
        panic!("request failed");
    };
    assert_eq!(empty.status(), reqwest::StatusCode::BAD_REQUEST);

    let (client, mut rx) = h.connect(2).await;
    h.wait_for_connections(2, 1).await;
    let Ok(ok) = h
        .http
        .post(&url)
        .json(&json!({ "user_ids": [1, 2], "payload": {"room": 9} }))
        .send()
        .await
    else {
        panic!("request failed");
    };
    let Ok(results) = ok.json::<Vec<Value>>().await else {
        panic!("expected result list");
    };
    let attempted: Vec<usize> = results.iter().map(|r| count(r, "attempted")).collect();
    assert_eq!(attempted, vec![0, 1]);
    assert_eq!(next(&mut rx).await.map(|n| n.payload), Some(json!({"room": 9})));

    assert!(client.disconnect().await.is_ok());
}

#[tokio::test]
async fn health_reports_connection_totals() {
    let h = Harness::start().await;
    let (client, _rx) = h.connect(11).await;
    h.wait_for_connections(11, 1).await;

    let (status, body) = h.get_json("/health").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body.get("status"), Some(&json!("healthy")));
    assert_eq!(body.get("connections"), Some(&json!(1)));

    assert!(client.disconnect().await.is_ok());
}
