#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::Uri;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use wantlist_tracker::config::{Config, FirstSeenPolicy};

/// Serve a router on an ephemeral local port, returning its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn test_config(discogs_base: &str, telegram_base: &str, storage: &Path) -> Config {
    Config {
        discogs_token: "tok".into(),
        discogs_username: "collector".into(),
        telegram_token: "tg".into(),
        telegram_chat_id: "1".into(),
        port: 0,
        check_interval_secs: 900,
        first_seen_policy: FirstSeenPolicy::Learn,
        storage_path: storage.to_path_buf(),
        discogs_base_url: discogs_base.into(),
        telegram_base_url: telegram_base.into(),
        // generous budget so the limiter never delays tests
        requests_per_minute: 10_000,
        user_agent: "wantlist-tracker-tests".into(),
    }
}

// ---------------------------------------------------------------------------
// Mock Telegram: records every sendMessage call
// ---------------------------------------------------------------------------

pub struct MockTelegram {
    pub base_url: String,
    messages: Arc<Mutex<Vec<Value>>>,
}

impl MockTelegram {
    pub async fn spawn() -> Self {
        let messages: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .fallback(record_message)
            .with_state(messages.clone());
        let base_url = spawn(router).await;
        Self { base_url, messages }
    }

    /// Text of every message delivered so far, in order.
    pub fn texts(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m["body"]["text"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn paths(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m["path"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

async fn record_message(
    State(messages): State<Arc<Mutex<Vec<Value>>>>,
    uri: Uri,
    Json(body): Json<Value>,
) -> Json<Value> {
    messages
        .lock()
        .unwrap()
        .push(json!({"path": uri.path(), "body": body}));
    Json(json!({"ok": true}))
}

// ---------------------------------------------------------------------------
// Mock Discogs: a one-release wantlist over a mutable marketplace
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct Market {
    pub num_for_sale: u32,
    pub lowest: Option<f64>,
    /// (listing id, price)
    pub listings: Vec<(u64, f64)>,
}

pub type SharedMarket = Arc<Mutex<Market>>;

pub fn market(num_for_sale: u32, lowest: Option<f64>, listings: Vec<(u64, f64)>) -> SharedMarket {
    Arc::new(Mutex::new(Market {
        num_for_sale,
        lowest,
        listings,
    }))
}

pub fn discogs_router(market: SharedMarket, release_id: u64) -> Router {
    Router::new()
        .route("/users/{user}/wants", get(single_release_wants))
        .route("/marketplace/stats/{id}", get(market_stats))
        .route("/marketplace/listings", get(market_listings))
        .with_state((market, release_id))
}

async fn single_release_wants(
    State((_, release_id)): State<(SharedMarket, u64)>,
) -> Json<Value> {
    Json(json!({
        "pagination": {"page": 1, "pages": 1},
        "wants": [{
            "basic_information": {
                "id": release_id,
                "title": format!("Release {release_id}"),
                "artists": [{"name": "Test Artist"}],
                "master_id": 0
            }
        }]
    }))
}

async fn market_stats(State((market, _)): State<(SharedMarket, u64)>) -> Json<Value> {
    let m = market.lock().unwrap();
    Json(json!({
        "num_for_sale": m.num_for_sale,
        "lowest_price": m.lowest.map(|value| json!({"value": value, "currency": "EUR"})),
    }))
}

async fn market_listings(State((market, _)): State<(SharedMarket, u64)>) -> Json<Value> {
    let m = market.lock().unwrap();
    let listings: Vec<Value> = m
        .listings
        .iter()
        .map(|(id, price)| {
            json!({
                "id": id,
                "price": {"value": price, "currency": "EUR"},
                "seller": {"username": "seller"},
                "condition": "Very Good Plus (VG+)",
                "uri": format!("https://www.discogs.com/sell/item/{id}")
            })
        })
        .collect();
    Json(json!({"listings": listings}))
}
