//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use exintel_common::db::{Exchange, Feature, FeatureCategory, MarketType};
use exintel_server::config::ServiceConfig;
use exintel_server::db::{categories, exchanges, features};
use exintel_server::services::ai_client::{AiError, ChatModel, ChatRequest};
use exintel_server::services::screenshot_store::{ScreenshotStore, StoreError};
use exintel_server::AppState;
use serde_json::Value;
use sqlx::SqlitePool;

/// Fresh in-memory store with the full schema
pub async fn test_pool() -> SqlitePool {
    exintel_common::db::init_memory_database().await.unwrap()
}

pub async fn seed_exchange(pool: &SqlitePool, name: &str, market_type: MarketType) -> Exchange {
    let mut conn = pool.acquire().await.unwrap();
    exchanges::insert_exchange(&mut conn, &exchanges::NewExchange::named(name, market_type))
        .await
        .unwrap()
}

pub async fn seed_category(pool: &SqlitePool, name: &str) -> FeatureCategory {
    let mut conn = pool.acquire().await.unwrap();
    let (category, _) = categories::find_or_create_category(&mut conn, name, None, None)
        .await
        .unwrap();
    category
}

pub async fn seed_feature(pool: &SqlitePool, name: &str, category_id: &str) -> Feature {
    let mut conn = pool.acquire().await.unwrap();
    features::insert_feature(
        &mut conn,
        &features::NewFeature {
            name: name.to_string(),
            category_id: category_id.to_string(),
            sort_order: 0,
            description: None,
        },
    )
    .await
    .unwrap()
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Chat model replaying scripted answers in order
#[derive(Default)]
pub struct ScriptedModel {
    answers: Mutex<VecDeque<Result<String, AiError>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(answers: Vec<Result<String, AiError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(answers: &[&str]) -> Self {
        Self::new(answers.iter().map(|a| Ok(a.to_string())).collect())
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String, AiError> {
        self.requests.lock().unwrap().push(request.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AiError::EmptyResponse))
    }
}

/// Screenshot blobs held in memory
#[derive(Default)]
pub struct MemoryStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn with(mut self, key: &str, bytes: &[u8]) -> Self {
        self.blobs.insert(key.to_string(), bytes.to_vec());
        self
    }
}

#[async_trait]
impl ScreenshotStore for MemoryStore {
    async fn fetch(&self, storage_key: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .get(storage_key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(storage_key.to_string()))
    }
}

pub fn test_state(
    pool: SqlitePool,
    config: ServiceConfig,
    ai: Option<Arc<dyn ChatModel>>,
    store: MemoryStore,
) -> AppState {
    AppState::new(pool, config, ai, Arc::new(store))
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn read_body(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn read_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&read_body(response).await).unwrap()
}
