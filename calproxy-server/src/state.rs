//! Shared application state.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use calproxy_core::store::{KvStore, SqliteStore};

const DB_FILE: &str = "calproxy.db";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KvStore>,
    pub http: reqwest::Client,
}

impl AppState {
    pub async fn new() -> Result<Self> {
        let store = SqliteStore::open(Path::new(DB_FILE)).await?;
        Self::with_store(Arc::new(store))
    }

    /// Build state over any store backend; tests use the in-memory one.
    pub fn with_store(store: Arc<dyn KvStore>) -> Result<Self> {
        Ok(AppState {
            store,
            http: crate::fetch::client()?,
        })
    }
}
