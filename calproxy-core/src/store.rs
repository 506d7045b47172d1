//! Key-value state store: the trait the reconciler persists through, key
//! schema helpers, and the two backends (in-memory and sqlite).
//!
//! Every key for tenant `T` lives under the prefix `T:`, except the tenant
//! registration record itself (`tenant:T`). Cross-tenant interference is
//! impossible by construction.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{CalProxyError, CalProxyResult};
use crate::state::TenantConfig;

/// Maximum keys returned per `list` call.
pub const LIST_PAGE_SIZE: usize = 128;

/// One page of a prefix listing.
#[derive(Debug)]
pub struct KeyPage {
    pub keys: Vec<String>,
    /// Cursor to pass to the next `list` call; `None` when complete.
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> CalProxyResult<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> CalProxyResult<()>;
    async fn delete(&self, key: &str) -> CalProxyResult<()>;
    async fn list(&self, prefix: &str, cursor: Option<&str>) -> CalProxyResult<KeyPage>;
}

// =============================================================================
// Key schema
// =============================================================================

pub fn event_state_key(tenant: &str, event_key: &str) -> String {
    format!("{tenant}:event:{event_key}")
}

pub fn snapshot_keys_key(tenant: &str) -> String {
    format!("{tenant}:snapshot:keys")
}

pub fn snapshot_latest_key(tenant: &str) -> String {
    format!("{tenant}:snapshot:latest")
}

pub fn upstream_hash_key(tenant: &str) -> String {
    format!("{tenant}:snapshot:upstream_hash")
}

pub fn tenant_config_key(tenant: &str) -> String {
    format!("tenant:{tenant}")
}

/// Load a tenant's registration record.
pub async fn load_tenant_config(
    store: &dyn KvStore,
    tenant: &str,
) -> CalProxyResult<Option<TenantConfig>> {
    match store.get(&tenant_config_key(tenant)).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Persist a tenant's registration record.
pub async fn save_tenant_config(
    store: &dyn KvStore,
    tenant: &str,
    config: &TenantConfig,
) -> CalProxyResult<()> {
    store
        .put(&tenant_config_key(tenant), &serde_json::to_string(config)?)
        .await
}

/// Delete a tenant's registration record and every key under its prefix.
pub async fn teardown_tenant(store: &dyn KvStore, tenant: &str) -> CalProxyResult<()> {
    store.delete(&tenant_config_key(tenant)).await?;

    let prefix = format!("{tenant}:");
    let mut cursor: Option<String> = None;
    loop {
        let page = store.list(&prefix, cursor.as_deref()).await?;
        for key in &page.keys {
            store.delete(key).await?;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(()),
        }
    }
}

// =============================================================================
// In-memory backend
// =============================================================================

/// BTreeMap-backed store. The default backend for tests; also usable as an
/// ephemeral server store.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> CalProxyResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> CalProxyResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> CalProxyResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str, cursor: Option<&str>) -> CalProxyResult<KeyPage> {
        let entries = self.entries.read().await;
        let start = match cursor {
            Some(c) => Bound::Excluded(c.to_string()),
            None => Bound::Included(prefix.to_string()),
        };

        let mut keys = Vec::new();
        for key in entries.range((start, Bound::Unbounded)).map(|(k, _)| k) {
            if !key.starts_with(prefix) {
                break;
            }
            if keys.len() == LIST_PAGE_SIZE {
                return Ok(KeyPage {
                    next_cursor: keys.last().cloned(),
                    keys,
                });
            }
            keys.push(key.clone());
        }
        Ok(KeyPage {
            keys,
            next_cursor: None,
        })
    }
}

// =============================================================================
// Sqlite backend
// =============================================================================

fn store_err(err: tokio_rusqlite::Error) -> CalProxyError {
    CalProxyError::Store(err.to_string())
}

/// Single-table sqlite store for the server binary.
pub struct SqliteStore {
    db: tokio_rusqlite::Connection,
}

impl SqliteStore {
    pub async fn open(path: &Path) -> CalProxyResult<Self> {
        let db = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|err| CalProxyError::Store(err.to_string()))?;
        db.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            )?;
            Ok(())
        })
        .await
        .map_err(store_err)?;
        Ok(Self { db })
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> CalProxyResult<Option<String>> {
        let key = key.to_string();
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
                let mut rows = stmt.query([&key])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row.get::<_, String>(0)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(store_err)
    }

    async fn put(&self, key: &str, value: &str) -> CalProxyResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO kv (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    (&key, &value),
                )?;
                Ok(())
            })
            .await
            .map_err(store_err)
    }

    async fn delete(&self, key: &str) -> CalProxyResult<()> {
        let key = key.to_string();
        self.db
            .call(move |conn| {
                conn.execute("DELETE FROM kv WHERE key = ?1", [&key])?;
                Ok(())
            })
            .await
            .map_err(store_err)
    }

    async fn list(&self, prefix: &str, cursor: Option<&str>) -> CalProxyResult<KeyPage> {
        let prefix = prefix.to_string();
        let after = cursor.unwrap_or("").to_string();
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT key FROM kv
                     WHERE substr(key, 1, length(?1)) = ?1 AND key > ?2
                     ORDER BY key LIMIT ?3",
                )?;
                let mut rows = stmt.query((&prefix, &after, LIST_PAGE_SIZE as i64 + 1))?;
                let mut keys = Vec::new();
                while let Some(row) = rows.next()? {
                    keys.push(row.get::<_, String>(0)?);
                }
                let next_cursor = if keys.len() > LIST_PAGE_SIZE {
                    keys.truncate(LIST_PAGE_SIZE);
                    keys.last().cloned()
                } else {
                    None
                };
                Ok(KeyPage { keys, next_cursor })
            })
            .await
            .map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_get_put_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.put("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        store.put("a", "2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));

        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_list_paginates() {
        let store = MemoryStore::new();
        for i in 0..(LIST_PAGE_SIZE + 10) {
            store
                .put(&format!("t1:event:{i:04}"), "{}")
                .await
                .unwrap();
        }
        store.put("t2:event:0000", "{}").await.unwrap();

        let first = store.list("t1:", None).await.unwrap();
        assert_eq!(first.keys.len(), LIST_PAGE_SIZE);
        let cursor = first.next_cursor.expect("should have more pages");

        let second = store.list("t1:", Some(&cursor)).await.unwrap();
        assert_eq!(second.keys.len(), 10);
        assert!(second.next_cursor.is_none());
        assert!(second.keys.iter().all(|k| k.starts_with("t1:")));
    }

    #[tokio::test]
    async fn test_teardown_removes_only_that_tenant() {
        let store = MemoryStore::new();
        store.put(&tenant_config_key("a"), "{}").await.unwrap();
        store.put(&event_state_key("a", "k1"), "{}").await.unwrap();
        store.put(&snapshot_latest_key("a"), "ics").await.unwrap();
        store.put(&tenant_config_key("b"), "{}").await.unwrap();
        store.put(&event_state_key("b", "k1"), "{}").await.unwrap();

        teardown_tenant(&store, "a").await.unwrap();

        assert_eq!(store.get(&tenant_config_key("a")).await.unwrap(), None);
        assert!(store.list("a:", None).await.unwrap().keys.is_empty());
        // Tenant b untouched.
        assert!(store.get(&tenant_config_key("b")).await.unwrap().is_some());
        assert_eq!(store.list("b:", None).await.unwrap().keys.len(), 1);
    }
}
