//! The end-to-end feed pipeline: one pure-ish function from upstream text,
//! tenant, and default zone to normalized output plus its ETag.
//!
//! The last-known-good snapshot is only ever overwritten after a fully
//! successful normalization. Invalid upstream bytes fail without touching it;
//! an empty upstream falls back to it when present.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::CalProxyResult;
use crate::ics::{parse_calendar, serialize_calendar};
use crate::reconcile::reconcile;
use crate::store::{self, KvStore};

/// The result of processing one upstream response.
#[derive(Debug)]
pub struct FeedOutput {
    pub body: String,
    /// Hex SHA-256 of the body; the HTTP layer serves it as the ETag.
    pub etag: String,
    /// True when the body came from the stored snapshot rather than a fresh
    /// normalization (unchanged upstream bytes, or empty-feed fallback).
    pub from_snapshot: bool,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn snapshot_output(body: String) -> FeedOutput {
    FeedOutput {
        etag: sha256_hex(body.as_bytes()),
        body,
        from_snapshot: true,
    }
}

async fn stored_snapshot(store: &dyn KvStore, tenant: &str) -> Option<String> {
    match store.get(&store::snapshot_latest_key(tenant)).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(%tenant, error = %err, "snapshot read failed");
            None
        }
    }
}

/// Process one upstream feed for a tenant.
///
/// Returns [`crate::CalProxyError::UpstreamInvalid`] when the bytes are not
/// a VCALENDAR at all; every state-store failure is absorbed locally.
pub async fn process_feed(
    store: &dyn KvStore,
    tenant: &str,
    default_tz: &str,
    upstream: &str,
) -> CalProxyResult<FeedOutput> {
    let upstream_hash = sha256_hex(upstream.as_bytes());

    // Unchanged upstream bytes: serve the stored output without reparsing.
    if let Ok(Some(stored_hash)) = store.get(&store::upstream_hash_key(tenant)).await {
        if stored_hash == upstream_hash {
            if let Some(snapshot) = stored_snapshot(store, tenant).await {
                debug!(%tenant, "upstream unchanged, serving stored snapshot");
                return Ok(snapshot_output(snapshot));
            }
        }
    }

    let calendar = parse_calendar(upstream)?;

    if !calendar.saw_vevent {
        if let Some(snapshot) = stored_snapshot(store, tenant).await {
            warn!(%tenant, "upstream feed has no events, serving last known good");
            return Ok(snapshot_output(snapshot));
        }
        // No last-known-good exists: proceed with the empty parse, which
        // cancels whatever the previous snapshot still holds.
    }

    let events = reconcile(store, tenant, default_tz, &calendar, Utc::now()).await;
    let body = serialize_calendar(&calendar, &events, default_tz);
    let etag = sha256_hex(body.as_bytes());

    // Record the last-known-good only now that normalization succeeded.
    if let Err(err) = store.put(&store::snapshot_latest_key(tenant), &body).await {
        warn!(%tenant, error = %err, "snapshot write failed, dropping");
    }
    if let Err(err) = store
        .put(&store::upstream_hash_key(tenant), &upstream_hash)
        .await
    {
        warn!(%tenant, error = %err, "upstream hash write failed, dropping");
    }

    Ok(FeedOutput {
        body,
        etag,
        from_snapshot: false,
    })
}
