//! Reconciliation: assign sequence numbers from per-event state, synthesize
//! cancellations for events that disappeared upstream, and record the new
//! snapshot.
//!
//! Store failures are never fatal here. A failed read is treated as "no prior
//! state"; a failed write is logged and dropped. The worst case is a sequence
//! regression on the next run, which the consumer tolerates because the
//! content hash still detects change.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::calendar::ParsedCalendar;
use crate::constants::CANCELLED_SENTINEL;
use crate::event::NormalizedEvent;
use crate::identity;
use crate::normalize::normalize_event;
use crate::state::{EventState, SnapshotKeys};
use crate::store::{self, KvStore};

async fn load_state(store: &dyn KvStore, tenant: &str, key: &str) -> Option<EventState> {
    let store_key = store::event_state_key(tenant, key);
    match store.get(&store_key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(%store_key, error = %err, "discarding unreadable event state");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            warn!(%store_key, error = %err, "state read failed, treating as absent");
            None
        }
    }
}

async fn write_state(store: &dyn KvStore, tenant: &str, key: &str, state: &EventState) {
    let store_key = store::event_state_key(tenant, key);
    let raw = match serde_json::to_string(state) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(%store_key, error = %err, "could not encode event state");
            return;
        }
    };
    if let Err(err) = store.put(&store_key, &raw).await {
        warn!(%store_key, error = %err, "state write failed, dropping");
    }
}

async fn load_snapshot_keys(store: &dyn KvStore, tenant: &str) -> Vec<String> {
    match store.get(&store::snapshot_keys_key(tenant)).await {
        Ok(Some(raw)) => serde_json::from_str::<SnapshotKeys>(&raw)
            .map(|snapshot| snapshot.event_keys)
            .unwrap_or_default(),
        Ok(None) => Vec::new(),
        Err(err) => {
            warn!(%tenant, error = %err, "snapshot read failed, treating as empty");
            Vec::new()
        }
    }
}

async fn write_snapshot_keys(store: &dyn KvStore, tenant: &str, keys: Vec<String>, now_ms: i64) {
    let snapshot = SnapshotKeys {
        event_keys: keys,
        generated_at: now_ms,
    };
    let raw = match serde_json::to_string(&snapshot) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(%tenant, error = %err, "could not encode snapshot");
            return;
        }
    };
    if let Err(err) = store.put(&store::snapshot_keys_key(tenant), &raw).await {
        warn!(%tenant, error = %err, "snapshot write failed, dropping");
    }
}

/// Build the cancellation VEVENT body for a key that vanished upstream.
fn cancellation_lines(recurrence_id: Option<&str>, dtstamp: &str) -> Vec<String> {
    let mut lines = vec![format!("DTSTAMP:{dtstamp}")];
    match recurrence_id {
        Some(rid) => lines.push(format!("DTSTART:{rid}")),
        None => lines.push(format!("DTSTART:{dtstamp}")),
    }
    lines.push("SUMMARY:Cancelled Event".to_string());
    lines.push("STATUS:CANCELLED".to_string());
    if let Some(rid) = recurrence_id {
        lines.push(format!("RECURRENCE-ID:{rid}"));
    }
    lines
}

/// Reconcile the parsed feed against stored state.
///
/// Per-event state reads and writes are issued sequentially in feed order so
/// sequence derivation is deterministic within a run; the snapshot write is
/// ordered after all per-event writes.
pub async fn reconcile(
    store: &dyn KvStore,
    tenant: &str,
    default_tz: &str,
    calendar: &ParsedCalendar,
    now: DateTime<Utc>,
) -> Vec<NormalizedEvent> {
    let now_ms = now.timestamp_millis();
    let mut events = Vec::with_capacity(calendar.events.len());
    let mut current_keys: Vec<String> = Vec::with_capacity(calendar.events.len());

    for parsed in &calendar.events {
        let stable_uid = identity::stable_uid(parsed);
        let normalized = normalize_event(parsed, default_tz);
        let key = identity::event_key(&stable_uid, normalized.recurrence_id.as_deref());
        let hash = identity::content_hash(parsed);

        let sequence = match load_state(store, tenant, &key).await {
            None => 0,
            Some(prior) if prior.content_hash == hash => prior.sequence,
            Some(prior) => prior.sequence + 1,
        };
        write_state(
            store,
            tenant,
            &key,
            &EventState {
                sequence,
                content_hash: hash,
                last_seen: now_ms,
            },
        )
        .await;

        current_keys.push(key);
        events.push(NormalizedEvent {
            stable_uid,
            sequence,
            is_exception: normalized.recurrence_id.is_some(),
            recurrence_id: normalized.recurrence_id,
            lines: normalized.lines,
        });
    }

    // Keys in the previous snapshot that the current parse no longer carries
    // become cancellations, exactly one each.
    let current: HashSet<&str> = current_keys.iter().map(String::as_str).collect();
    let dtstamp = now.format("%Y%m%dT%H%M%SZ").to_string();
    for key in load_snapshot_keys(store, tenant).await {
        if current.contains(key.as_str()) {
            continue;
        }
        let Some(prior) = load_state(store, tenant, &key).await else {
            continue;
        };
        let sequence = prior.sequence + 1;
        let (stable_uid, recurrence_id) = match key.split_once('#') {
            Some((uid, rid)) => (uid.to_string(), Some(rid.to_string())),
            None => (key.clone(), None),
        };

        write_state(
            store,
            tenant,
            &key,
            &EventState {
                sequence,
                content_hash: CANCELLED_SENTINEL.to_string(),
                last_seen: now_ms,
            },
        )
        .await;

        events.push(NormalizedEvent {
            stable_uid,
            sequence,
            is_exception: recurrence_id.is_some(),
            lines: cancellation_lines(recurrence_id.as_deref(), &dtstamp),
            recurrence_id,
        });
    }

    // The new snapshot holds exactly the keys seen in this parse; a
    // cancellation that later reverses re-enters from the parsed side.
    write_snapshot_keys(store, tenant, current_keys, now_ms).await;

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ics::parse_calendar;
    use crate::store::MemoryStore;

    fn feed(body: &str) -> String {
        format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n{body}END:VCALENDAR\r\n")
    }

    fn simple_event(uid: &str, summary: &str, dtstamp: &str) -> String {
        format!(
            "BEGIN:VEVENT\r\nUID:{uid}\r\nSUMMARY:{summary}\r\nDTSTART:20240601T090000Z\r\nDTSTAMP:{dtstamp}\r\nEND:VEVENT\r\n"
        )
    }

    fn now() -> DateTime<Utc> {
        "2024-06-15T12:00:00Z".parse().unwrap()
    }

    async fn run(store: &MemoryStore, body: &str) -> Vec<NormalizedEvent> {
        let calendar = parse_calendar(body).expect("should parse");
        reconcile(store, "t1", "America/New_York", &calendar, now()).await
    }

    #[tokio::test]
    async fn test_first_observation_gets_sequence_zero() {
        let store = MemoryStore::new();
        let events = run(&store, &feed(&simple_event("X", "M", "20240601T000000Z"))).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence, 0);

        let snapshot: SnapshotKeys = serde_json::from_str(
            &store
                .get(&store::snapshot_keys_key("t1"))
                .await
                .unwrap()
                .expect("snapshot should be written"),
        )
        .unwrap();
        assert_eq!(snapshot.event_keys.len(), 1);
    }

    #[tokio::test]
    async fn test_identical_feed_twice_keeps_sequence() {
        let store = MemoryStore::new();
        let body = feed(&simple_event("X", "M", "20240601T000000Z"));
        let first = run(&store, &body).await;
        let second = run(&store, &body).await;
        assert_eq!(first[0].sequence, 0);
        assert_eq!(second[0].sequence, 0);
        assert_eq!(first[0].lines, second[0].lines);
    }

    #[tokio::test]
    async fn test_volatile_change_keeps_sequence() {
        let store = MemoryStore::new();
        run(&store, &feed(&simple_event("X", "M", "20240601T000000Z"))).await;
        let events = run(&store, &feed(&simple_event("X", "M", "20240602T000000Z"))).await;
        assert_eq!(events[0].sequence, 0);
    }

    #[tokio::test]
    async fn test_content_change_increments_sequence() {
        let store = MemoryStore::new();
        let with_location = |loc: &str| {
            feed(&format!(
                "BEGIN:VEVENT\r\nUID:X\r\nSUMMARY:M\r\nDTSTART:20240601T090000Z\r\nLOCATION:{loc}\r\nEND:VEVENT\r\n"
            ))
        };
        run(&store, &with_location("Room 1")).await;
        let second = run(&store, &with_location("Room 2")).await;
        assert_eq!(second[0].sequence, 1);
        let third = run(&store, &with_location("Room 3")).await;
        assert_eq!(third[0].sequence, 2);
    }

    #[tokio::test]
    async fn test_summary_change_is_new_event_plus_cancellation() {
        let store = MemoryStore::new();
        let first = run(&store, &feed(&simple_event("X", "M", "20240601T000000Z"))).await;
        let old_uid = first[0].stable_uid.clone();

        let events = run(&store, &feed(&simple_event("X", "M2", "20240601T000000Z"))).await;
        assert_eq!(events.len(), 2);

        let fresh = events.iter().find(|e| e.stable_uid != old_uid).unwrap();
        assert_eq!(fresh.sequence, 0);

        let cancelled = events.iter().find(|e| e.stable_uid == old_uid).unwrap();
        assert_eq!(cancelled.sequence, 1);
        assert!(cancelled
            .lines
            .contains(&"STATUS:CANCELLED".to_string()));
        assert!(cancelled
            .lines
            .contains(&"SUMMARY:Cancelled Event".to_string()));
        assert!(cancelled.lines.contains(&"DTSTAMP:20240615T120000Z".to_string()));
    }

    #[tokio::test]
    async fn test_disappeared_override_cancels_with_recurrence_id() {
        let store = MemoryStore::new();
        let override_event = "BEGIN:VEVENT\r\nUID:X\r\nSUMMARY:M\r\nDTSTART:20240608T090000Z\r\nRECURRENCE-ID:20240608T090000Z\r\nEND:VEVENT\r\n";
        let first = run(&store, &feed(override_event)).await;
        assert!(first[0].is_exception);

        let events = run(&store, &feed("")).await;
        assert_eq!(events.len(), 1);
        let cancelled = &events[0];
        assert!(cancelled.is_exception);
        assert_eq!(cancelled.recurrence_id.as_deref(), Some("20240608T090000Z"));
        assert!(cancelled
            .lines
            .contains(&"RECURRENCE-ID:20240608T090000Z".to_string()));
        assert!(cancelled
            .lines
            .contains(&"DTSTART:20240608T090000Z".to_string()));
    }

    #[tokio::test]
    async fn test_cancellation_happens_once_then_key_leaves_snapshot() {
        let store = MemoryStore::new();
        run(&store, &feed(&simple_event("X", "M", "20240601T000000Z"))).await;

        let first_empty = run(&store, &feed("")).await;
        assert_eq!(first_empty.len(), 1);

        // The cancelled key is not in the new snapshot, so a second empty run
        // emits nothing.
        let second_empty = run(&store, &feed("")).await;
        assert!(second_empty.is_empty());
    }

    #[tokio::test]
    async fn test_reappearance_after_cancellation_increments() {
        let store = MemoryStore::new();
        let body = feed(&simple_event("X", "M", "20240601T000000Z"));
        run(&store, &body).await;
        run(&store, &feed("")).await; // cancelled, sequence 1, sentinel hash

        let events = run(&store, &body).await;
        // Content hash differs from the sentinel, so the sequence advances.
        assert_eq!(events[0].sequence, 2);
    }
}
