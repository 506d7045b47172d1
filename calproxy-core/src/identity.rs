//! Stable identity and content fingerprinting for events.
//!
//! Exchange regenerates UIDs on edits the organizer never made, so upstream
//! UIDs cannot anchor identity. Instead, identity derives from the attribute
//! set that survives those regenerations: DTSTART, SUMMARY, ORGANIZER, and
//! the upstream UID itself. An event whose SUMMARY changes is a new event.

use sha2::{Digest, Sha256};

use crate::event::ParsedEvent;

/// Properties excluded from the content fingerprint; they churn on every
/// upstream publish without the event actually changing.
const VOLATILE: &[&str] = &["DTSTAMP", "LAST-MODIFIED", "SEQUENCE"];

/// First 16 bytes of SHA-256 over `DTSTART|SUMMARY|ORGANIZER|UID` (original
/// upstream values, empty string for absent properties), as lowercase hex.
pub fn stable_uid(event: &ParsedEvent) -> String {
    let dtstart = event.prop_value("DTSTART").unwrap_or("");
    let summary = event.prop_value("SUMMARY").unwrap_or("");
    let organizer = event.prop_value("ORGANIZER").unwrap_or("");

    let mut hasher = Sha256::new();
    hasher.update(dtstart.as_bytes());
    hasher.update(b"|");
    hasher.update(summary.as_bytes());
    hasher.update(b"|");
    hasher.update(organizer.as_bytes());
    hasher.update(b"|");
    hasher.update(event.uid.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// SHA-256 over the non-volatile properties serialized as `NAME:VALUE`
/// (parameters excluded), sorted, joined with `\n`. Full hex digest.
pub fn content_hash(event: &ParsedEvent) -> String {
    let mut lines: Vec<String> = event
        .properties
        .iter()
        .filter(|p| !VOLATILE.contains(&p.name.as_str()))
        .map(|p| format!("{}:{}", p.name, p.value))
        .collect();
    lines.sort();

    let mut hasher = Sha256::new();
    hasher.update(lines.join("\n").as_bytes());
    hex::encode(hasher.finalize())
}

/// State-store key for an event: the stable UID, suffixed with the verbatim
/// RECURRENCE-ID value for overrides. The key is textual, not semantic.
pub fn event_key(stable_uid: &str, recurrence_id: Option<&str>) -> String {
    match recurrence_id {
        Some(rid) => format!("{stable_uid}#{rid}"),
        None => stable_uid.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Property;

    fn prop(name: &str, value: &str) -> Property {
        Property {
            name: name.to_string(),
            params: vec![],
            value: value.to_string(),
        }
    }

    fn event_of(props: Vec<Property>, uid: &str) -> ParsedEvent {
        ParsedEvent {
            properties: props,
            uid: uid.to_string(),
            raw_lines: vec![],
        }
    }

    #[test]
    fn test_stable_uid_matches_derivation_formula() {
        let event = event_of(
            vec![
                prop("DTSTART", "20240601T090000"),
                prop("SUMMARY", "M"),
                prop("ORGANIZER", "O"),
            ],
            "X",
        );

        let mut hasher = Sha256::new();
        hasher.update(b"20240601T090000|M|O|X");
        let expected = hex::encode(&hasher.finalize()[..16]);

        let uid = stable_uid(&event);
        assert_eq!(uid, expected);
        assert_eq!(uid.len(), 32);
    }

    #[test]
    fn test_stable_uid_ignores_property_order_and_volatiles() {
        let a = event_of(
            vec![
                prop("SUMMARY", "Standup"),
                prop("DTSTART", "20240601T090000Z"),
                prop("DTSTAMP", "20240101T000000Z"),
            ],
            "X",
        );
        let b = event_of(
            vec![
                prop("DTSTART", "20240601T090000Z"),
                prop("DTSTAMP", "20991231T235959Z"),
                prop("LOCATION", "Room 4"),
                prop("SUMMARY", "Standup"),
            ],
            "X",
        );
        assert_eq!(stable_uid(&a), stable_uid(&b));
    }

    #[test]
    fn test_stable_uid_absent_organizer_is_empty_string() {
        let with_empty = event_of(
            vec![
                prop("DTSTART", "20240601"),
                prop("SUMMARY", "S"),
                prop("ORGANIZER", ""),
            ],
            "X",
        );
        let without = event_of(vec![prop("DTSTART", "20240601"), prop("SUMMARY", "S")], "X");
        assert_eq!(stable_uid(&with_empty), stable_uid(&without));
    }

    #[test]
    fn test_content_hash_ignores_volatile_properties() {
        let a = event_of(
            vec![
                prop("SUMMARY", "Standup"),
                prop("DTSTAMP", "20240101T000000Z"),
                prop("SEQUENCE", "3"),
            ],
            "X",
        );
        let b = event_of(
            vec![
                prop("SUMMARY", "Standup"),
                prop("DTSTAMP", "20250101T000000Z"),
                prop("LAST-MODIFIED", "20250101T000000Z"),
                prop("SEQUENCE", "9"),
            ],
            "X",
        );
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a).len(), 64);
    }

    #[test]
    fn test_content_hash_detects_real_changes() {
        let a = event_of(vec![prop("SUMMARY", "Standup")], "X");
        let b = event_of(vec![prop("SUMMARY", "Retro")], "X");
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_event_key_with_and_without_recurrence_id() {
        assert_eq!(event_key("abcd", None), "abcd");
        assert_eq!(
            event_key("abcd", Some("20240601T090000")),
            "abcd#20240601T090000"
        );
    }
}
