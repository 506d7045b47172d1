//! Event normalization: rewrite property values and order properties so the
//! emitted feed satisfies Google's expectations.

pub mod timezone;

use crate::event::{ParsedEvent, Property};
use self::timezone::normalize_tzid;

/// Canonical emission order for recognized property names. Unrecognized
/// properties (X- extensions included) follow in their original relative
/// order.
const CANONICAL_ORDER: &[&str] = &[
    "DTSTAMP",
    "DTSTART",
    "DTEND",
    "SUMMARY",
    "DESCRIPTION",
    "LOCATION",
    "STATUS",
    "ORGANIZER",
    "ATTENDEE",
    "RECURRENCE-ID",
    "RRULE",
    "EXDATE",
    "RDATE",
    "CREATED",
    "LAST-MODIFIED",
    "CATEGORIES",
    "PRIORITY",
    "TRANSP",
    "CLASS",
];

const WEEKDAYS: &[&str] = &["SU", "MO", "TU", "WE", "TH", "FR", "SA"];

/// The normalized body of one VEVENT: canonical lines (without
/// BEGIN/END/UID/SEQUENCE) plus the verbatim RECURRENCE-ID value if present.
#[derive(Debug, Clone)]
pub struct EventLines {
    pub lines: Vec<String>,
    pub recurrence_id: Option<String>,
}

#[derive(PartialEq)]
enum TimeForm {
    Date,
    Utc,
    Floating,
}

/// Classify a datetime value textually: date-only has no `T`, UTC ends in
/// `Z`, everything else floats.
fn classify(value: &str) -> TimeForm {
    if !value.contains('T') {
        TimeForm::Date
    } else if value.ends_with('Z') {
        TimeForm::Utc
    } else {
        TimeForm::Floating
    }
}

/// DTSTART/DTEND/RECURRENCE-ID: floating values are pinned to the property's
/// TZID (mapped to IANA) or the tenant default.
fn datetime_line(name: &str, prop: &Property, default_tz: &str) -> String {
    match classify(&prop.value) {
        TimeForm::Date => format!("{name};VALUE=DATE:{}", prop.value),
        TimeForm::Utc => format!("{name}:{}", prop.value),
        TimeForm::Floating => {
            let tz = prop.param("TZID").map(normalize_tzid).unwrap_or(default_tz);
            format!("{name};TZID={tz}:{}", prop.value)
        }
    }
}

/// DTSTAMP/CREATED/LAST-MODIFIED: same shape, but the default zone is UTC.
/// A floating stamp with no TZID is emitted in the `Z` form directly.
fn stamp_line(name: &str, prop: &Property) -> String {
    match classify(&prop.value) {
        TimeForm::Date => format!("{name};VALUE=DATE:{}", prop.value),
        TimeForm::Utc => format!("{name}:{}", prop.value),
        TimeForm::Floating => match prop.param("TZID") {
            Some(tzid) => format!("{name};TZID={}:{}", normalize_tzid(tzid), prop.value),
            None => format!("{name}:{}Z", prop.value),
        },
    }
}

/// EXDATE/RDATE: classify each comma-separated entry, sort the list, and
/// carry `VALUE=DATE` (all dates) or `TZID=` (any floating entry) on the
/// reassembled property.
fn date_list_line(name: &str, prop: &Property, default_tz: &str) -> String {
    let mut entries: Vec<&str> = prop
        .value
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect();
    let all_dates = !entries.is_empty() && entries.iter().all(|e| classify(e) == TimeForm::Date);
    let any_floating = entries.iter().any(|e| classify(e) == TimeForm::Floating);
    entries.sort_unstable();
    let joined = entries.join(",");

    if all_dates {
        format!("{name};VALUE=DATE:{joined}")
    } else if any_floating {
        let tz = prop.param("TZID").map(normalize_tzid).unwrap_or(default_tz);
        format!("{name};TZID={tz}:{joined}")
    } else {
        format!("{name}:{joined}")
    }
}

/// Rewrite `BYSETPOS=<n>` + a single two-letter `BYDAY=<wd>` into the
/// `BYDAY=<n><wd>` form Google understands. Anything else passes through.
fn rewrite_rrule(value: &str) -> String {
    let parts: Vec<&str> = value.split(';').collect();
    let bysetpos = parts.iter().find_map(|p| p.strip_prefix("BYSETPOS="));
    let byday = parts.iter().find_map(|p| p.strip_prefix("BYDAY="));

    let (Some(pos), Some(day)) = (bysetpos, byday) else {
        return value.to_string();
    };
    if !WEEKDAYS.contains(&day) || pos.parse::<i32>().is_err() {
        return value.to_string();
    }

    parts
        .iter()
        .filter(|p| !p.starts_with("BYSETPOS="))
        .map(|p| {
            if p.starts_with("BYDAY=") {
                format!("BYDAY={pos}{day}")
            } else {
                (*p).to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Catch-all reconstruction: `NAME(;PARAM=VALUE)*:VALUE` with parameters
/// sorted by name. TZID parameter values still go through the zone map.
fn generic_line(prop: &Property) -> String {
    let mut params = prop.params.clone();
    params.sort_by(|a, b| a.0.cmp(&b.0));

    let mut line = prop.name.clone();
    for (key, value) in &params {
        let value = if key == "TZID" {
            normalize_tzid(value)
        } else {
            value.as_str()
        };
        line.push(';');
        line.push_str(key);
        line.push('=');
        line.push_str(value);
    }
    line.push(':');
    line.push_str(&prop.value);
    line
}

fn rank(name: &str) -> usize {
    CANONICAL_ORDER
        .iter()
        .position(|n| *n == name)
        .unwrap_or(CANONICAL_ORDER.len())
}

/// Normalize one parsed event into canonical output lines. UID and SEQUENCE
/// are dropped here; the serializer emits the stable replacements itself.
pub fn normalize_event(event: &ParsedEvent, default_tz: &str) -> EventLines {
    let mut recurrence_id = None;
    let mut entries: Vec<(usize, String)> = Vec::new();

    for prop in &event.properties {
        let line = match prop.name.as_str() {
            "BEGIN" | "END" | "UID" | "SEQUENCE" => continue,
            "DTSTART" | "DTEND" | "RECURRENCE-ID" => datetime_line(&prop.name, prop, default_tz),
            "DTSTAMP" | "CREATED" | "LAST-MODIFIED" => stamp_line(&prop.name, prop),
            "EXDATE" | "RDATE" => date_list_line(&prop.name, prop, default_tz),
            "RRULE" => format!("RRULE:{}", rewrite_rrule(&prop.value)),
            _ => generic_line(prop),
        };
        if prop.name == "RECURRENCE-ID" {
            recurrence_id = Some(prop.value.clone());
        }
        entries.push((rank(&prop.name), line));
    }

    // Stable sort: same-name and unrecognized properties keep feed order.
    entries.sort_by_key(|(r, _)| *r);

    EventLines {
        lines: entries.into_iter().map(|(_, line)| line).collect(),
        recurrence_id,
    }
}
