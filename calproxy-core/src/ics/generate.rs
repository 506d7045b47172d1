//! Output feed assembly: VTIMEZONE injection and rewriting, event ordering,
//! and RFC 5545 line folding.

use crate::calendar::ParsedCalendar;
use crate::constants::UID_DOMAIN;
use crate::event::NormalizedEvent;
use crate::normalize::timezone::{normalize_tzid, vtimezone_block};

/// Append a line with CRLF, folding at 75 characters: the first 75 stand,
/// each following 74-character chunk continues on its own line behind a
/// single space.
pub fn write_folded(out: &mut String, line: &str) {
    let chars: Vec<char> = line.chars().collect();
    if chars.len() <= 75 {
        out.push_str(line);
        out.push_str("\r\n");
        return;
    }

    let mut pos = 0;
    let mut width = 75;
    while pos < chars.len() {
        if pos > 0 {
            out.push(' ');
        }
        let end = (pos + width).min(chars.len());
        out.extend(&chars[pos..end]);
        out.push_str("\r\n");
        pos = end;
        width = 74;
    }
}

/// Serialize the output feed: header, VTIMEZONE blocks (default injected if
/// missing, upstream TZIDs mapped), events with recurring masters ahead of
/// their overrides, footer.
pub fn serialize_calendar(
    calendar: &ParsedCalendar,
    events: &[NormalizedEvent],
    default_tz: &str,
) -> String {
    let mut out = String::new();

    for line in &calendar.header {
        write_folded(&mut out, line);
    }

    let rewritten: Vec<Vec<String>> = calendar
        .timezones
        .iter()
        .map(|block| {
            block
                .iter()
                .map(|line| match line.strip_prefix("TZID:") {
                    Some(tzid) => format!("TZID:{}", normalize_tzid(tzid)),
                    None => line.clone(),
                })
                .collect()
        })
        .collect();

    let default_marker = format!("TZID:{default_tz}");
    if !rewritten.iter().any(|b| b.contains(&default_marker)) {
        for line in vtimezone_block(default_tz) {
            write_folded(&mut out, &line);
        }
    }
    for block in &rewritten {
        for line in block {
            write_folded(&mut out, line);
        }
    }

    // Masters before overrides so the consumer sees the recurring series
    // before any RECURRENCE-ID referencing it.
    let mut masters: Vec<&NormalizedEvent> = events.iter().filter(|e| !e.is_exception).collect();
    masters.sort_by(|a, b| a.stable_uid.cmp(&b.stable_uid));
    let mut overrides: Vec<&NormalizedEvent> = events.iter().filter(|e| e.is_exception).collect();
    overrides.sort_by(|a, b| {
        (a.stable_uid.as_str(), a.recurrence_id.as_deref())
            .cmp(&(b.stable_uid.as_str(), b.recurrence_id.as_deref()))
    });

    for event in masters.into_iter().chain(overrides) {
        write_folded(&mut out, "BEGIN:VEVENT");
        write_folded(&mut out, &format!("UID:{}@{UID_DOMAIN}", event.stable_uid));
        write_folded(&mut out, &format!("SEQUENCE:{}", event.sequence));
        for line in &event.lines {
            write_folded(&mut out, line);
        }
        write_folded(&mut out, "END:VEVENT");
    }

    for line in &calendar.footer {
        write_folded(&mut out, line);
    }

    out
}
