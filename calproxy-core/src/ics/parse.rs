//! Upstream ICS parsing: line unfolding, content-line splitting, and block
//! extraction.
//!
//! The parser is deliberately permissive. Malformed individual lines are
//! skipped, unknown property names pass through untouched, and the only fatal
//! condition is an input with no `BEGIN:VCALENDAR` at all.

use crate::calendar::ParsedCalendar;
use crate::error::{CalProxyError, CalProxyResult};
use crate::event::{ParsedEvent, Property};

/// Split input on CRLF or LF and undo RFC 5545 line folding: a line starting
/// with a single space or tab continues the previous line, minus that leading
/// byte. A continuation with no previous line is discarded.
pub fn unfold(input: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in input.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if raw.is_empty() {
            continue;
        }
        if let Some(rest) = raw.strip_prefix(' ').or_else(|| raw.strip_prefix('\t')) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
            }
            continue;
        }
        lines.push(raw.to_string());
    }
    lines
}

/// Index of the first `needle` byte outside double quotes.
fn find_unquoted(s: &str, needle: u8) -> Option<usize> {
    let mut in_quotes = false;
    for (i, b) in s.bytes().enumerate() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == needle && !in_quotes {
            return Some(i);
        }
    }
    None
}

/// Split on `sep` bytes outside double quotes.
fn split_unquoted(s: &str, sep: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, b) in s.bytes().enumerate() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == sep && !in_quotes {
            parts.push(&s[start..i]);
            start = i + 1;
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Parse one unfolded content line into a property. Returns `None` for lines
/// with no colon or no name; such lines carry no property but may still act
/// as block delimiters upstream of this function.
pub fn parse_content_line(line: &str) -> Option<Property> {
    let colon = find_unquoted(line, b':')?;
    let head = &line[..colon];
    let value = &line[colon + 1..];

    let mut segments = split_unquoted(head, b';').into_iter();
    let name = segments.next()?.trim().to_ascii_uppercase();
    if name.is_empty() {
        return None;
    }

    let mut params = Vec::new();
    for segment in segments {
        if let Some((key, val)) = segment.split_once('=') {
            params.push((key.trim().to_ascii_uppercase(), val.to_string()));
        }
    }

    Some(Property {
        name,
        params,
        value: value.to_string(),
    })
}

enum Section {
    Header,
    Timezone,
    Event,
}

/// Parse an upstream feed into header, VTIMEZONE blocks, events, and footer.
///
/// An input with no `BEGIN:VCALENDAR` anywhere is upstream-invalid. A feed
/// with no `BEGIN:VEVENT` parses fine and is flagged via `saw_vevent`.
pub fn parse_calendar(input: &str) -> CalProxyResult<ParsedCalendar> {
    if !input.contains("BEGIN:VCALENDAR") {
        return Err(CalProxyError::UpstreamInvalid(
            "missing BEGIN:VCALENDAR".into(),
        ));
    }

    let mut calendar = ParsedCalendar::default();
    let mut section = Section::Header;
    let mut header_done = false;
    let mut current_block: Vec<String> = Vec::new();
    let mut current_event = ParsedEvent::default();

    for line in unfold(input) {
        match section {
            Section::Header => {
                if line == "BEGIN:VTIMEZONE" {
                    current_block = vec![line];
                    section = Section::Timezone;
                } else if line == "BEGIN:VEVENT" {
                    current_event = ParsedEvent::default();
                    current_event.raw_lines.push(line);
                    header_done = true;
                    calendar.saw_vevent = true;
                    section = Section::Event;
                } else if line.starts_with("END:V") {
                    // END:VCALENDAR and strays; the footer is synthesized below.
                } else if !header_done {
                    calendar.header.push(line);
                }
            }
            Section::Timezone => {
                if line == "END:VTIMEZONE" {
                    current_block.push(line);
                    calendar.timezones.push(std::mem::take(&mut current_block));
                    section = Section::Header;
                } else {
                    current_block.push(line);
                }
            }
            Section::Event => {
                if line == "END:VEVENT" {
                    current_event.raw_lines.push(line);
                    calendar.events.push(std::mem::take(&mut current_event));
                    section = Section::Header;
                } else {
                    current_event.raw_lines.push(line.clone());
                    if let Some(property) = parse_content_line(&line) {
                        if property.name == "UID" {
                            current_event.uid = property.value.clone();
                        }
                        current_event.properties.push(property);
                    }
                }
            }
        }
    }

    calendar.footer = vec!["END:VCALENDAR".to_string()];
    Ok(calendar)
}
