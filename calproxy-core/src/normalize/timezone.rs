//! Windows-to-IANA timezone identifier mapping and VTIMEZONE emission.
//!
//! Exchange publishes Windows zone names (`Eastern Standard Time`); Google
//! only understands Olson identifiers (`America/New_York`). The map below
//! covers the zones Exchange tenants actually produce; anything unknown
//! passes through unchanged.

/// Windows display name → IANA identifier.
pub const WINDOWS_TO_IANA: &[(&str, &str)] = &[
    ("Eastern Standard Time", "America/New_York"),
    ("US Eastern Standard Time", "America/Indiana/Indianapolis"),
    ("Central Standard Time", "America/Chicago"),
    ("Mountain Standard Time", "America/Denver"),
    ("US Mountain Standard Time", "America/Phoenix"),
    ("Pacific Standard Time", "America/Los_Angeles"),
    ("Alaskan Standard Time", "America/Anchorage"),
    ("Hawaiian Standard Time", "Pacific/Honolulu"),
    ("Atlantic Standard Time", "America/Halifax"),
    ("Newfoundland Standard Time", "America/St_Johns"),
    ("Canada Central Standard Time", "America/Regina"),
    ("Central America Standard Time", "America/Guatemala"),
    ("SA Pacific Standard Time", "America/Bogota"),
    ("Eastern Standard Time (Mexico)", "America/Cancun"),
    ("Central Standard Time (Mexico)", "America/Mexico_City"),
    ("Pacific Standard Time (Mexico)", "America/Tijuana"),
    ("UTC", "Etc/UTC"),
    ("Coordinated Universal Time", "Etc/UTC"),
    ("GMT Standard Time", "Europe/London"),
    ("Greenwich Standard Time", "Atlantic/Reykjavik"),
    ("W. Europe Standard Time", "Europe/Berlin"),
    ("Central Europe Standard Time", "Europe/Budapest"),
    ("Central European Standard Time", "Europe/Warsaw"),
    ("Romance Standard Time", "Europe/Paris"),
    ("GTB Standard Time", "Europe/Bucharest"),
    ("E. Europe Standard Time", "Europe/Chisinau"),
    ("FLE Standard Time", "Europe/Kiev"),
    ("Russian Standard Time", "Europe/Moscow"),
    ("South Africa Standard Time", "Africa/Johannesburg"),
    ("Israel Standard Time", "Asia/Jerusalem"),
    ("Arabian Standard Time", "Asia/Dubai"),
    ("India Standard Time", "Asia/Kolkata"),
    ("China Standard Time", "Asia/Shanghai"),
    ("Singapore Standard Time", "Asia/Singapore"),
    ("Tokyo Standard Time", "Asia/Tokyo"),
    ("Korea Standard Time", "Asia/Seoul"),
    ("AUS Eastern Standard Time", "Australia/Sydney"),
    ("New Zealand Standard Time", "Pacific/Auckland"),
];

/// Map a Windows zone name to its IANA identifier. Identifiers that are not
/// in the table (including names that are already IANA) pass through.
pub fn normalize_tzid(tzid: &str) -> &str {
    WINDOWS_TO_IANA
        .iter()
        .find(|(windows, _)| *windows == tzid)
        .map(|(_, iana)| *iana)
        .unwrap_or(tzid)
}

/// A VTIMEZONE with the post-2007 US DST rules (second Sunday of March /
/// first Sunday of November).
fn us_dst_block(tzid: &str, std_name: &str, dst_name: &str, std: &str, dst: &str) -> Vec<String> {
    vec![
        "BEGIN:VTIMEZONE".into(),
        format!("TZID:{tzid}"),
        "BEGIN:STANDARD".into(),
        "DTSTART:19701101T020000".into(),
        "RRULE:FREQ=YEARLY;BYMONTH=11;BYDAY=1SU".into(),
        format!("TZOFFSETFROM:{dst}"),
        format!("TZOFFSETTO:{std}"),
        format!("TZNAME:{std_name}"),
        "END:STANDARD".into(),
        "BEGIN:DAYLIGHT".into(),
        "DTSTART:19700308T020000".into(),
        "RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=2SU".into(),
        format!("TZOFFSETFROM:{std}"),
        format!("TZOFFSETTO:{dst}"),
        format!("TZNAME:{dst_name}"),
        "END:DAYLIGHT".into(),
        "END:VTIMEZONE".into(),
    ]
}

/// Build the VTIMEZONE block injected for a tenant's default zone. The common
/// North-American zones get real STANDARD/DAYLIGHT rules; everything else
/// gets a minimal fixed-offset placeholder, which is enough for Google to
/// resolve the TZID references in the feed.
pub fn vtimezone_block(tzid: &str) -> Vec<String> {
    match tzid {
        "America/New_York" => us_dst_block(tzid, "EST", "EDT", "-0500", "-0400"),
        "America/Indiana/Indianapolis" => us_dst_block(tzid, "EST", "EDT", "-0500", "-0400"),
        "America/Chicago" => us_dst_block(tzid, "CST", "CDT", "-0600", "-0500"),
        "America/Denver" => us_dst_block(tzid, "MST", "MDT", "-0700", "-0600"),
        "America/Los_Angeles" => us_dst_block(tzid, "PST", "PDT", "-0800", "-0700"),
        _ => vec![
            "BEGIN:VTIMEZONE".into(),
            format!("TZID:{tzid}"),
            "BEGIN:STANDARD".into(),
            "DTSTART:19700101T000000".into(),
            "TZOFFSETFROM:+0000".into(),
            "TZOFFSETTO:+0000".into(),
            "END:STANDARD".into(),
            "END:VTIMEZONE".into(),
        ],
    }
}
