//! Shared constants.

/// Fallback IANA zone for tenants that never configured one.
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Domain suffix appended to every stable UID we mint.
pub const UID_DOMAIN: &str = "calproxy";

/// Content-hash sentinel written after a cancellation is synthesized, so a
/// reappearing event is seen as changed and re-increments its sequence.
pub const CANCELLED_SENTINEL: &str = "CANCELLED";
