//! Core types and algorithms for the calproxy ecosystem.
//!
//! calproxy sits between an Outlook/Exchange published calendar and Google
//! Calendar's URL subscription feature. Exchange feeds break several of
//! Google's assumptions (Windows timezone names, BYSETPOS recurrence rules,
//! unstable UIDs across edits, silently vanishing events), so this crate
//! re-serves the feed in a shape Google accepts:
//!
//! - `ics` parses and re-emits the wire format (unfolding, content lines,
//!   block extraction, folding)
//! - `normalize` rewrites property values and fixes property order
//! - `identity` derives stable UIDs and content fingerprints
//! - `reconcile` tracks per-event state and synthesizes cancellations for
//!   events that disappear upstream
//! - `proxy` ties it all together into one feed-processing pipeline
//! - `store` is the key-value state backend the reconciler persists into

pub mod calendar;
pub mod constants;
pub mod error;
pub mod event;
pub mod ics;
pub mod identity;
pub mod normalize;
pub mod proxy;
pub mod reconcile;
pub mod state;
pub mod store;

pub use calendar::ParsedCalendar;
pub use error::{CalProxyError, CalProxyResult};
pub use event::{NormalizedEvent, ParsedEvent, Property};
pub use proxy::{process_feed, FeedOutput};
