//! ICS wire format handling: parsing upstream bytes and emitting output lines.

pub mod generate;
pub mod parse;

pub use generate::{serialize_calendar, write_folded};
pub use parse::{parse_calendar, parse_content_line, unfold};
