//! Event types shared across the parsing, normalization, and reconciliation
//! stages.

/// A single ICS content line, split into name, parameters, and value.
///
/// Names and parameter keys are uppercased at parse time; parameter values
/// are kept verbatim (including any quoting upstream wrote).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub params: Vec<(String, String)>,
    pub value: String,
}

impl Property {
    /// Look up a parameter by (uppercased) key.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A VEVENT as it appeared upstream: its properties in feed order plus the
/// verbatim upstream UID.
#[derive(Debug, Clone, Default)]
pub struct ParsedEvent {
    pub properties: Vec<Property>,
    /// UID exactly as upstream wrote it (feeds empty string when absent).
    pub uid: String,
    /// Raw unfolded lines of the block, kept for diagnostics only.
    pub raw_lines: Vec<String>,
}

impl ParsedEvent {
    /// First property with the given (uppercased) name.
    pub fn prop(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Value of the first property with the given name.
    pub fn prop_value(&self, name: &str) -> Option<&str> {
        self.prop(name).map(|p| p.value.as_str())
    }
}

/// An event ready for serialization: stable identity, assigned sequence, and
/// the canonical VEVENT body lines (everything except BEGIN/END/UID/SEQUENCE,
/// which the serializer emits itself).
#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    pub stable_uid: String,
    pub sequence: u64,
    pub is_exception: bool,
    /// Verbatim upstream RECURRENCE-ID value, when this is an override.
    pub recurrence_id: Option<String>,
    pub lines: Vec<String>,
}
