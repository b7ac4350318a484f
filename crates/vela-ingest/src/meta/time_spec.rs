//! Time specifications: how a table's rows obtain their `_time_` value.

use serde::{Deserialize, Serialize};

/// Source of the time value for every ingested row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeType {
    /// A fixed value for the whole table.
    #[default]
    Static,
    /// Wall clock at resolution time.
    Current,
    /// Parsed out of a named source column.
    Column,
    /// Derived from a path macro resolved at work-unit creation.
    Macro,
    /// Injected by the source adapter (e.g. stream message timestamps).
    Provided,
}

/// Declarative time specification of a table.
///
/// Only the slots relevant for the chosen [`TimeType`] are meaningful:
/// `unix_time` for `Static` (and as the anchor for synthetic data),
/// `column` for `Column`, and `pattern` for `Macro` (macro name) or
/// `Column` (parse pattern; when empty the column is read as integer unix
/// seconds).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpec {
    #[serde(rename = "type", default)]
    pub kind: TimeType,

    #[serde(default)]
    pub unix_time: i64,

    #[serde(default)]
    pub column: String,

    #[serde(default)]
    pub pattern: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_with_defaults() {
        let spec: TimeSpec = serde_json::from_str(r#"{ "type": "column", "column": "date" }"#)
            .expect("deserialize");
        assert_eq!(spec.kind, TimeType::Column);
        assert_eq!(spec.column, "date");
        assert_eq!(spec.pattern, "");
        assert_eq!(spec.unix_time, 0);
    }

    #[test]
    fn default_is_static_zero() {
        let spec = TimeSpec::default();
        assert_eq!(spec.kind, TimeType::Static);
        assert_eq!(spec.unix_time, 0);
    }
}
