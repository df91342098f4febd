use std::borrow::Cow;
use std::fmt;

/// A value interpolated into a generated query.
///
/// Rendering through [`fmt::Display`] is the only way values reach query text, so every
/// string is escaped.
#[derive(Debug, Clone, PartialEq)]
pub enum CypherValue<'a> {
    Null,
    Integer(i64),
    /// Non-finite floats render as `null`
    Float(f64),
    Boolean(bool),
    String(Cow<'a, str>),
}

/// Escape backslashes and single quotes for a single-quoted string literal.
pub fn escape_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

impl fmt::Display for CypherValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) if value.is_finite() => write!(f, "{value}"),
            Self::Float(_) => write!(f, "null"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "'{}'", escape_string(value)),
        }
    }
}

impl<'a> From<&'a str> for CypherValue<'a> {
    fn from(value: &'a str) -> Self {
        Self::String(Cow::Borrowed(value))
    }
}

impl From<String> for CypherValue<'_> {
    fn from(value: String) -> Self {
        Self::String(Cow::Owned(value))
    }
}

impl From<i64> for CypherValue<'_> {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for CypherValue<'_> {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for CypherValue<'_> {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl<'a, T: Into<CypherValue<'a>>> From<Option<T>> for CypherValue<'a> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Render `{ key: value, ... }`, keeping the order of `properties`.
pub fn map_literal(properties: &[(&str, CypherValue<'_>)]) -> String {
    let entries = properties
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{ {entries} }}")
}
