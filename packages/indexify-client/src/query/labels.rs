//! Label-equality filters.
//!
//! The service takes label filters as `"<key>:<value>"` strings, and policy
//! filter expressions join several of them with `,`. A key or value holding
//! either character would be split in the wrong place, so encoding either
//! rejects such input ([`LabelEncoding::Strict`]) or percent-escapes it
//! ([`LabelEncoding::Escaped`]).

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// Separator between a label key and its value.
pub const LABEL_SEPARATOR: char = ':';

/// Separator between filters in a policy expression.
pub const EXPRESSION_SEPARATOR: char = ',';

/// How reserved characters in label filters are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelEncoding {
    /// Refuse keys or values holding `:` or `,`
    #[default]
    Strict,
    /// Percent-escape `%`, `:` and `,`
    Escaped,
}

/// A single `key == value` label constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFilter {
    pub key: String,
    pub value: String,
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            ',' => out.push_str("%2C"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(raw: &str) -> String {
    raw.replace("%3A", ":").replace("%2C", ",").replace("%25", "%")
}

fn is_reserved(c: char) -> bool {
    c == LABEL_SEPARATOR || c == EXPRESSION_SEPARATOR
}

impl LabelFilter {
    /// Create an equality filter.
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether the key or value contains a reserved character.
    pub fn is_ambiguous(&self) -> bool {
        self.key.contains(is_reserved) || self.value.contains(is_reserved)
    }

    /// Encode as `"key:value"`.
    pub fn encode(&self, encoding: LabelEncoding) -> QueryResult<String> {
        if self.key.is_empty() {
            return Err(QueryError::EmptyLabelKey);
        }

        match encoding {
            LabelEncoding::Strict if self.is_ambiguous() => Err(QueryError::AmbiguousLabel {
                key: self.key.clone(),
                value: self.value.clone(),
            }),
            LabelEncoding::Strict => Ok(format!("{}{LABEL_SEPARATOR}{}", self.key, self.value)),
            LabelEncoding::Escaped => Ok(format!(
                "{}{LABEL_SEPARATOR}{}",
                escape(&self.key),
                escape(&self.value)
            )),
        }
    }

    /// Parse an encoded filter, splitting on the first separator.
    pub fn decode(encoded: &str, encoding: LabelEncoding) -> QueryResult<Self> {
        let (key, value) = encoded
            .split_once(LABEL_SEPARATOR)
            .unwrap_or((encoded, ""));
        if key.is_empty() {
            return Err(QueryError::EmptyLabelKey);
        }

        Ok(match encoding {
            LabelEncoding::Strict => Self::eq(key, value),
            LabelEncoding::Escaped => Self::eq(unescape(key), unescape(value)),
        })
    }
}

/// Encode a set of filters, preserving order.
pub fn encode_all(filters: &[LabelFilter], encoding: LabelEncoding) -> QueryResult<Vec<String>> {
    filters.iter().map(|f| f.encode(encoding)).collect()
}
