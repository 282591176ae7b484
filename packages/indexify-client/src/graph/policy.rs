//! Extraction policy types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::QueryResult;
use crate::query::labels::{LabelEncoding, LabelFilter};

/// Sentinel content source naming the ingestion root of a graph.
pub const INGESTION_SOURCE: &str = "ingestion";

/// Scalar value accepted as an extractor input parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// A named, parameterized transformation step inside an extraction graph.
///
/// `content_source` is the DAG edge: `None` (or [`INGESTION_SOURCE`]) reads
/// ingested content, anything else names a sibling policy whose output this
/// policy consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionPolicy {
    /// Server-assigned id, present only on fetched graphs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Policy name, unique within its graph
    pub name: String,

    /// Extractor reference (e.g. `tensorlake/minilm-l6`)
    pub extractor: String,

    /// Parameters forwarded to the extractor, in declaration order
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub input_params: IndexMap<String, ParamValue>,

    /// Upstream policy name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_source: Option<String>,

    /// Label-equality expression restricting which content the policy runs on
    #[serde(
        default,
        rename = "filters_eq",
        alias = "labels_eq",
        skip_serializing_if = "Option::is_none"
    )]
    pub label_filter: Option<String>,
}

impl ExtractionPolicy {
    /// Create a policy reading from ingestion.
    pub fn new(extractor: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            extractor: extractor.into(),
            input_params: IndexMap::new(),
            content_source: None,
            label_filter: None,
        }
    }

    /// Read from the output of another policy.
    pub fn with_content_source(mut self, source: impl Into<String>) -> Self {
        self.content_source = Some(source.into());
        self
    }

    /// Add an extractor input parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.input_params.insert(key.into(), value.into());
        self
    }

    /// Restrict the policy to content whose labels match all filters.
    pub fn with_label_filters(
        mut self,
        filters: &[LabelFilter],
        encoding: LabelEncoding,
    ) -> QueryResult<Self> {
        let encoded = filters
            .iter()
            .map(|f| f.encode(encoding))
            .collect::<QueryResult<Vec<_>>>()?;
        self.label_filter = (!encoded.is_empty()).then(|| encoded.join(","));
        Ok(self)
    }

    /// Upstream policy name, or `None` when the policy reads ingested content.
    pub fn upstream(&self) -> Option<&str> {
        self.content_source
            .as_deref()
            .filter(|s| !s.is_empty() && *s != INGESTION_SOURCE)
    }
}
