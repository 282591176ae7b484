//! Content listing parameters.

use serde::{Deserialize, Serialize};

use super::labels::{encode_all, LabelEncoding, LabelFilter};
use super::QueryParams;
use crate::error::QueryResult;

/// Filters for listing content in a graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentListQuery {
    /// Graph the content belongs to
    pub extraction_graph: String,

    /// Only content produced by this policy (or `"ingestion"`)
    pub source: Option<String>,

    /// Only direct children of this node
    pub parent_id: Option<String>,

    /// Only content derived from this ingested root
    pub ingested_content_id: Option<String>,

    /// Label-equality constraints, all of which must hold
    #[serde(default)]
    pub labels: Vec<LabelFilter>,

    /// Opaque pagination cursor returned by a previous listing
    pub start_id: Option<String>,

    /// Page size
    pub limit: Option<u64>,

    /// Ask the service for the total count
    #[serde(default)]
    pub return_total: bool,
}

impl ContentListQuery {
    /// List everything in a graph.
    pub fn for_graph(graph: impl Into<String>) -> Self {
        Self {
            extraction_graph: graph.into(),
            ..Default::default()
        }
    }

    /// Restrict to content produced by a policy.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Restrict to children of a node.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Restrict to descendants of an ingested root.
    pub fn with_ingested_content(mut self, content_id: impl Into<String>) -> Self {
        self.ingested_content_id = Some(content_id.into());
        self
    }

    /// Add a label-equality constraint.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push(LabelFilter::eq(key, value));
        self
    }

    /// Continue from a cursor returned by a previous page.
    pub fn starting_at(mut self, start_id: impl Into<String>) -> Self {
        self.start_id = Some(start_id.into());
        self
    }

    /// Set the page size.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Request the total count.
    pub fn with_total(mut self) -> Self {
        self.return_total = true;
        self
    }

    /// Encode as request query parameters.
    pub fn to_params(&self, namespace: &str, encoding: LabelEncoding) -> QueryResult<QueryParams> {
        let mut params = QueryParams::new();
        params.push("namespace", namespace);
        params.push("extraction_graph", &self.extraction_graph);
        params.push_opt("source", self.source.as_deref());
        params.push_opt("parent_id", self.parent_id.as_deref());
        params.push_opt("ingested_content_id", self.ingested_content_id.as_deref());
        for label in encode_all(&self.labels, encoding)? {
            params.push("labels_eq", label);
        }
        params.push_opt("start_id", self.start_id.as_deref());
        params.push_opt("limit", self.limit);
        params.push("return_total", self.return_total);
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;

    #[test]
    fn test_minimal_params() {
        let params = ContentListQuery::for_graph("kb")
            .to_params("default", LabelEncoding::Strict)
            .unwrap();

        assert_eq!(
            params.pairs(),
            &[
                ("namespace".to_string(), "default".to_string()),
                ("extraction_graph".to_string(), "kb".to_string()),
                ("return_total".to_string(), "false".to_string()),
            ]
        );
    }

    #[test]
    fn test_full_params() {
        let params = ContentListQuery::for_graph("kb")
            .with_source("c1")
            .with_parent("root-1")
            .with_label("lang", "en")
            .with_label("kind", "pdf")
            .starting_at("cursor-9")
            .with_limit(25)
            .with_total()
            .to_params("ns", LabelEncoding::Strict)
            .unwrap();

        assert_eq!(params.get("source"), Some("c1"));
        assert_eq!(params.get("parent_id"), Some("root-1"));
        assert_eq!(params.get_all("labels_eq"), vec!["lang:en", "kind:pdf"]);
        assert_eq!(params.get("start_id"), Some("cursor-9"));
        assert_eq!(params.get("limit"), Some("25"));
        assert_eq!(params.get("return_total"), Some("true"));
        assert_eq!(params.get("ingested_content_id"), None);
    }

    #[test]
    fn test_ambiguous_label_detected() {
        let strict = ContentListQuery::for_graph("kb")
            .with_label("key", "value:with:colon")
            .to_params("ns", LabelEncoding::Strict);
        assert!(matches!(strict, Err(QueryError::AmbiguousLabel { .. })));

        let escaped = ContentListQuery::for_graph("kb")
            .with_label("key", "value:with:colon")
            .to_params("ns", LabelEncoding::Escaped)
            .unwrap();
        assert_eq!(escaped.get("labels_eq"), Some("key:value%3Awith%3Acolon"));
    }
}
