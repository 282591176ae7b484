//! Request and response types exchanged with the Indexify service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::content::ContentMetadata;
use crate::graph::{ExtractionGraph, WireGraph};

// =============================================================================
// Namespaces and extractors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    #[serde(default)]
    pub extraction_graphs: Vec<ExtractionGraph>,
}

/// Body of `POST namespaces`.
#[derive(Debug, Serialize)]
pub(crate) struct CreateNamespace<'a> {
    pub name: &'a str,
    pub extraction_graphs: Vec<WireGraph<'a>>,
    pub labels: &'a HashMap<String, String>,
}

/// Shape of an embedding output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSchema {
    pub dim: u32,
    pub distance: String,
}

/// One named output of an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractorOutput {
    Embedding(EmbeddingSchema),
    Metadata(serde_json::Value),
}

impl ExtractorOutput {
    pub fn embedding(&self) -> Option<&EmbeddingSchema> {
        match self {
            ExtractorOutput::Embedding(schema) => Some(schema),
            ExtractorOutput::Metadata(_) => None,
        }
    }
}

/// An extractor registered with the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extractor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_mime_types: Vec<String>,
    /// JSON schema of accepted parameters
    #[serde(default)]
    pub input_params: serde_json::Value,
    #[serde(default)]
    pub outputs: HashMap<String, ExtractorOutput>,
}

impl Extractor {
    /// Whether the extractor accepts `mime_type` (`*/*` accepts anything).
    pub fn accepts(&self, mime_type: &str) -> bool {
        self.input_mime_types
            .iter()
            .any(|m| m == mime_type || m == "*/*")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    #[serde(default)]
    pub schema: serde_json::Value,
}

/// Structured-data schema of a content source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub columns: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub content_source: String,
    #[serde(default)]
    pub namespace: String,
}

/// Structured metadata an extractor attached to content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub id: String,
    pub content_id: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub extractor_name: String,
}

// =============================================================================
// Graphs
// =============================================================================

/// Response of graph creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddGraphResponse {
    /// Indexes created for the graph's policies
    #[serde(default)]
    pub indexes: Vec<String>,
}

/// Body of `POST extraction_graphs/{name}/links`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct GraphLink<'a> {
    pub content_source: &'a str,
    pub linked_graph_name: &'a str,
}

/// Task counts for one policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    #[serde(default)]
    pub pending: u64,
    #[serde(default)]
    pub success: u64,
    #[serde(default)]
    pub failure: u64,
}

impl TaskCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.success + self.failure
    }
}

/// Per-policy task statistics for a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphAnalytics {
    #[serde(default)]
    pub task_analytics: HashMap<String, TaskCounts>,
}

/// A versioned copy of the namespace's graphs.
///
/// Snapshots are replaced whole on refresh and never edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSnapshot {
    /// Bumped on every refresh; 0 means never fetched
    pub version: u64,
    pub fetched_at: Option<DateTime<Utc>>,
    pub graphs: Arc<Vec<ExtractionGraph>>,
}

impl GraphSnapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            fetched_at: None,
            graphs: Arc::new(Vec::new()),
        }
    }

    pub fn graph(&self, name: &str) -> Option<&ExtractionGraph> {
        self.graphs.iter().find(|g| g.name == name)
    }

    pub fn is_fetched(&self) -> bool {
        self.version > 0
    }
}

impl Default for GraphSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// Content
// =============================================================================

/// One page of a content listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentPage {
    #[serde(default, alias = "content_list")]
    pub content: Vec<ContentMetadata>,
    /// Only present when the total was requested
    #[serde(default)]
    pub total: Option<u64>,
}

impl ContentPage {
    /// Cursor for the following page.
    pub fn next_start_id(&self) -> Option<&str> {
        self.content.last().map(|c| c.id.as_str())
    }
}

/// Body of `POST ingest_remote_file`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub url: String,
    pub mime_type: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub extraction_graph_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ContentIdResponse {
    #[serde(default)]
    pub content_id: Option<String>,
}

// =============================================================================
// Search and SQL
// =============================================================================

/// One hit of an index search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub content_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub content_metadata: Option<ContentMetadata>,
    #[serde(default)]
    pub root_content_metadata: Option<ContentMetadata>,
}

// =============================================================================
// Direct extraction
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    Embedding,
    Metadata,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A feature produced by an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub feature_type: FeatureType,
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Inline content passed to or returned by an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub content_type: String,
    #[serde(default)]
    pub bytes: Vec<u8>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Content {
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes: bytes.into(),
            features: Vec::new(),
            labels: HashMap::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(crate::content::TEXT_MIME_TYPE, text.into().into_bytes())
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Run one extractor on inline content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractRequest {
    /// Extractor name
    pub name: String,
    pub content: Content,
    #[serde(default)]
    pub input_params: HashMap<String, serde_json::Value>,
}

impl ExtractRequest {
    pub fn new(name: impl Into<String>, content: Content) -> Self {
        Self {
            name: name.into(),
            content,
            input_params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.input_params.insert(key.into(), value.into());
        self
    }
}

/// Wire body of a direct extraction; parameters travel as a JSON string.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ExtractBody<'a> {
    pub name: &'a str,
    pub content: &'a Content,
    pub input_params: String,
}

impl<'a> ExtractBody<'a> {
    pub fn new(request: &'a ExtractRequest) -> serde_json::Result<Self> {
        Ok(Self {
            name: &request.name,
            content: &request.content,
            input_params: serde_json::to_string(&request.input_params)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractResponse {
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub content: Vec<Content>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_outputs() {
        let extractor: Extractor = serde_json::from_value(serde_json::json!({
            "name": "tensorlake/minilm-l6",
            "description": "MiniLM embeddings",
            "input_mime_types": ["text/plain"],
            "input_params": {"type": "object"},
            "outputs": {
                "embedding": {"dim": 384, "distance": "cosine"},
                "metadata": {"type": "object", "properties": {}}
            }
        }))
        .unwrap();

        assert_eq!(
            extractor.outputs["embedding"].embedding(),
            Some(&EmbeddingSchema {
                dim: 384,
                distance: "cosine".into()
            })
        );
        assert!(extractor.outputs["metadata"].embedding().is_none());
        assert!(extractor.accepts("text/plain"));
        assert!(!extractor.accepts("application/pdf"));
    }

    #[test]
    fn test_content_page_accepts_listing_shape() {
        let page: ContentPage = serde_json::from_value(serde_json::json!({
            "content_list": [{"id": "a"}, {"id": "b"}],
            "total": 2
        }))
        .unwrap();

        assert_eq!(page.content.len(), 2);
        assert_eq!(page.total, Some(2));
        assert_eq!(page.next_start_id(), Some("b"));
    }

    #[test]
    fn test_extract_body_stringifies_params() {
        let request = ExtractRequest::new("tensorlake/chunk-extractor", Content::text("hello"))
            .with_param("chunk_size", 100);
        let body = serde_json::to_value(ExtractBody::new(&request).unwrap()).unwrap();

        assert_eq!(body["input_params"], r#"{"chunk_size":100}"#);
        assert_eq!(body["content"]["content_type"], "text/plain");
    }

    #[test]
    fn test_unknown_feature_type() {
        let feature: Feature =
            serde_json::from_value(serde_json::json!({"feature_type": "sparse", "name": "f"})).unwrap();
        assert_eq!(feature.feature_type, FeatureType::Unknown);
    }

    #[test]
    fn test_snapshot_lookup() {
        let snapshot = GraphSnapshot {
            version: 1,
            fetched_at: Some(Utc::now()),
            graphs: Arc::new(vec![ExtractionGraph::new("kb")]),
        };
        assert!(snapshot.graph("kb").is_some());
        assert!(snapshot.graph("other").is_none());
        assert!(!GraphSnapshot::empty().is_fetched());
    }
}
