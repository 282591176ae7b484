//! Extraction graph model.
//!
//! An [`ExtractionGraph`] is an ordered list of [`ExtractionPolicy`] steps
//! registered under one name. Each policy's `content_source` names the
//! policy whose output it reads, so the policies form a DAG rooted at
//! ingestion.
//!
//! Everything here is a pure transformation. Graphs are parsed and checked
//! locally so that an invalid graph never reaches the network.
//!
//! ```rust,ignore
//! use indexify_client::ExtractionGraph;
//!
//! let graph = ExtractionGraph::from_spec(r#"
//! name: kb
//! extraction_policies:
//!   - extractor: tensorlake/chunk-extractor
//!     name: chunks
//!   - extractor: tensorlake/minilm-l6
//!     name: embeddings
//!     content_source: chunks
//! "#)?;
//! graph.validate()?;
//! ```

pub mod builder;
pub mod policy;

pub use builder::WireGraph;
pub use policy::{ExtractionPolicy, ParamValue, INGESTION_SOURCE};

use serde::{Deserialize, Serialize};

/// A named DAG of extraction policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionGraph {
    /// Server-assigned id, present only on fetched graphs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Graph name, unique within a namespace
    pub name: String,

    /// Owning namespace, present only on fetched graphs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Policies in declaration order
    #[serde(default, rename = "extraction_policies")]
    pub policies: Vec<ExtractionPolicy>,
}

impl ExtractionGraph {
    /// Create an empty graph.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            namespace: None,
            policies: Vec::new(),
        }
    }

    /// Append a policy.
    pub fn with_policy(mut self, policy: ExtractionPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Look up a policy by name.
    pub fn policy(&self, name: &str) -> Option<&ExtractionPolicy> {
        self.policies.iter().find(|p| p.name == name)
    }

    /// Policies reading ingested content directly.
    pub fn roots(&self) -> impl Iterator<Item = &ExtractionPolicy> {
        self.policies.iter().filter(|p| p.upstream().is_none())
    }

    /// Policies reading the output of `name`.
    pub fn downstream_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ExtractionPolicy> {
        self.policies
            .iter()
            .filter(move |p| p.upstream() == Some(name))
    }

    /// Policy names in declaration order.
    pub fn policy_names(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.name.as_str()).collect()
    }

    /// Index name of a policy's output (`graph.policy`).
    pub fn index_name(&self, policy: &str) -> String {
        format!("{}.{}", self.name, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kb_graph() -> ExtractionGraph {
        ExtractionGraph::new("kb")
            .with_policy(ExtractionPolicy::new("chunker", "c1"))
            .with_policy(ExtractionPolicy::new("embedder", "c2").with_content_source("c1"))
            .with_policy(ExtractionPolicy::new("summarizer", "c3").with_content_source("c1"))
    }

    #[test]
    fn test_roots_and_downstream() {
        let graph = kb_graph();

        let roots: Vec<_> = graph.roots().map(|p| p.name.as_str()).collect();
        assert_eq!(roots, vec!["c1"]);

        let downstream: Vec<_> = graph.downstream_of("c1").map(|p| p.name.as_str()).collect();
        assert_eq!(downstream, vec!["c2", "c3"]);
    }

    #[test]
    fn test_index_name() {
        assert_eq!(kb_graph().index_name("c2"), "kb.c2");
    }

    #[test]
    fn test_deserialize_fetched_graph() {
        let json = serde_json::json!({
            "id": "g-1",
            "name": "kb",
            "namespace": "default",
            "extraction_policies": [
                {"id": "p-1", "extractor": "chunker", "name": "c1", "graph_name": "kb"},
                {"id": "p-2", "extractor": "embedder", "name": "c2", "content_source": "c1", "graph_name": "kb"}
            ]
        });

        let graph: ExtractionGraph = serde_json::from_value(json).unwrap();
        assert_eq!(graph.id.as_deref(), Some("g-1"));
        assert_eq!(graph.policy("c2").and_then(|p| p.id.as_deref()), Some("p-2"));
    }
}
