//! Filtering derived content and resolving download locators.

use super::metadata::ContentMetadata;

/// Which derived nodes to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescendantFilter {
    pub graph_name: String,
    pub policy_name: String,
    /// Only nodes recorded under this ingested root
    pub root_id: Option<String>,
}

impl DescendantFilter {
    pub fn new(graph_name: impl Into<String>, policy_name: impl Into<String>) -> Self {
        Self {
            graph_name: graph_name.into(),
            policy_name: policy_name.into(),
            root_id: None,
        }
    }

    pub fn under_root(mut self, root_id: impl Into<String>) -> Self {
        self.root_id = Some(root_id.into());
        self
    }

    /// With a root set, a node lacking a recorded root only passes if it is
    /// that root itself.
    pub fn matches(&self, node: &ContentMetadata) -> bool {
        if !node.belongs_to(&self.graph_name) || node.source_policy != self.policy_name {
            return false;
        }
        match (&self.root_id, &node.root_content_id) {
            (None, _) => true,
            (Some(wanted), Some(recorded)) => wanted == recorded,
            (Some(wanted), None) => node.id == *wanted,
        }
    }
}

/// Keep nodes that belong to the graph and were produced by the policy.
///
/// Order is preserved. An empty result is a valid answer, not an error.
pub fn filter_descendants(nodes: &[ContentMetadata], filter: &DescendantFilter) -> Vec<ContentMetadata> {
    nodes
        .iter()
        .filter(|n| filter.matches(n))
        .cloned()
        .collect()
}

/// Whether a storage reference can be fetched directly.
pub fn is_remote_locator(storage_url: &str) -> bool {
    url::Url::parse(storage_url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// The locator a caller should use to download a node.
///
/// Remote `http(s)` storage references pass through; anything else is
/// served by the service's download endpoint.
pub fn resolve_url(node: &ContentMetadata, service_url: &str, namespace: &str) -> String {
    if is_remote_locator(&node.storage_url) {
        return node.storage_url.clone();
    }
    format!(
        "{}/namespaces/{}/content/{}/download",
        service_url.trim_end_matches('/'),
        namespace,
        node.id
    )
}
