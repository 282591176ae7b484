//! Content metadata and lineage trees.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// The service sends `""` for absent ids.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()))
}

/// Metadata for one ingested or derived content node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub id: String,

    /// Node this one was derived from; `None` for ingested roots
    #[serde(default, deserialize_with = "empty_as_none")]
    pub parent_id: Option<String>,

    /// Ingested node at the top of this node's lineage
    #[serde(default, alias = "ingested_content_id", deserialize_with = "empty_as_none")]
    pub root_content_id: Option<String>,

    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, alias = "content_type")]
    pub mime_type: String,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    /// Where the service stored the bytes
    #[serde(default)]
    pub storage_url: String,

    /// Creation time, seconds since the epoch
    #[serde(default)]
    pub created_at: i64,

    /// Policy that produced this node (`"ingestion"` for roots)
    #[serde(default, rename = "source")]
    pub source_policy: String,

    #[serde(default, alias = "size_bytes")]
    pub size: u64,

    #[serde(default)]
    pub hash: String,

    /// Graphs this node participates in
    #[serde(default, rename = "extraction_graph_names")]
    pub member_graphs: Vec<String>,

    /// Logically deleted; kept for lineage
    #[serde(default)]
    pub tombstoned: bool,

    /// Download locator, filled in by the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
}

impl ContentMetadata {
    /// Create a root node with only an id.
    pub fn root(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            root_content_id: None,
            namespace: String::new(),
            name: String::new(),
            mime_type: String::new(),
            labels: HashMap::new(),
            storage_url: String::new(),
            created_at: 0,
            source_policy: String::new(),
            size: 0,
            hash: String::new(),
            member_graphs: Vec::new(),
            tombstoned: false,
            content_url: None,
        }
    }

    /// Create a node derived from `parent` by `policy`.
    pub fn derived(
        id: impl Into<String>,
        parent: &ContentMetadata,
        policy: impl Into<String>,
    ) -> Self {
        let root = parent
            .root_content_id
            .clone()
            .unwrap_or_else(|| parent.id.clone());
        Self {
            parent_id: Some(parent.id.clone()),
            root_content_id: Some(root),
            source_policy: policy.into(),
            member_graphs: parent.member_graphs.clone(),
            namespace: parent.namespace.clone(),
            ..Self::root(id)
        }
    }

    /// Add graph membership.
    pub fn in_graph(mut self, graph: impl Into<String>) -> Self {
        self.member_graphs.push(graph.into());
        self
    }

    /// Set the producing policy.
    pub fn with_source(mut self, policy: impl Into<String>) -> Self {
        self.source_policy = policy.into();
        self
    }

    /// Set the storage locator.
    pub fn with_storage_url(mut self, url: impl Into<String>) -> Self {
        self.storage_url = url.into();
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn belongs_to(&self, graph: &str) -> bool {
        self.member_graphs.iter().any(|g| g == graph)
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.created_at, 0).single()
    }
}

/// A problem found while checking lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineageIssue {
    /// The id is not part of the tree
    UnknownNode { id: String },
    /// A parent link points outside the tree
    MissingParent { node: String, parent: String },
    /// Following parent links loops
    ParentCycle { node: String },
    /// The recorded root differs from the one reached by walking parents
    RootMismatch {
        node: String,
        recorded: String,
        walked: String,
    },
}

/// Parent/child index over a flat list of content nodes.
///
/// Node order is the order the nodes were supplied in; every listing keeps
/// that order.
#[derive(Debug, Clone, Default)]
pub struct ContentTree {
    nodes: Vec<ContentMetadata>,
    index: HashMap<String, usize>,
    children: HashMap<String, Vec<usize>>,
}

impl ContentTree {
    pub fn from_nodes(nodes: Vec<ContentMetadata>) -> Self {
        let mut index = HashMap::with_capacity(nodes.len());
        let mut children: HashMap<String, Vec<usize>> = HashMap::new();

        for (i, node) in nodes.iter().enumerate() {
            index.insert(node.id.clone(), i);
            if let Some(parent) = &node.parent_id {
                children.entry(parent.clone()).or_default().push(i);
            }
        }

        Self {
            nodes,
            index,
            children,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ContentMetadata> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[ContentMetadata] {
        &self.nodes
    }

    /// Nodes with no parent.
    pub fn roots(&self) -> impl Iterator<Item = &ContentMetadata> {
        self.nodes.iter().filter(|n| n.is_root())
    }

    /// Direct children of `id`.
    pub fn children(&self, id: &str) -> impl Iterator<Item = &ContentMetadata> {
        self.children
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.nodes[i])
    }

    /// Follow parent links from `id` to the node with no parent.
    pub fn root_of(&self, id: &str) -> Result<&ContentMetadata, LineageIssue> {
        let mut current = self.get(id).ok_or_else(|| LineageIssue::UnknownNode { id: id.to_string() })?;
        let mut visited = HashSet::new();

        while let Some(parent_id) = &current.parent_id {
            if !visited.insert(current.id.as_str()) {
                return Err(LineageIssue::ParentCycle { node: id.to_string() });
            }
            current = self.get(parent_id).ok_or_else(|| LineageIssue::MissingParent {
                node: current.id.clone(),
                parent: parent_id.clone(),
            })?;
        }

        Ok(current)
    }

    /// Every node below `id`, in tree order.
    pub fn descendants(&self, id: &str) -> Vec<&ContentMetadata> {
        let mut below = HashSet::new();
        let mut queue = VecDeque::from([id.to_string()]);

        while let Some(next) = queue.pop_front() {
            for child in self.children(&next) {
                if below.insert(child.id.as_str()) {
                    queue.push_back(child.id.clone());
                }
            }
        }

        self.nodes
            .iter()
            .filter(|n| below.contains(n.id.as_str()))
            .collect()
    }

    /// Check that every node walks to a root and agrees with its recorded root.
    pub fn verify_lineage(&self) -> Vec<LineageIssue> {
        let mut issues = Vec::new();

        for node in &self.nodes {
            match self.root_of(&node.id) {
                Ok(root) => {
                    if let Some(recorded) = &node.root_content_id {
                        if !node.is_root() && *recorded != root.id {
                            issues.push(LineageIssue::RootMismatch {
                                node: node.id.clone(),
                                recorded: recorded.clone(),
                                walked: root.id.clone(),
                            });
                        }
                    }
                }
                Err(issue) => issues.push(issue),
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lineage() -> Vec<ContentMetadata> {
        let root = ContentMetadata::root("doc").in_graph("kb").with_source("ingestion");
        let chunk_a = ContentMetadata::derived("chunk-a", &root, "c1");
        let chunk_b = ContentMetadata::derived("chunk-b", &root, "c1");
        let embed_a = ContentMetadata::derived("embed-a", &chunk_a, "c2");
        // Deliberately out of order
        vec![embed_a, chunk_b, root, chunk_a]
    }

    #[test]
    fn test_root_of_walks_parents() {
        let tree = ContentTree::from_nodes(lineage());
        assert_eq!(tree.root_of("embed-a").unwrap().id, "doc");
        assert_eq!(tree.root_of("doc").unwrap().id, "doc");
        assert_eq!(
            tree.root_of("nope"),
            Err(LineageIssue::UnknownNode { id: "nope".into() })
        );
    }

    #[test]
    fn test_descendants_keep_input_order() {
        let tree = ContentTree::from_nodes(lineage());
        let ids: Vec<_> = tree.descendants("doc").iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["embed-a", "chunk-b", "chunk-a"]);

        let ids: Vec<_> = tree.children("chunk-a").map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["embed-a"]);
    }

    #[test]
    fn test_verify_lineage_clean() {
        assert!(ContentTree::from_nodes(lineage()).verify_lineage().is_empty());
    }

    #[test]
    fn test_verify_lineage_reports_problems() {
        let mut nodes = lineage();
        nodes.retain(|n| n.id != "chunk-a");
        let mut wrong_root = ContentMetadata::derived("chunk-c", &ContentMetadata::root("doc"), "c1");
        wrong_root.root_content_id = Some("other".into());
        nodes.push(wrong_root);

        let issues = ContentTree::from_nodes(nodes).verify_lineage();
        assert!(issues.contains(&LineageIssue::MissingParent {
            node: "embed-a".into(),
            parent: "chunk-a".into(),
        }));
        assert!(issues.contains(&LineageIssue::RootMismatch {
            node: "chunk-c".into(),
            recorded: "other".into(),
            walked: "doc".into(),
        }));
    }

    #[test]
    fn test_parent_cycle_detected() {
        let mut a = ContentMetadata::root("a");
        let mut b = ContentMetadata::root("b");
        a.parent_id = Some("b".into());
        b.parent_id = Some("a".into());

        let tree = ContentTree::from_nodes(vec![a, b]);
        assert_eq!(tree.root_of("a"), Err(LineageIssue::ParentCycle { node: "a".into() }));
    }

    #[test]
    fn test_deserialize_wire_node() {
        let node: ContentMetadata = serde_json::from_value(serde_json::json!({
            "id": "c-1",
            "parent_id": "",
            "root_content_id": "",
            "namespace": "default",
            "name": "test.txt",
            "mime_type": "text/plain",
            "labels": {"source": "test"},
            "storage_url": "file:///tmp/c-1",
            "created_at": 1700000000,
            "source": "ingestion",
            "size": 14,
            "hash": "abc",
            "extraction_graph_names": ["kb"]
        }))
        .unwrap();

        assert!(node.is_root());
        assert_eq!(node.root_content_id, None);
        assert_eq!(node.source_policy, "ingestion");
        assert!(node.belongs_to("kb"));
        assert!(node.created_at_utc().is_some());
    }
}
