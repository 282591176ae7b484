//! Parsing, validation and wire encoding for extraction graphs.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::policy::{ExtractionPolicy, ParamValue};
use super::ExtractionGraph;
use crate::error::{GraphError, GraphResult};

#[derive(Deserialize)]
struct RawGraph {
    id: Option<String>,
    name: Option<String>,
    namespace: Option<String>,
    #[serde(default)]
    extraction_policies: Option<Vec<RawPolicy>>,
}

#[derive(Deserialize)]
struct RawPolicy {
    id: Option<String>,
    name: Option<String>,
    extractor: Option<String>,
    input_params: Option<IndexMap<String, ParamValue>>,
    content_source: Option<String>,
    #[serde(alias = "labels_eq")]
    filters_eq: Option<String>,
}

/// The registration payload for a graph.
///
/// Only the graph name and its ordered policies are sent; server-assigned
/// ids and empty optional fields are left out.
#[derive(Debug, Serialize)]
pub struct WireGraph<'a> {
    pub name: &'a str,
    pub extraction_policies: Vec<WirePolicy<'a>>,
}

/// One policy inside a [`WireGraph`].
#[derive(Debug, Serialize)]
pub struct WirePolicy<'a> {
    pub extractor: &'a str,
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_params: Option<&'a IndexMap<String, ParamValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters_eq: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_source: Option<&'a str>,
}

fn required(value: Option<String>, what: &str) -> GraphResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(GraphError::MalformedSpec {
            reason: format!("missing required field `{what}`"),
        }),
    }
}

impl ExtractionGraph {
    /// Parse a YAML (or JSON) graph description.
    ///
    /// Fails with `MalformedSpec` when the text does not parse or a graph or
    /// policy lacks `name`/`extractor`, and with `CyclicGraph` when the
    /// `content_source` edges loop.
    pub fn from_spec(text: &str) -> GraphResult<Self> {
        let raw: RawGraph = serde_yaml::from_str(text).map_err(|e| GraphError::MalformedSpec {
            reason: e.to_string(),
        })?;

        let name = required(raw.name, "name")?;
        let policies = raw
            .extraction_policies
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                Ok(ExtractionPolicy {
                    id: p.id,
                    name: required(p.name, &format!("extraction_policies[{i}].name"))?,
                    extractor: required(p.extractor, &format!("extraction_policies[{i}].extractor"))?,
                    input_params: p.input_params.unwrap_or_default(),
                    content_source: p.content_source,
                    label_filter: p.filters_eq,
                })
            })
            .collect::<GraphResult<Vec<_>>>()?;

        let graph = Self {
            id: raw.id,
            name,
            namespace: raw.namespace,
            policies,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Check acyclicity, name uniqueness and edge resolution.
    ///
    /// A cycle is reported ahead of any other problem in the same graph.
    pub fn validate(&self) -> GraphResult<()> {
        self.check_acyclic()?;

        let mut seen = HashSet::new();
        for policy in &self.policies {
            if !seen.insert(policy.name.as_str()) {
                return Err(GraphError::DuplicatePolicyName {
                    name: policy.name.clone(),
                });
            }
        }

        for policy in &self.policies {
            if let Some(source) = policy.upstream() {
                if !seen.contains(source) {
                    return Err(GraphError::DanglingSourceReference {
                        policy: policy.name.clone(),
                        source_name: source.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Fail with `CyclicGraph` if following `content_source` edges ever
    /// revisits a policy. Unknown sources are treated as leaves.
    pub fn check_acyclic(&self) -> GraphResult<()> {
        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
        for policy in &self.policies {
            let targets = edges.entry(policy.name.as_str()).or_default();
            if let Some(source) = policy.upstream() {
                targets.push(source);
            }
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            node: &'a str,
            edges: &HashMap<&'a str, Vec<&'a str>>,
            marks: &mut HashMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> GraphResult<()> {
            match marks.get(node) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|n| *n == node).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(node.to_string());
                    return Err(GraphError::CyclicGraph { cycle });
                }
                None => {}
            }

            marks.insert(node, Mark::Visiting);
            path.push(node);
            for &next in edges.get(node).into_iter().flatten() {
                visit(next, edges, marks, path)?;
            }
            path.pop();
            marks.insert(node, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        let mut path = Vec::new();
        for policy in &self.policies {
            visit(policy.name.as_str(), &edges, &mut marks, &mut path)?;
        }
        Ok(())
    }

    /// The registration payload for this graph.
    pub fn to_wire_format(&self) -> WireGraph<'_> {
        WireGraph {
            name: &self.name,
            extraction_policies: self
                .policies
                .iter()
                .map(|p| WirePolicy {
                    extractor: &p.extractor,
                    name: &p.name,
                    input_params: (!p.input_params.is_empty()).then_some(&p.input_params),
                    filters_eq: p.label_filter.as_deref(),
                    content_source: p.content_source.as_deref(),
                })
                .collect(),
        }
    }
}
