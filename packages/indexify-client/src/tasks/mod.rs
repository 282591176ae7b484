//! Tasks: the binding of one content node to one extraction policy.
//!
//! A task starts `Pending` and moves once to `Success` or `Failure`. The
//! [`TaskTracker`] keeps the first terminal outcome it sees per task, so a
//! stale `Pending` read can never undo an observed resolution.

pub mod completion;

pub use completion::{CompletionSource, CompletionWaiter};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::content::ContentMetadata;
use crate::graph::ParamValue;
use crate::query::QueryParams;

/// Outcome of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskOutcome {
    #[default]
    #[serde(alias = "Unknown", alias = "unknown", alias = "pending")]
    Pending,
    #[serde(alias = "success")]
    Success,
    #[serde(alias = "Failed", alias = "failed", alias = "failure")]
    Failure,
}

impl TaskOutcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskOutcome::Pending)
    }

    /// Merge a new observation into a known outcome. Terminal outcomes stick.
    pub fn advance(self, observed: TaskOutcome) -> TaskOutcome {
        if self.is_terminal() {
            self
        } else {
            observed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskOutcome::Pending => "Pending",
            TaskOutcome::Success => "Success",
            TaskOutcome::Failure => "Failure",
        }
    }
}

#[derive(Deserialize)]
struct RawTask {
    id: String,
    #[serde(default, alias = "extraction_policy_id")]
    policy_id: String,
    #[serde(default)]
    content_id: Option<String>,
    #[serde(default)]
    content_metadata: Option<ContentMetadata>,
    #[serde(default, alias = "extraction_graph")]
    graph_name: Option<String>,
    #[serde(default)]
    extractor: Option<String>,
    #[serde(default)]
    input_params: Option<IndexMap<String, ParamValue>>,
    #[serde(default)]
    outcome: TaskOutcome,
}

impl From<RawTask> for Task {
    fn from(raw: RawTask) -> Self {
        let content_id = raw
            .content_id
            .filter(|id| !id.is_empty())
            .or_else(|| raw.content_metadata.as_ref().map(|m| m.id.clone()))
            .unwrap_or_default();
        Task {
            id: raw.id,
            policy_id: raw.policy_id,
            content_id,
            graph_name: raw.graph_name.unwrap_or_default(),
            extractor: raw.extractor,
            input_params: raw.input_params.unwrap_or_default(),
            outcome: raw.outcome,
        }
    }
}

/// One unit of extraction work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTask")]
pub struct Task {
    pub id: String,
    pub policy_id: String,
    pub content_id: String,
    pub graph_name: String,
    pub extractor: Option<String>,
    pub input_params: IndexMap<String, ParamValue>,
    pub outcome: TaskOutcome,
}

impl Task {
    pub fn new(id: impl Into<String>, policy_id: impl Into<String>, content_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            policy_id: policy_id.into(),
            content_id: content_id.into(),
            graph_name: String::new(),
            extractor: None,
            input_params: IndexMap::new(),
            outcome: TaskOutcome::Pending,
        }
    }

    pub fn with_outcome(mut self, outcome: TaskOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

/// Filters for task listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub content_id: Option<String>,
    pub policy_id: Option<String>,
    pub outcome: Option<TaskOutcome>,
    /// Opaque cursor; only forward values taken from a previous page
    pub start_id: Option<String>,
    pub limit: Option<u64>,
    #[serde(default)]
    pub return_total: bool,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_content(content_id: impl Into<String>) -> Self {
        Self {
            content_id: Some(content_id.into()),
            ..Default::default()
        }
    }

    pub fn with_policy(mut self, policy_id: impl Into<String>) -> Self {
        self.policy_id = Some(policy_id.into());
        self
    }

    pub fn with_outcome(mut self, outcome: TaskOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn starting_at(mut self, start_id: impl Into<String>) -> Self {
        self.start_id = Some(start_id.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_total(mut self) -> Self {
        self.return_total = true;
        self
    }

    /// Encode as request query parameters.
    pub fn to_params(&self, namespace: &str) -> QueryParams {
        let mut params = QueryParams::new();
        params.push("namespace", namespace);
        params.push_opt("content_id", self.content_id.as_deref());
        params.push_opt("extraction_policy", self.policy_id.as_deref());
        params.push_opt("outcome", self.outcome.map(TaskOutcome::as_str));
        params.push_opt("start_id", self.start_id.as_deref());
        params.push_opt("limit", self.limit);
        params.push("return_total", self.return_total);
        params
    }
}

/// One page of a task listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPage {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl TaskPage {
    /// Cursor for the following page, taken from this page's last task.
    pub fn next_start_id(&self) -> Option<&str> {
        self.tasks.last().map(|t| t.id.as_str())
    }
}

/// Summary of a round of task observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub total: usize,
    pub pending: usize,
    pub succeeded: usize,
    /// First failed task in observation order
    pub failure: Option<Task>,
}

impl Progress {
    /// Every observed task is terminal.
    pub fn is_resolved(&self) -> bool {
        self.pending == 0
    }
}

/// Monotonic record of task outcomes.
#[derive(Debug, Clone, Default)]
pub struct TaskTracker {
    outcomes: HashMap<String, TaskOutcome>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation and return the merged outcome.
    pub fn observe(&mut self, task: &Task) -> TaskOutcome {
        let known = self.outcomes.entry(task.id.clone()).or_default();
        let merged = known.advance(task.outcome);
        if merged != task.outcome {
            warn!(
                task_id = %task.id,
                known = merged.as_str(),
                observed = task.outcome.as_str(),
                "Ignoring task outcome regression"
            );
        }
        *known = merged;
        merged
    }

    /// Record a full listing for one content id.
    pub fn observe_all(&mut self, tasks: &[Task]) -> Progress {
        let mut progress = Progress {
            total: tasks.len(),
            ..Default::default()
        };

        for task in tasks {
            match self.observe(task) {
                TaskOutcome::Pending => progress.pending += 1,
                TaskOutcome::Success => progress.succeeded += 1,
                TaskOutcome::Failure => {
                    if progress.failure.is_none() {
                        progress.failure = Some(task.clone().with_outcome(TaskOutcome::Failure));
                    }
                }
            }
        }

        progress
    }

    /// Last merged outcome for a task id.
    pub fn outcome(&self, task_id: &str) -> Option<TaskOutcome> {
        self.outcomes.get(task_id).copied()
    }
}
