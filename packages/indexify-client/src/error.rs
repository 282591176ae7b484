//! Typed errors for the Indexify client.
//!
//! Graph and query construction failures are local and raised before any
//! request is built. Transport failures wrap whatever the remote call
//! reported and are passed through unchanged.

use thiserror::Error;

/// Errors raised while building or validating an extraction graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The graph description could not be parsed or lacks a required field
    #[error("malformed graph spec: {reason}")]
    MalformedSpec { reason: String },

    /// `content_source` edges form a cycle
    #[error("extraction graph contains a cycle: {}", cycle.join(" -> "))]
    CyclicGraph { cycle: Vec<String> },

    /// Two policies share a name
    #[error("duplicate extraction policy name: {name}")]
    DuplicatePolicyName { name: String },

    /// A policy reads from a source that is neither ingestion nor a sibling policy
    #[error("policy `{policy}` reads from unknown content source `{source_name}`")]
    DanglingSourceReference { policy: String, source_name: String },
}

/// Errors raised while encoding query or filter parameters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A label key or value contains a reserved separator (`:` or `,`)
    #[error("label filter `{key}` = `{value}` contains a reserved separator")]
    AmbiguousLabel { key: String, value: String },

    /// Label filters need a key
    #[error("label filter has an empty key")]
    EmptyLabelKey,
}

/// Errors reported by the transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed, timed out, or the request could not be sent
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response from the service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body did not have the expected shape
    #[error("decode error: {0}")]
    Decode(String),

    /// The request could not be built locally and was never sent
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Status code of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the service reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Top-level client error.
#[derive(Debug, Error)]
pub enum IndexifyError {
    /// Local graph construction failure
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Local query construction failure
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Remote call failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The service acknowledged an upload but returned no content id
    #[error("upload to graph `{graph}` returned no content id")]
    IncompleteUpload { graph: String },

    /// Capability unavailable in the current runtime context
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// A task bound to the awaited content finished with a failure outcome
    #[error("task {task_id} (policy {policy_id}) failed for content {content_id}")]
    TaskFailed {
        content_id: String,
        task_id: String,
        policy_id: String,
    },

    /// Waiting was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// Waiting exceeded the configured deadline
    #[error("timed out waiting for content {content_id}")]
    TimedOut { content_id: String },

    /// Invalid client configuration
    #[error("config error: {0}")]
    Config(String),

    /// Local file access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, IndexifyError>;

/// Result type alias for graph construction.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Result type alias for query construction.
pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Result type alias for transport calls.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
