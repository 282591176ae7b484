//! Index search and SQL query requests.

use serde::{Deserialize, Serialize};

use super::labels::{encode_all, LabelEncoding, LabelFilter};
use crate::error::QueryResult;

/// Default number of nearest neighbours returned by a search.
pub const DEFAULT_TOP_K: u32 = 3;

/// A k-nearest search over one index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Index name (`graph.policy.output`)
    pub index: String,

    /// Free-text query
    pub query: String,

    /// Number of results
    pub k: u32,

    /// Discrete label constraints
    #[serde(default)]
    pub filters: Vec<LabelFilter>,

    /// Return the matched text alongside metadata
    pub include_content: bool,
}

/// Body of `POST indexes/{name}/search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchBody {
    pub query: String,
    pub k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<String>>,
    pub include_content: bool,
}

impl SearchRequest {
    /// Search `index` for `query`, returning the default top-k with content.
    pub fn new(index: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            query: query.into(),
            k: DEFAULT_TOP_K,
            filters: Vec::new(),
            include_content: true,
        }
    }

    pub fn with_k(mut self, k: u32) -> Self {
        self.k = k;
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(LabelFilter::eq(key, value));
        self
    }

    pub fn without_content(mut self) -> Self {
        self.include_content = false;
        self
    }

    /// Build the request body. Filters are omitted entirely when none are set.
    pub fn to_body(&self, encoding: LabelEncoding) -> QueryResult<SearchBody> {
        let filters = if self.filters.is_empty() {
            None
        } else {
            Some(encode_all(&self.filters, encoding)?)
        };

        Ok(SearchBody {
            query: self.query.clone(),
            k: self.k,
            filters,
            include_content: self.include_content,
        })
    }
}

/// Body of `POST sql_query`.
#[derive(Debug, Clone, Serialize)]
pub struct SqlQuery {
    pub query: String,
}

impl SqlQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}
