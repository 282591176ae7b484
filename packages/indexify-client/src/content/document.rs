//! Documents accepted for ingestion.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// MIME type attached to text documents.
pub const TEXT_MIME_TYPE: &str = "text/plain";

/// A document to ingest: bare text, or text with labels and an optional id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Document {
    Text(String),
    Structured {
        text: String,
        #[serde(default)]
        labels: HashMap<String, String>,
        #[serde(default)]
        id: Option<String>,
    },
}

/// A document in the single shape used for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDocument {
    pub text: String,
    pub labels: HashMap<String, String>,
    pub id: Option<String>,
}

impl Document {
    pub fn text(text: impl Into<String>) -> Self {
        Document::Text(text.into())
    }

    pub fn structured(text: impl Into<String>, labels: HashMap<String, String>) -> Self {
        Document::Structured {
            text: text.into(),
            labels,
            id: None,
        }
    }

    /// Attach a caller-chosen content id.
    pub fn with_id(self, id: impl Into<String>) -> Self {
        let id = Some(id.into());
        match self {
            Document::Text(text) => Document::Structured {
                text,
                labels: HashMap::new(),
                id,
            },
            Document::Structured { text, labels, .. } => Document::Structured { text, labels, id },
        }
    }

    /// Collapse both variants and tag the MIME type.
    pub fn normalize(self) -> NormalizedDocument {
        let (text, mut labels, id) = match self {
            Document::Text(text) => (text, HashMap::new(), None),
            Document::Structured { text, labels, id } => (text, labels, id),
        };
        labels.insert("mime_type".to_string(), TEXT_MIME_TYPE.to_string());
        NormalizedDocument { text, labels, id }
    }
}

impl From<&str> for Document {
    fn from(text: &str) -> Self {
        Document::text(text)
    }
}

impl From<String> for Document {
    fn from(text: String) -> Self {
        Document::Text(text)
    }
}
