//! Content nodes, lineage and ingestion inputs.

pub mod document;
pub mod lineage;
pub mod metadata;
pub mod source;

pub use document::{Document, NormalizedDocument, TEXT_MIME_TYPE};
pub use lineage::{filter_descendants, is_remote_locator, resolve_url, DescendantFilter};
pub use metadata::{ContentMetadata, ContentTree, LineageIssue};
pub use source::{ByteSource, FileSystemSource, MemoryByteSource};
