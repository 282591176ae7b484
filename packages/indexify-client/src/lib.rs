//! Typed client for Indexify.
//!
//! Indexify runs *extraction graphs*: named DAGs of extractor policies that
//! fire on newly ingested content and on content derived from it. This crate
//! builds and validates graphs locally, ingests content, tracks the tasks the
//! service schedules, and queries the results.
//!
//! # Usage
//!
//! ```rust,ignore
//! use indexify_client::{ExtractionGraph, ExtractionPolicy, IndexifyClient, SearchRequest};
//!
//! let client = IndexifyClient::from_env().await?;
//!
//! let graph = ExtractionGraph::new("kb")
//!     .with_policy(ExtractionPolicy::new("tensorlake/chunk-extractor", "chunks"))
//!     .with_policy(
//!         ExtractionPolicy::new("tensorlake/minilm-l6", "embeddings").with_content_source("chunks"),
//!     );
//! client.create_extraction_graph(&graph).await?;
//!
//! let ids = client.add_documents(&["kb"], ["Indexify is a data framework"]).await?;
//! client.wait_for_completion(&ids).await?;
//!
//! let hits = client
//!     .search_index(&SearchRequest::new("kb.embeddings.embedding", "data framework"))
//!     .await?;
//! ```
//!
//! # Modules
//!
//! - [`graph`] - Extraction graphs, policies and validation
//! - [`content`] - Content metadata, lineage and byte sources
//! - [`tasks`] - Tasks and completion waiting
//! - [`query`] - Label filters, listings and search requests
//! - [`transport`] - The request seam and its HTTP implementation
//! - [`testing`] - Mock implementations for testing

pub mod client;
pub mod config;
pub mod content;
pub mod error;
pub mod graph;
pub mod query;
pub mod tasks;
pub mod testing;
pub mod transport;
pub mod types;

pub use client::{generate_hash_from_string, generate_unique_hex_id, IndexifyClient};
pub use config::{ClientConfig, DEFAULT_NAMESPACE, DEFAULT_SERVICE_URL};
pub use content::{
    filter_descendants, resolve_url, ByteSource, ContentMetadata, ContentTree, DescendantFilter, Document,
    FileSystemSource, LineageIssue, MemoryByteSource,
};
pub use error::{GraphError, IndexifyError, QueryError, Result, TransportError};
pub use graph::{ExtractionGraph, ExtractionPolicy, ParamValue, INGESTION_SOURCE};
pub use query::{ContentListQuery, LabelEncoding, LabelFilter, SearchRequest};
pub use tasks::{CompletionSource, CompletionWaiter, Task, TaskFilter, TaskOutcome, TaskPage, TaskTracker};
pub use transport::{HttpTransport, TlsConfig, Transport};
pub use types::{
    Content, ContentPage, ExtractRequest, ExtractResponse, Extractor, GraphAnalytics, GraphSnapshot, RemoteFile,
    SearchResult,
};
