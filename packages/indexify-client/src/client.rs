//! Namespace-scoped Indexify client.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::content::{
    filter_descendants, resolve_url, ByteSource, ContentMetadata, DescendantFilter, Document,
    FileSystemSource, TEXT_MIME_TYPE,
};
use crate::error::{IndexifyError, Result, TransportError};
use crate::graph::ExtractionGraph;
use crate::query::{ContentListQuery, QueryParams, SearchRequest, SqlQuery};
use crate::tasks::{CompletionSource, CompletionWaiter, Task, TaskFilter, TaskPage};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, MultipartForm, Transport};
use crate::types::{
    AddGraphResponse, ContentIdResponse, ContentPage, CreateNamespace, ExtractBody, ExtractRequest,
    ExtractResponse, ExtractedMetadata, Extractor, GraphAnalytics, GraphLink, GraphSnapshot, Index,
    Namespace, RemoteFile, Schema, SearchResult,
};

/// File name given to text documents in multipart uploads.
const DOCUMENT_FILE_NAME: &str = "document.txt";

/// Tasks requested per page while waiting on content.
const TASK_PAGE_SIZE: u64 = 100;

// Response envelopes. Every list comes wrapped in a named field.

#[derive(Deserialize)]
struct Namespaces {
    #[serde(default)]
    namespaces: Vec<Namespace>,
}

#[derive(Deserialize)]
struct Extractors {
    #[serde(default)]
    extractors: Vec<Extractor>,
}

#[derive(Deserialize)]
struct Indexes {
    #[serde(default)]
    indexes: Vec<Index>,
}

#[derive(Deserialize)]
struct Schemas {
    #[serde(default)]
    schemas: Vec<Schema>,
}

#[derive(Deserialize)]
struct ExtractionGraphs {
    #[serde(default)]
    extraction_graphs: Vec<ExtractionGraph>,
}

#[derive(Deserialize)]
struct MetadataEnvelope {
    #[serde(default)]
    content_metadata: Option<ContentMetadata>,
    #[serde(default)]
    metadata: Vec<ExtractedMetadata>,
}

#[derive(Default, Deserialize)]
struct ContentTreeEnvelope {
    #[serde(default)]
    content_tree_metadata: Vec<ContentMetadata>,
}

#[derive(Deserialize)]
struct SearchResults {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SqlRow {
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct SqlRows {
    #[serde(default)]
    rows: Vec<SqlRow>,
}

/// Client bound to one namespace.
///
/// All calls go through the configured [`Transport`]. The only client-side
/// state is the [`GraphSnapshot`], which changes only on [`refresh`](Self::refresh).
pub struct IndexifyClient<T: Transport = HttpTransport> {
    config: ClientConfig,
    transport: Arc<T>,
    byte_source: Arc<dyn ByteSource>,
    snapshot: RwLock<Arc<GraphSnapshot>>,
}

impl IndexifyClient<HttpTransport> {
    /// Build an HTTP client from configuration.
    ///
    /// When TLS is configured the certificates are read from the filesystem.
    pub async fn from_config(config: ClientConfig) -> Result<Self> {
        let source: Arc<dyn ByteSource> = Arc::new(FileSystemSource);
        let transport = match &config.tls {
            Some(tls) => {
                HttpTransport::with_tls(&config.service_url, config.request_timeout(), tls, source.as_ref())
                    .await?
            }
            None => HttpTransport::new(&config.service_url, config.request_timeout())?,
        };

        Ok(Self::with_transport(config, transport).with_byte_source(source))
    }

    /// Build an HTTP client from `INDEXIFY_*` environment variables.
    pub async fn from_env() -> Result<Self> {
        Self::from_config(ClientConfig::from_env()?).await
    }
}

impl<T: Transport> IndexifyClient<T> {
    /// Client over an arbitrary transport. Uploads read from the filesystem
    /// until another [`ByteSource`] is set.
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            byte_source: Arc::new(FileSystemSource),
            snapshot: RwLock::new(Arc::new(GraphSnapshot::empty())),
        }
    }

    pub fn with_byte_source(mut self, source: Arc<dyn ByteSource>) -> Self {
        self.byte_source = source;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn service_url(&self) -> &str {
        &self.config.service_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn ns_path(&self, rest: &str) -> String {
        format!("namespaces/{}/{}", self.config.namespace, rest)
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        Ok(self.transport.request(request).await?)
    }

    async fn get_json<R: DeserializeOwned>(&self, path: String) -> Result<R> {
        Ok(self.send(ApiRequest::get(path)).await?.json()?)
    }

    /// GET a listing. A 404 means nothing matched and yields an empty result.
    async fn get_listing<R: DeserializeOwned + Default>(&self, request: ApiRequest) -> Result<R> {
        let path = request.path.clone();
        match self.transport.request(request).await {
            Ok(response) => Ok(response.json()?),
            Err(e) if e.is_not_found() => {
                debug!(path = %path, "Listing not found, returning empty result");
                Ok(R::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Attach the download locator the caller should use.
    fn with_content_url(&self, mut node: ContentMetadata) -> ContentMetadata {
        node.content_url = Some(resolve_url(&node, &self.config.service_url, &self.config.namespace));
        node
    }

    // =========================================================================
    // Namespaces and registry
    // =========================================================================

    /// All namespaces known to the service.
    pub async fn namespaces(&self) -> Result<Vec<Namespace>> {
        let envelope: Namespaces = self.get_json("namespaces".into()).await?;
        Ok(envelope.namespaces)
    }

    /// Create a namespace and return a client scoped to it.
    ///
    /// Graphs are validated before anything is sent.
    pub async fn create_namespace(
        &self,
        name: &str,
        graphs: &[ExtractionGraph],
        labels: &HashMap<String, String>,
    ) -> Result<Self> {
        for graph in graphs {
            graph.validate()?;
        }

        let body = CreateNamespace {
            name,
            extraction_graphs: graphs.iter().map(ExtractionGraph::to_wire_format).collect(),
            labels,
        };
        self.send(ApiRequest::post("namespaces").json(&body)?).await?;
        info!(namespace = name, graphs = graphs.len(), "Created namespace");

        Ok(Self {
            config: self.config.clone().with_namespace(name),
            transport: Arc::clone(&self.transport),
            byte_source: Arc::clone(&self.byte_source),
            snapshot: RwLock::new(Arc::new(GraphSnapshot::empty())),
        })
    }

    pub async fn extractors(&self) -> Result<Vec<Extractor>> {
        let envelope: Extractors = self.get_json("extractors".into()).await?;
        Ok(envelope.extractors)
    }

    pub async fn indexes(&self) -> Result<Vec<Index>> {
        let envelope: Indexes = self.get_json(self.ns_path("indexes")).await?;
        Ok(envelope.indexes)
    }

    pub async fn schemas(&self) -> Result<Vec<Schema>> {
        let envelope: Schemas = self.get_json(self.ns_path("schemas")).await?;
        Ok(envelope.schemas)
    }

    // =========================================================================
    // Extraction graphs
    // =========================================================================

    /// Register a graph and return the names of the indexes it created.
    ///
    /// The graph is validated locally first; an invalid graph never reaches
    /// the transport. The graph snapshot is left alone; call
    /// [`refresh`](Self::refresh) to see the new graph there.
    pub async fn create_extraction_graph(&self, graph: &ExtractionGraph) -> Result<AddGraphResponse> {
        graph.validate()?;

        let request = ApiRequest::post(self.ns_path("extraction_graphs")).json(&graph.to_wire_format())?;
        let response: AddGraphResponse = self.send(request).await?.json()?;

        info!(
            namespace = %self.config.namespace,
            graph = %graph.name,
            policies = graph.policies.len(),
            indexes = response.indexes.len(),
            "Created extraction graph"
        );
        Ok(response)
    }

    /// Parse a YAML/JSON graph description and register it.
    pub async fn create_extraction_graph_from_spec(&self, spec: &str) -> Result<AddGraphResponse> {
        let graph = ExtractionGraph::from_spec(spec)?;
        self.create_extraction_graph(&graph).await
    }

    /// Fetch the namespace's graphs and replace the snapshot.
    pub async fn refresh(&self) -> Result<Arc<GraphSnapshot>> {
        let envelope: ExtractionGraphs = self.get_json(self.ns_path("extraction_graphs")).await?;

        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        let next = Arc::new(GraphSnapshot {
            version: guard.version + 1,
            fetched_at: Some(Utc::now()),
            graphs: Arc::new(envelope.extraction_graphs),
        });
        *guard = Arc::clone(&next);

        debug!(
            namespace = %self.config.namespace,
            version = next.version,
            graphs = next.graphs.len(),
            "Refreshed extraction graph snapshot"
        );
        Ok(next)
    }

    /// The last fetched snapshot. Never triggers a request.
    pub fn extraction_graphs(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Feed content produced by `content_source` in `source_graph` into `linked_graph`.
    pub async fn link_extraction_graphs(
        &self,
        source_graph: &str,
        content_source: &str,
        linked_graph: &str,
    ) -> Result<()> {
        let body = GraphLink {
            content_source,
            linked_graph_name: linked_graph,
        };
        let path = self.ns_path(&format!("extraction_graphs/{source_graph}/links"));
        self.send(ApiRequest::post(path).json(&body)?).await?;

        info!(source_graph, content_source, linked_graph, "Linked extraction graphs");
        Ok(())
    }

    pub async fn extraction_graph_analytics(&self, graph: &str) -> Result<GraphAnalytics> {
        self.get_json(self.ns_path(&format!("extraction_graphs/{graph}/analytics")))
            .await
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Upload text documents into each graph.
    ///
    /// Returns one content id per (graph, document) pair, graphs outermost.
    pub async fn add_documents<G, D>(&self, graphs: &[G], documents: D) -> Result<Vec<String>>
    where
        G: AsRef<str>,
        D: IntoIterator,
        D::Item: Into<Document>,
    {
        let documents: Vec<_> = documents.into_iter().map(|d| Into::<Document>::into(d).normalize()).collect();
        let mut content_ids = Vec::with_capacity(graphs.len() * documents.len());

        for graph in graphs {
            let graph = graph.as_ref();
            for document in &documents {
                let form = MultipartForm::new()
                    .text("labels", serde_json::to_string(&document.labels)?)
                    .file(
                        DOCUMENT_FILE_NAME,
                        Some(TEXT_MIME_TYPE),
                        Bytes::from(document.text.clone()),
                    );

                let mut query = QueryParams::new();
                query.push_opt("id", document.id.as_deref());

                let path = self.ns_path(&format!("extraction_graphs/{graph}/extract"));
                let request = ApiRequest::post(path).with_query(query).multipart(form);
                let response: ContentIdResponse = self.send(request).await?.json()?;

                let content_id = response
                    .content_id
                    .filter(|id| !id.is_empty())
                    .or_else(|| document.id.clone())
                    .ok_or_else(|| IndexifyError::IncompleteUpload {
                        graph: graph.to_string(),
                    })?;
                content_ids.push(content_id);
            }
        }

        info!(
            namespace = %self.config.namespace,
            graphs = graphs.len(),
            documents = documents.len(),
            "Added documents"
        );
        Ok(content_ids)
    }

    /// Upload a file read through the configured [`ByteSource`].
    ///
    /// Graphs are tried in order and the first content id returned (or the
    /// caller's `new_content_id`) wins.
    pub async fn upload_file<G: AsRef<str>>(
        &self,
        graphs: &[G],
        reference: &str,
        labels: &HashMap<String, String>,
        new_content_id: Option<&str>,
    ) -> Result<String> {
        let data = self.byte_source.read(reference).await?;
        let file_name = self.byte_source.file_name(reference);
        let labels = serde_json::to_string(labels)?;

        for graph in graphs {
            let graph = graph.as_ref();
            let form = MultipartForm::new()
                .text("labels", labels.clone())
                .file(file_name.clone(), None, data.clone());

            let mut query = QueryParams::new();
            query.push_opt("id", new_content_id);

            let path = self.ns_path(&format!("extraction_graphs/{graph}/extract"));
            let request = ApiRequest::post(path).with_query(query).multipart(form);
            let response: ContentIdResponse = self.send(request).await?.json()?;

            let content_id = response
                .content_id
                .filter(|id| !id.is_empty())
                .or_else(|| new_content_id.map(str::to_string));
            if let Some(content_id) = content_id {
                info!(graph, content_id = %content_id, file = %file_name, bytes = data.len(), "Uploaded file");
                return Ok(content_id);
            }
            warn!(graph, file = %file_name, "Upload returned no content id");
        }

        let graph = graphs
            .iter()
            .map(|g| g.as_ref())
            .collect::<Vec<_>>()
            .join(",");
        Err(IndexifyError::IncompleteUpload { graph })
    }

    /// Ask the service to fetch and ingest a remote file.
    ///
    /// Returns the content id when the service reports one.
    pub async fn ingest_remote_file(&self, file: &RemoteFile) -> Result<Option<String>> {
        let request = ApiRequest::post(self.ns_path("ingest_remote_file")).json(file)?;
        let response: Option<ContentIdResponse> = self.send(request).await?.json()?;

        info!(url = %file.url, graphs = file.extraction_graph_names.len(), "Ingesting remote file");
        Ok(response.and_then(|r| r.content_id).or_else(|| file.id.clone()))
    }

    // =========================================================================
    // Content
    // =========================================================================

    pub async fn content_metadata(&self, content_id: &str) -> Result<ContentMetadata> {
        let envelope: MetadataEnvelope = self
            .get_json(self.ns_path(&format!("content/{content_id}/metadata")))
            .await?;
        let node = envelope.content_metadata.ok_or_else(|| {
            IndexifyError::Transport(TransportError::Decode(format!(
                "no metadata returned for content {content_id}"
            )))
        })?;
        Ok(self.with_content_url(node))
    }

    /// Structured metadata extractors attached to the content.
    pub async fn structured_metadata(&self, content_id: &str) -> Result<Vec<ExtractedMetadata>> {
        let envelope: MetadataEnvelope = self
            .get_json(self.ns_path(&format!("content/{content_id}/metadata")))
            .await?;
        Ok(envelope.metadata)
    }

    pub async fn download_content(&self, content_id: &str) -> Result<Bytes> {
        let path = self.ns_path(&format!("content/{content_id}/download"));
        let response = self.send(ApiRequest::get(path)).await?;
        debug!(content_id, bytes = response.body.len(), "Downloaded content");
        Ok(response.body)
    }

    /// One page of content in a graph.
    ///
    /// Label filters are encoded with the configured [`LabelEncoding`](crate::query::LabelEncoding);
    /// an ambiguous filter fails before any request is made.
    pub async fn list_content(&self, query: &ContentListQuery) -> Result<ContentPage> {
        let params = query.to_params(&self.config.namespace, self.config.label_encoding)?;
        let path = self.ns_path(&format!("extraction_graphs/{}/content", query.extraction_graph));

        let page: ContentPage = self.get_listing(ApiRequest::get(path).with_query(params)).await?;

        debug!(graph = %query.extraction_graph, count = page.content.len(), "Listed content");
        Ok(ContentPage {
            content: page
                .content
                .into_iter()
                .map(|n| self.with_content_url(n))
                .collect(),
            total: page.total.filter(|_| query.return_total),
        })
    }

    /// Content that `policy` in `graph` derived from `content_id`.
    ///
    /// With `blocking`, waits for the content's tasks to finish first.
    pub async fn extracted_content(
        &self,
        content_id: &str,
        graph: &str,
        policy: &str,
        blocking: bool,
    ) -> Result<Vec<ContentMetadata>> {
        if blocking {
            self.wait_for_completion(&[content_id]).await?;
        }

        let path = self.ns_path(&format!(
            "extraction_graphs/{graph}/extraction_policies/{policy}/content/{content_id}"
        ));
        let envelope: ContentTreeEnvelope = self.get_listing(ApiRequest::get(path)).await?;

        let filter = DescendantFilter::new(graph, policy);
        Ok(filter_descendants(&envelope.content_tree_metadata, &filter)
            .into_iter()
            .map(|mut node| {
                node.root_content_id.get_or_insert_with(|| content_id.to_string());
                self.with_content_url(node)
            })
            .collect())
    }

    pub async fn update_labels(&self, content_id: &str, labels: &HashMap<String, String>) -> Result<()> {
        let path = self.ns_path(&format!("content/{content_id}/labels"));
        let body = serde_json::json!({ "labels": labels });
        self.send(ApiRequest::put(path).json(&body)?).await?;

        info!(content_id, labels = labels.len(), "Updated labels");
        Ok(())
    }

    /// Replace the bytes of existing content.
    pub async fn update_content(&self, content_id: &str, reference: &str) -> Result<()> {
        let data = self.byte_source.read(reference).await?;
        let form = MultipartForm::new().file(self.byte_source.file_name(reference), None, data);

        let path = self.ns_path(&format!("content/{content_id}"));
        self.send(ApiRequest::put(path).multipart(form)).await?;

        info!(content_id, "Updated content");
        Ok(())
    }

    /// Tombstone content on the service.
    pub async fn delete_content(&self, content_id: &str) -> Result<()> {
        let path = self.ns_path(&format!("content/{content_id}"));
        self.send(ApiRequest::delete(path)).await?;

        info!(content_id, "Deleted content");
        Ok(())
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<TaskPage> {
        let params = filter.to_params(&self.config.namespace);
        self.fetch_tasks(self.ns_path("tasks"), params, filter.return_total)
            .await
    }

    /// Tasks of one policy in a graph.
    pub async fn graph_tasks(&self, graph: &str, policy: &str, filter: &TaskFilter) -> Result<TaskPage> {
        let mut params = filter.to_params(&self.config.namespace);
        params.push("extraction_graph", graph);
        if filter.policy_id.is_none() {
            params.push("extraction_policy", policy);
        }

        let path = self.ns_path(&format!("extraction_graphs/{graph}/extraction_policies/{policy}/tasks"));
        self.fetch_tasks(path, params, filter.return_total).await
    }

    async fn fetch_tasks(&self, path: String, params: QueryParams, return_total: bool) -> Result<TaskPage> {
        let page: TaskPage = self.get_listing(ApiRequest::get(path).with_query(params)).await?;
        Ok(TaskPage {
            total: page.total.filter(|_| return_total),
            tasks: page.tasks,
        })
    }

    // =========================================================================
    // Search and extraction
    // =========================================================================

    pub async fn search_index(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let body = request.to_body(self.config.label_encoding)?;
        let path = self.ns_path(&format!("indexes/{}/search", request.index));

        let envelope: SearchResults = self.send(ApiRequest::post(path).json(&body)?).await?.json()?;
        debug!(index = %request.index, k = request.k, hits = envelope.results.len(), "Searched index");
        Ok(envelope.results)
    }

    /// Run a SQL query over structured metadata and return the row payloads.
    pub async fn sql_query(&self, query: &str) -> Result<Vec<serde_json::Value>> {
        let request = ApiRequest::post(self.ns_path("sql_query")).json(&SqlQuery::new(query))?;
        let envelope: SqlRows = self.send(request).await?.json()?;
        Ok(envelope.rows.into_iter().map(|r| r.data).collect())
    }

    /// Run one extractor directly on inline content.
    pub async fn extract(&self, request: &ExtractRequest) -> Result<ExtractResponse> {
        let body = ExtractBody::new(request)?;
        let response: ExtractResponse = self
            .send(ApiRequest::post("extractors/extract").json(&body)?)
            .await?
            .json()?;

        debug!(
            extractor = %request.name,
            features = response.features.len(),
            content = response.content.len(),
            "Extracted"
        );
        Ok(response)
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Wait until every id's tasks are terminal, in order.
    ///
    /// The first failure aborts the remaining ids.
    pub async fn wait_for_completion<I: AsRef<str> + Sync>(&self, content_ids: &[I]) -> Result<()> {
        self.wait_for_completion_with_cancel(content_ids, &CancellationToken::new())
            .await
    }

    /// Like [`wait_for_completion`](Self::wait_for_completion), stopping early
    /// with [`IndexifyError::Cancelled`] when `cancel` fires.
    pub async fn wait_for_completion_with_cancel<I: AsRef<str> + Sync>(
        &self,
        content_ids: &[I],
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!(
            namespace = %self.config.namespace,
            count = content_ids.len(),
            "Waiting for extraction"
        );
        CompletionWaiter::new(self, self.config.poll_interval())
            .with_timeout(self.config.wait_timeout())
            .wait(content_ids, cancel)
            .await
    }
}

#[async_trait]
impl<T: Transport> CompletionSource for IndexifyClient<T> {
    async fn await_content(&self, content_id: &str) -> Result<()> {
        let path = self.ns_path(&format!("content/{content_id}/wait"));
        self.send(ApiRequest::get(path)).await?;
        Ok(())
    }

    /// Every task bound to the content, following pagination to the end.
    async fn content_tasks(&self, content_id: &str) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        let mut filter = TaskFilter::for_content(content_id).with_limit(TASK_PAGE_SIZE);

        loop {
            let page = self.list_tasks(&filter).await?;
            let count = page.tasks.len() as u64;
            let next = page.next_start_id().map(str::to_string);
            tasks.extend(page.tasks);

            match next {
                Some(cursor) if count >= TASK_PAGE_SIZE && filter.start_id.as_deref() != Some(cursor.as_str()) => {
                    filter = filter.starting_at(cursor);
                }
                _ => break,
            }
        }

        Ok(tasks)
    }
}

/// Random 16-character hex id.
pub fn generate_unique_hex_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

/// First 16 hex characters of the SHA-256 of `input`.
pub fn generate_hash_from_string(input: &str) -> String {
    let mut hash = format!("{:x}", Sha256::digest(input.as_bytes()));
    hash.truncate(16);
    hash
}
