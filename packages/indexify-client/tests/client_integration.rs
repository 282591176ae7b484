//! End-to-end client scenarios against a scripted transport.

use indexify_client::query::LabelEncoding;
use indexify_client::testing::{MemoryByteSource, MockTransport};
use indexify_client::transport::RequestBody;
use indexify_client::{
    ClientConfig, ContentListQuery, ContentTree, Document, ExtractionGraph, ExtractionPolicy, GraphError,
    IndexifyClient, IndexifyError, QueryError, SearchRequest, TaskFilter,
};
use reqwest::Method;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn config() -> ClientConfig {
    ClientConfig::default().with_poll_interval(Duration::from_millis(1))
}

fn client(transport: &MockTransport) -> IndexifyClient<MockTransport> {
    IndexifyClient::with_transport(config(), transport.clone())
}

fn kb_graph() -> ExtractionGraph {
    ExtractionGraph::new("kb")
        .with_policy(ExtractionPolicy::new("tensorlake/chunk-extractor", "c1"))
        .with_policy(ExtractionPolicy::new("tensorlake/minilm-l6", "c2").with_content_source("c1"))
}

// =============================================================================
// Graphs
// =============================================================================

#[tokio::test]
async fn test_invalid_graph_never_reaches_transport() {
    let transport = MockTransport::new();
    let client = client(&transport);

    let cyclic = ExtractionGraph::new("loop")
        .with_policy(ExtractionPolicy::new("e", "a").with_content_source("b"))
        .with_policy(ExtractionPolicy::new("e", "b").with_content_source("a"));

    let err = client.create_extraction_graph(&cyclic).await.unwrap_err();
    assert!(matches!(err, IndexifyError::Graph(GraphError::CyclicGraph { .. })));

    let dangling = ExtractionGraph::new("kb")
        .with_policy(ExtractionPolicy::new("e", "c2").with_content_source("c1"));
    let err = client.create_extraction_graph(&dangling).await.unwrap_err();
    assert!(matches!(
        err,
        IndexifyError::Graph(GraphError::DanglingSourceReference { .. })
    ));

    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_create_graph_sends_wire_format() {
    let transport = MockTransport::new().on_json(
        Method::POST,
        "namespaces/default/extraction_graphs",
        json!({"indexes": ["kb.c2.embedding"]}),
    );

    let response = client(&transport).create_extraction_graph(&kb_graph()).await.unwrap();
    assert_eq!(response.indexes, vec!["kb.c2.embedding"]);

    let body = transport.calls()[0].json().cloned().unwrap();
    assert_eq!(body["name"], "kb");
    assert_eq!(body["extraction_policies"][0]["name"], "c1");
    assert!(body["extraction_policies"][0].get("content_source").is_none());
    assert_eq!(body["extraction_policies"][1]["content_source"], "c1");
}

#[tokio::test]
async fn test_create_namespace_sends_wire_format() {
    let transport = MockTransport::new().on_json(Method::POST, "namespaces", json!({}));

    let mut fetched = kb_graph();
    fetched.id = Some("g-1".into());
    fetched.namespace = Some("default".into());

    let scoped = client(&transport)
        .create_namespace("research", &[fetched], &HashMap::new())
        .await
        .unwrap();
    assert_eq!(scoped.config().namespace, "research");

    let body = transport.calls()[0].json().cloned().unwrap();
    assert_eq!(body["name"], "research");
    let graph = &body["extraction_graphs"][0];
    assert_eq!(graph["name"], "kb");
    assert!(graph.get("id").is_none());
    assert!(graph.get("namespace").is_none());
    assert!(graph["extraction_policies"][0].get("content_source").is_none());
    assert_eq!(graph["extraction_policies"][1]["content_source"], "c1");
}

#[tokio::test]
async fn test_snapshot_changes_only_on_refresh() {
    let transport = MockTransport::new()
        .on_json(
            Method::POST,
            "namespaces/default/extraction_graphs",
            json!({"indexes": []}),
        )
        .on_sequence(
            Method::GET,
            "namespaces/default/extraction_graphs",
            vec![
                json!({"extraction_graphs": []}),
                json!({"extraction_graphs": [{"name": "kb", "extraction_policies": [
                    {"extractor": "tensorlake/chunk-extractor", "name": "c1"}
                ]}]}),
            ],
        );
    let client = client(&transport);

    assert_eq!(client.extraction_graphs().version, 0);

    let first = client.refresh().await.unwrap();
    assert_eq!(first.version, 1);
    assert!(first.graphs.is_empty());

    client.create_extraction_graph(&kb_graph()).await.unwrap();
    assert_eq!(client.extraction_graphs().version, 1);
    assert!(client.extraction_graphs().graph("kb").is_none());

    let second = client.refresh().await.unwrap();
    assert_eq!(second.version, 2);
    assert!(second.graph("kb").is_some());

    // Earlier snapshots are untouched by later refreshes
    assert!(first.graphs.is_empty());

    let before = transport.call_count();
    let _ = client.extraction_graphs();
    assert_eq!(transport.call_count(), before);
}

// =============================================================================
// Ingestion
// =============================================================================

#[tokio::test]
async fn test_add_documents_one_id_per_graph_and_document() {
    let transport = MockTransport::new()
        .on_sequence(
            Method::POST,
            "namespaces/default/extraction_graphs/kb/extract",
            vec![json!({"content_id": "kb-1"}), json!({"content_id": "kb-2"})],
        )
        .on_sequence(
            Method::POST,
            "namespaces/default/extraction_graphs/wiki/extract",
            vec![json!({"content_id": "wiki-1"}), json!({"content_id": "wiki-2"})],
        );

    let labels = HashMap::from([("topic".to_string(), "rust".to_string())]);
    let ids = client(&transport)
        .add_documents(
            &["kb", "wiki"],
            vec![Document::text("first"), Document::structured("second", labels)],
        )
        .await
        .unwrap();

    assert_eq!(ids, vec!["kb-1", "kb-2", "wiki-1", "wiki-2"]);

    let call = &transport.calls()[1];
    let RequestBody::Multipart(form) = &call.body else {
        panic!("expected multipart upload");
    };
    let sent: HashMap<String, String> = serde_json::from_str(form.field("labels").unwrap()).unwrap();
    assert_eq!(sent["mime_type"], "text/plain");
    assert_eq!(sent["topic"], "rust");
    assert_eq!(form.file.as_ref().unwrap().data, "second".as_bytes());
}

#[tokio::test]
async fn test_upload_without_content_id_is_incomplete() {
    let transport = MockTransport::new().on_json(
        Method::POST,
        "namespaces/default/extraction_graphs/kb/extract",
        json!({}),
    );
    let source = MemoryByteSource::new().with_blob("report.pdf", "%PDF-1.7");
    let client = client(&transport).with_byte_source(Arc::new(source));

    let err = client
        .upload_file(&["kb"], "report.pdf", &HashMap::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexifyError::IncompleteUpload { ref graph } if graph == "kb"));

    let id = client
        .upload_file(&["kb"], "report.pdf", &HashMap::new(), Some("my-id"))
        .await
        .unwrap();
    assert_eq!(id, "my-id");

    let last = transport.calls().pop().unwrap();
    assert_eq!(last.query.get("id"), Some("my-id"));
}

#[tokio::test]
async fn test_upload_missing_blob_is_io_error() {
    let transport = MockTransport::new();
    let client = client(&transport).with_byte_source(Arc::new(MemoryByteSource::new()));

    let err = client
        .upload_file(&["kb"], "missing.txt", &HashMap::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexifyError::Io(_)));
    assert_eq!(transport.call_count(), 0);
}

// =============================================================================
// Lineage
// =============================================================================

#[tokio::test]
async fn test_listed_content_resolves_to_single_root() {
    let transport = MockTransport::new().on_json(
        Method::GET,
        "namespaces/default/extraction_graphs/kb/content",
        json!({"content_list": [
            {"id": "doc", "parent_id": "", "source": "ingestion", "storage_url": "s3://bucket/doc",
             "extraction_graph_names": ["kb"]},
            {"id": "chunk-1", "parent_id": "doc", "root_content_id": "doc", "source": "c1",
             "extraction_graph_names": ["kb"]},
            {"id": "chunk-2", "parent_id": "doc", "root_content_id": "doc", "source": "c1",
             "extraction_graph_names": ["kb"]},
            {"id": "embed-1", "parent_id": "chunk-1", "root_content_id": "doc", "source": "c2",
             "storage_url": "https://cdn.example.com/embed-1", "extraction_graph_names": ["kb"]}
        ]}),
    );

    let page = client(&transport)
        .list_content(&ContentListQuery::for_graph("kb"))
        .await
        .unwrap();
    assert_eq!(page.total, None);

    let tree = ContentTree::from_nodes(page.content);
    for id in ["doc", "chunk-1", "chunk-2", "embed-1"] {
        assert_eq!(tree.root_of(id).unwrap().id, "doc");
    }
    assert!(tree.verify_lineage().is_empty());

    let descendants: Vec<_> = tree.descendants("doc").iter().map(|n| n.id.as_str()).collect();
    assert_eq!(descendants, vec!["chunk-1", "chunk-2", "embed-1"]);

    assert_eq!(
        tree.get("doc").unwrap().content_url.as_deref(),
        Some("http://localhost:8900/namespaces/default/content/doc/download")
    );
    assert_eq!(
        tree.get("embed-1").unwrap().content_url.as_deref(),
        Some("https://cdn.example.com/embed-1")
    );
}

#[tokio::test]
async fn test_extracted_content_filters_graph_and_policy() {
    let transport = MockTransport::new().on_json(
        Method::GET,
        "namespaces/default/extraction_graphs/kb/extraction_policies/c1/content/doc",
        json!({"content_tree_metadata": [
            {"id": "doc", "source": "ingestion", "extraction_graph_names": ["kb"]},
            {"id": "chunk-1", "parent_id": "doc", "source": "c1", "extraction_graph_names": ["kb"]},
            {"id": "chunk-x", "parent_id": "doc", "source": "c1", "extraction_graph_names": ["other"]},
            {"id": "embed-1", "parent_id": "chunk-1", "source": "c2", "extraction_graph_names": ["kb"]}
        ]}),
    );

    let found = client(&transport)
        .extracted_content("doc", "kb", "c1", false)
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "chunk-1");
    assert_eq!(found[0].root_content_id.as_deref(), Some("doc"));
}

#[tokio::test]
async fn test_unknown_listings_are_empty() {
    let transport = MockTransport::new()
        .on_error(
            Method::GET,
            "namespaces/default/extraction_graphs/kb/extraction_policies/c1/content/unknown",
            404,
            "content not found",
        )
        .on_error(
            Method::GET,
            "namespaces/default/extraction_graphs/kb/content",
            404,
            "graph not found",
        )
        .on_error(Method::GET, "namespaces/default/tasks", 404, "no tasks");
    let client = client(&transport);

    let found = client.extracted_content("unknown", "kb", "c1", false).await.unwrap();
    assert!(found.is_empty());

    let page = client
        .list_content(&ContentListQuery::for_graph("kb").with_total())
        .await
        .unwrap();
    assert!(page.content.is_empty());

    let tasks = client.list_tasks(&TaskFilter::for_content("unknown")).await.unwrap();
    assert!(tasks.tasks.is_empty());
}

#[tokio::test]
async fn test_listing_failures_other_than_not_found_propagate() {
    let transport = MockTransport::new().on_error(
        Method::GET,
        "namespaces/default/extraction_graphs/kb/extraction_policies/c1/content/doc",
        500,
        "boom",
    );

    let err = client(&transport)
        .extracted_content("doc", "kb", "c1", false)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexifyError::Transport(ref e) if e.status() == Some(500)));
}

// =============================================================================
// Completion
// =============================================================================

#[tokio::test]
async fn test_wait_aborts_on_failed_task() {
    let transport = MockTransport::new()
        .on_json(Method::GET, "namespaces/default/content/x/wait", json!({}))
        .on_json(Method::GET, "namespaces/default/content/y/wait", json!({}))
        .on_sequence(
            Method::GET,
            "namespaces/default/tasks",
            vec![
                json!({"tasks": [
                    {"id": "a", "extraction_policy_id": "c1", "content_id": "x", "outcome": "Success"},
                    {"id": "b", "extraction_policy_id": "c2", "content_id": "x", "outcome": "Unknown"}
                ]}),
                json!({"tasks": [
                    {"id": "a", "extraction_policy_id": "c1", "content_id": "x", "outcome": "Success"},
                    {"id": "b", "extraction_policy_id": "c2", "content_id": "x", "outcome": "Failed"}
                ]}),
            ],
        );

    let err = client(&transport)
        .wait_for_completion(&["x", "y"])
        .await
        .unwrap_err();

    match err {
        IndexifyError::TaskFailed {
            content_id,
            task_id,
            policy_id,
        } => {
            assert_eq!(content_id, "x");
            assert_eq!(task_id, "b");
            assert_eq!(policy_id, "c2");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(transport.calls_to("namespaces/default/content/x/wait").len(), 2);
    assert!(transport.calls_to("namespaces/default/content/y/wait").is_empty());

    let task_query = &transport.calls_to("namespaces/default/tasks")[0].query;
    assert_eq!(task_query.get("content_id"), Some("x"));
}

#[tokio::test]
async fn test_wait_surfaces_transport_failure() {
    let transport = MockTransport::new().on_error(
        Method::GET,
        "namespaces/default/content/x/wait",
        503,
        "unavailable",
    );

    let err = client(&transport).wait_for_completion(&["x"]).await.unwrap_err();
    assert!(matches!(
        err,
        IndexifyError::Transport(ref e) if e.status() == Some(503)
    ));
}

fn task_page(range: std::ops::Range<usize>, outcome: &str) -> serde_json::Value {
    let tasks: Vec<_> = range
        .map(|i| {
            json!({"id": format!("t-{i}"), "extraction_policy_id": "c1", "content_id": "x", "outcome": outcome})
        })
        .collect();
    json!({ "tasks": tasks })
}

#[tokio::test]
async fn test_wait_reads_every_task_page() {
    let transport = MockTransport::new()
        .on_json(Method::GET, "namespaces/default/content/x/wait", json!({}))
        .on_sequence(
            Method::GET,
            "namespaces/default/tasks",
            vec![
                task_page(0..100, "Success"),
                task_page(100..101, "Unknown"),
                task_page(0..100, "Success"),
                task_page(100..101, "Success"),
            ],
        );

    client(&transport).wait_for_completion(&["x"]).await.unwrap();

    // The pending task on the second page forces another round
    assert_eq!(transport.calls_to("namespaces/default/content/x/wait").len(), 2);

    let task_calls = transport.calls_to("namespaces/default/tasks");
    assert_eq!(task_calls.len(), 4);
    assert_eq!(task_calls[0].query.get("start_id"), None);
    assert_eq!(task_calls[1].query.get("start_id"), Some("t-99"));
    assert_eq!(task_calls[1].query.get("limit"), Some("100"));
    assert_eq!(task_calls[2].query.get("start_id"), None);
}

#[tokio::test]
async fn test_wait_with_no_tasks_resolves() {
    let transport = MockTransport::new()
        .on_json(Method::GET, "namespaces/default/content/x/wait", json!({}))
        .on_json(Method::GET, "namespaces/default/tasks", json!({"tasks": []}));

    client(&transport).wait_for_completion(&["x"]).await.unwrap();
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn test_ambiguous_label_fails_before_request() {
    let transport = MockTransport::new();
    let client = client(&transport);

    let query = ContentListQuery::for_graph("kb").with_label("note", "value:with:colon");
    let err = client.list_content(&query).await.unwrap_err();
    assert!(matches!(err, IndexifyError::Query(QueryError::AmbiguousLabel { .. })));

    let search = SearchRequest::new("kb.c2.embedding", "rust").with_filter("note", "a,b");
    let err = client.search_index(&search).await.unwrap_err();
    assert!(matches!(err, IndexifyError::Query(QueryError::AmbiguousLabel { .. })));

    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_escaped_labels_are_sent() {
    let transport = MockTransport::new().on_json(
        Method::GET,
        "namespaces/default/extraction_graphs/kb/content",
        json!({"content_list": [], "total": 0}),
    );
    let client = IndexifyClient::with_transport(
        config().with_label_encoding(LabelEncoding::Escaped),
        transport.clone(),
    );

    let query = ContentListQuery::for_graph("kb")
        .with_label("note", "value:with:colon")
        .with_total();
    let page = client.list_content(&query).await.unwrap();
    assert_eq!(page.total, Some(0));

    let sent = &transport.calls()[0].query;
    assert_eq!(sent.get_all("labels_eq"), vec!["note:value%3Awith%3Acolon"]);
    assert_eq!(sent.get("return_total"), Some("true"));
}

#[tokio::test]
async fn test_search_request_body() {
    let transport = MockTransport::new().on_json(
        Method::POST,
        "namespaces/default/indexes/kb.c2.embedding/search",
        json!({"results": [{"content_id": "chunk-1", "text": "hello", "confidence_score": 0.9,
                            "labels": {"topic": "rust"}}]}),
    );

    let hits = client(&transport)
        .search_index(&SearchRequest::new("kb.c2.embedding", "hello").with_filter("topic", "rust"))
        .await
        .unwrap();
    assert_eq!(hits[0].content_id, "chunk-1");

    let body = transport.calls()[0].json().cloned().unwrap();
    assert_eq!(body["k"], 3);
    assert_eq!(body["filters"], json!(["topic:rust"]));
    assert_eq!(body["include_content"], true);
}
