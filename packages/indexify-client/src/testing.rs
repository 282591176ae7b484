//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the client without a
//! running Indexify service.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use crate::error::{TransportError, TransportResult};
use crate::query::QueryParams;
use crate::transport::{ApiRequest, ApiResponse, RequestBody, Transport};

pub use crate::content::MemoryByteSource;

type Script = TransportResult<ApiResponse>;

/// A scripted transport.
///
/// Responses are registered per method and path. A path with several
/// scripted responses replays them in order and then keeps returning the
/// last one. Requests nobody scripted get a 404.
///
/// Clones share scripts and the call log.
#[derive(Clone, Default)]
pub struct MockTransport {
    scripts: Arc<RwLock<HashMap<(Method, String), VecDeque<Script>>>>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockCall>>>,
}

/// Record of a request made to the mock transport.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub method: Method,
    pub path: String,
    pub query: QueryParams,
    pub body: RequestBody,
}

impl MockCall {
    /// JSON body, if the request carried one.
    pub fn json(&self) -> Option<&serde_json::Value> {
        match &self.body {
            RequestBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a response for `method path`.
    pub fn push(&self, method: Method, path: impl Into<String>, response: Script) {
        self.scripts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry((method, path.into()))
            .or_default()
            .push_back(response);
    }

    /// Respond with a 200 JSON body.
    pub fn on_json(self, method: Method, path: impl Into<String>, body: serde_json::Value) -> Self {
        self.push(method, path, Ok(ApiResponse::json_ok(body)));
        self
    }

    /// Respond with raw bytes.
    pub fn on_bytes(self, method: Method, path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.push(method, path, Ok(ApiResponse::new(200, body)));
        self
    }

    /// Respond with an API error.
    pub fn on_error(self, method: Method, path: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        self.push(
            method,
            path,
            Err(TransportError::Api {
                status,
                message: message.into(),
            }),
        );
        self
    }

    /// Fail with a network error.
    pub fn on_network_error(self, method: Method, path: impl Into<String>, message: impl Into<String>) -> Self {
        self.push(method, path, Err(TransportError::Network(message.into())));
        self
    }

    /// Respond with each JSON body in turn, repeating the last.
    pub fn on_sequence(self, method: Method, path: impl Into<String>, bodies: Vec<serde_json::Value>) -> Self {
        let path = path.into();
        for body in bodies {
            self.push(method.clone(), path.clone(), Ok(ApiResponse::json_ok(body)));
        }
        self
    }

    /// Every request received, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Requests made to `path`, any method.
    pub fn calls_to(&self, path: &str) -> Vec<MockCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn next_response(&self, method: &Method, path: &str) -> Script {
        let mut scripts = self.scripts.write().unwrap_or_else(|e| e.into_inner());
        let Some(queue) = scripts.get_mut(&(method.clone(), path.to_string())) else {
            return Err(TransportError::Api {
                status: 404,
                message: format!("no scripted response for {method} {path}"),
            });
        };

        if queue.len() > 1 {
            if let Some(next) = queue.pop_front() {
                return next;
            }
        }
        match queue.front() {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(e)) => Err(clone_error(e)),
            None => Err(TransportError::Api {
                status: 404,
                message: format!("no scripted response for {method} {path}"),
            }),
        }
    }
}

fn clone_error(error: &TransportError) -> TransportError {
    match error {
        TransportError::Network(m) => TransportError::Network(m.clone()),
        TransportError::Api { status, message } => TransportError::Api {
            status: *status,
            message: message.clone(),
        },
        TransportError::Decode(m) => TransportError::Decode(m.clone()),
        TransportError::InvalidRequest(m) => TransportError::InvalidRequest(m.clone()),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, request: ApiRequest) -> TransportResult<ApiResponse> {
        let response = self.next_response(&request.method, &request.path);
        self.calls
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockCall {
                method: request.method,
                path: request.path,
                query: request.query,
                body: request.body,
            });
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequence_repeats_last() {
        let transport = MockTransport::new().on_sequence(
            Method::GET,
            "namespaces/default/tasks",
            vec![serde_json::json!({"n": 1}), serde_json::json!({"n": 2})],
        );

        let mut seen = Vec::new();
        for _ in 0..3 {
            let response = transport
                .request(ApiRequest::get("namespaces/default/tasks"))
                .await
                .unwrap();
            seen.push(response.json::<serde_json::Value>().unwrap()["n"].clone());
        }

        assert_eq!(seen, vec![1, 2, 2]);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_unscripted_is_not_found() {
        let transport = MockTransport::new();
        let err = transport.request(ApiRequest::get("nowhere")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(transport.calls_to("nowhere").len(), 1);
    }

    #[tokio::test]
    async fn test_method_is_part_of_the_key() {
        let transport = MockTransport::new().on_json(Method::POST, "namespaces", serde_json::json!({}));
        assert!(transport.request(ApiRequest::get("namespaces")).await.is_err());
        assert!(transport.request(ApiRequest::post("namespaces")).await.is_ok());
    }
}
