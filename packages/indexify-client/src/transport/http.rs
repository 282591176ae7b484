//! `reqwest`-backed transport.

use async_trait::async_trait;
use reqwest::{multipart, Certificate, Client, Identity};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{ApiRequest, ApiResponse, MultipartForm, RequestBody, Transport};
use crate::content::ByteSource;
use crate::error::{IndexifyError, Result, TransportError, TransportResult};

/// Client certificate material for mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM certificate presented to the service
    pub cert_path: String,
    /// PEM private key for the certificate
    pub key_path: String,
    /// Extra PEM root, for services signed by a private CA
    #[serde(default)]
    pub ca_path: Option<String>,
}

impl TlsConfig {
    pub fn new(cert_path: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            ca_path: None,
        }
    }

    pub fn with_ca(mut self, ca_path: impl Into<String>) -> Self {
        self.ca_path = Some(ca_path.into());
        self
    }
}

/// Sends requests to the service over HTTP(S).
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Plain HTTP(S) transport.
    pub fn new(service_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexifyError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: service_url.into(),
        })
    }

    /// Transport presenting a client certificate.
    ///
    /// The PEM files are read through `source`; a source without filesystem
    /// access cannot supply them.
    pub async fn with_tls(
        service_url: impl Into<String>,
        timeout: Duration,
        tls: &TlsConfig,
        source: &dyn ByteSource,
    ) -> Result<Self> {
        if !source.reads_filesystem() {
            return Err(IndexifyError::UnsupportedEnvironment(
                "mutual TLS needs filesystem access to read certificates".into(),
            ));
        }

        let mut pem = source.read(&tls.cert_path).await?.to_vec();
        pem.push(b'\n');
        pem.extend_from_slice(&source.read(&tls.key_path).await?);
        let identity = Identity::from_pem(&pem)
            .map_err(|e| IndexifyError::Config(format!("invalid client certificate: {e}")))?;

        let mut builder = Client::builder().use_rustls_tls().timeout(timeout).identity(identity);
        if let Some(ca_path) = &tls.ca_path {
            let ca = source.read(ca_path).await?;
            let root = Certificate::from_pem(&ca)
                .map_err(|e| IndexifyError::Config(format!("invalid CA certificate: {e}")))?;
            builder = builder.add_root_certificate(root);
        }

        let client = builder
            .build()
            .map_err(|e| IndexifyError::Config(format!("failed to build TLS client: {e}")))?;

        Ok(Self {
            client,
            base_url: service_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn form(form: MultipartForm) -> TransportResult<multipart::Form> {
        let mut out = multipart::Form::new();
        for (name, value) in form.fields {
            out = out.text(name, value);
        }
        if let Some(file) = form.file {
            let mut part = multipart::Part::bytes(file.data.to_vec()).file_name(file.file_name);
            if let Some(mime) = file.mime_type {
                part = part
                    .mime_str(&mime)
                    .map_err(|e| TransportError::InvalidRequest(format!("invalid MIME type `{mime}`: {e}")))?;
            }
            out = out.part("file", part);
        }
        Ok(out)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: ApiRequest) -> TransportResult<ApiResponse> {
        let start = Instant::now();
        let url = self.url(&request.path);
        let method = request.method.clone();

        let mut builder = self
            .client
            .request(request.method, &url)
            .query(request.query.pairs());
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(form) => builder
                .header(reqwest::header::ACCEPT, "*/*")
                .multipart(Self::form(form)?),
        };

        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, %method, url = %url, "Indexify request failed");
            TransportError::Network(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = %status, %method, url = %url, error = %message, "Indexify API error");
            return Err(TransportError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        debug!(
            %method,
            url = %url,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis(),
            "Indexify request"
        );

        Ok(ApiResponse {
            status: status.as_u16(),
            body,
        })
    }
}
