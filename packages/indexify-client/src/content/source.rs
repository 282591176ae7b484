//! Byte sources for uploads and TLS material.
//!
//! Reading a local reference differs by environment: a native process reads
//! the filesystem, a sandboxed or embedded host hands over blobs it already
//! holds. The client is given one [`ByteSource`] when it is built and never
//! checks the environment again.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::error::{IndexifyError, Result};

/// Produces bytes for a local reference (a path, or a blob name).
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Read the whole referenced object.
    async fn read(&self, reference: &str) -> Result<Bytes>;

    /// File name to report in multipart uploads.
    fn file_name(&self, reference: &str) -> String {
        Path::new(reference)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(reference)
            .to_string()
    }

    /// Whether references resolve against the local filesystem.
    fn reads_filesystem(&self) -> bool;
}

/// Reads references as filesystem paths.
#[derive(Debug, Clone, Default)]
pub struct FileSystemSource;

#[async_trait]
impl ByteSource for FileSystemSource {
    async fn read(&self, reference: &str) -> Result<Bytes> {
        let data = tokio::fs::read(reference).await?;
        Ok(Bytes::from(data))
    }

    fn reads_filesystem(&self) -> bool {
        true
    }
}

/// Serves named in-memory blobs. Has no filesystem access.
#[derive(Debug, Clone, Default)]
pub struct MemoryByteSource {
    blobs: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryByteSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blob under `name`.
    pub fn insert(&self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), data.into());
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_blob(self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.insert(name, data);
        self
    }
}

#[async_trait]
impl ByteSource for MemoryByteSource {
    async fn read(&self, reference: &str) -> Result<Bytes> {
        self.blobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(reference)
            .cloned()
            .ok_or_else(|| {
                IndexifyError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no blob named `{reference}`"),
                ))
            })
    }

    fn file_name(&self, reference: &str) -> String {
        reference.to_string()
    }

    fn reads_filesystem(&self) -> bool {
        false
    }
}
