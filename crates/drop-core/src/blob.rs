//! The blob-store collaborator that holds asset bytes.
//!
//! Objects are addressed by an opaque relative locator. Reads hand back a
//! byte stream so callers never buffer an asset in memory.

use std::{io, pin::Pin};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;

/// A stream of object chunks.
pub type BlobStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// An object opened for reading.
pub struct BlobObject {
  /// Length in bytes as reported by the backend.
  pub size:   u64,
  pub stream: BlobStream,
}

/// Metadata accompanying a write.
#[derive(Debug, Clone, Default)]
pub struct BlobMetadata {
  pub content_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum BlobError {
  #[error("invalid locator: {0:?}")]
  InvalidLocator(String),

  #[error("io error: {0}")]
  Io(#[from] io::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
  /// Open `locator` for streaming. Returns `None` if no object exists.
  async fn get(&self, locator: &str) -> Result<Option<BlobObject>, BlobError>;

  /// Store `bytes` under `locator`, replacing any previous object.
  async fn put(
    &self,
    locator: &str,
    bytes: Bytes,
    metadata: BlobMetadata,
  ) -> Result<(), BlobError>;
}
