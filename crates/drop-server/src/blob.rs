//! Filesystem-backed [`BlobStore`].
//!
//! Locators are relative `/`-separated paths under a fixed root. Anything
//! that could escape the root is rejected before touching the filesystem.

use std::{
  io,
  path::{Path, PathBuf},
};

use async_trait::async_trait;
use bytes::Bytes;
use drop_core::blob::{BlobError, BlobMetadata, BlobObject, BlobStore};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

#[derive(Debug, Clone)]
pub struct FsBlobStore {
  root: PathBuf,
}

impl FsBlobStore {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  pub fn root(&self) -> &Path { &self.root }

  fn resolve(&self, locator: &str) -> Result<PathBuf, BlobError> {
    let invalid = || BlobError::InvalidLocator(locator.to_owned());
    if locator.is_empty() || locator.starts_with('/') || locator.contains('\\') {
      return Err(invalid());
    }
    let mut path = self.root.clone();
    for segment in locator.split('/') {
      if segment.is_empty() || segment == "." || segment == ".." {
        return Err(invalid());
      }
      path.push(segment);
    }
    Ok(path)
  }
}

#[async_trait]
impl BlobStore for FsBlobStore {
  async fn get(&self, locator: &str) -> Result<Option<BlobObject>, BlobError> {
    let path = self.resolve(locator)?;
    let file = match tokio::fs::File::open(&path).await {
      Ok(f) => f,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };
    let meta = file.metadata().await?;
    if !meta.is_file() {
      return Ok(None);
    }
    Ok(Some(BlobObject {
      size:   meta.len(),
      stream: Box::pin(ReaderStream::new(file)),
    }))
  }

  async fn put(
    &self,
    locator: &str,
    bytes: Bytes,
    _metadata: BlobMetadata,
  ) -> Result<(), BlobError> {
    let path = self.resolve(locator)?;
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(&path).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    tracing::debug!(locator, size = bytes.len(), "blob stored");
    Ok(())
  }
}
