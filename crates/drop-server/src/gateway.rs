//! Asset Access Gateway: decides whether a download may proceed and opens it.
//!
//! Authorization is settled before the blob is opened. The returned stream
//! holds no store handle.

use std::sync::Arc;

use drop_core::{
  blob::{BlobStore, BlobStream},
  bundle::Asset,
  store::DropStore,
};
use uuid::Uuid;

use crate::{error::Error, ledger::EntitlementLedger};

/// An asset the caller may download.
#[derive(Debug, Clone)]
pub struct AuthorizedAsset {
  pub asset:        Asset,
  pub bundle_title: String,
}

/// An opened download, ready to be streamed to the client.
pub struct AssetDownload {
  pub filename:     String,
  pub content_type: String,
  pub size:         u64,
  pub stream:       BlobStream,
}

pub struct AssetGateway<S> {
  store:  Arc<S>,
  ledger: EntitlementLedger<S>,
  blobs:  Arc<dyn BlobStore>,
}

impl<S> Clone for AssetGateway<S> {
  fn clone(&self) -> Self {
    Self {
      store:  self.store.clone(),
      ledger: self.ledger.clone(),
      blobs:  self.blobs.clone(),
    }
  }
}

impl<S> AssetGateway<S>
where
  S: DropStore,
{
  pub fn new(
    store: Arc<S>,
    ledger: EntitlementLedger<S>,
    blobs: Arc<dyn BlobStore>,
  ) -> Self {
    Self { store, ledger, blobs }
  }

  /// Decide whether `user_id` (or an anonymous caller) may fetch `asset_id`.
  ///
  /// An unknown asset is denied exactly like a gated one the caller may not
  /// fetch: `Unauthenticated` for anonymous callers, `Forbidden` otherwise.
  pub async fn authorize_download(
    &self,
    user_id: Option<Uuid>,
    asset_id: Uuid,
  ) -> Result<AuthorizedAsset, Error> {
    let Some(asset) = self.store.get_asset(asset_id).await.map_err(Error::store)? else {
      return Err(denied(user_id));
    };

    if asset.kind.requires_entitlement() {
      let user_id = user_id.ok_or_else(|| denied(None))?;
      if !self.ledger.is_unlocked(user_id, asset.bundle_id).await? {
        tracing::debug!(
          user_id = %user_id,
          asset_id = %asset_id,
          bundle_id = %asset.bundle_id,
          "download denied"
        );
        return Err(Error::Forbidden);
      }
    }

    let bundle_title = self
      .store
      .get_bundle(asset.bundle_id)
      .await
      .map_err(Error::store)?
      .map(|b| b.title)
      .unwrap_or_default();

    Ok(AuthorizedAsset { asset, bundle_title })
  }

  /// Open the blob behind an authorized asset.
  pub async fn open(&self, authorized: AuthorizedAsset) -> Result<AssetDownload, Error> {
    let AuthorizedAsset { asset, bundle_title } = authorized;
    let Some(object) = self.blobs.get(&asset.locator).await.map_err(Error::store)? else {
      tracing::warn!(asset_id = %asset.asset_id, "asset blob missing");
      return Err(Error::NotFound);
    };

    Ok(AssetDownload {
      filename:     download_filename(&bundle_title, &asset),
      content_type: asset.content_type,
      size:         object.size,
      stream:       object.stream,
    })
  }

  /// Authorize and open in one step.
  pub async fn download(
    &self,
    user_id: Option<Uuid>,
    asset_id: Uuid,
  ) -> Result<AssetDownload, Error> {
    let authorized = self.authorize_download(user_id, asset_id).await?;
    self.open(authorized).await
  }
}

/// The refusal for a caller who may not fetch a gated or unknown asset.
pub fn denied(user_id: Option<Uuid>) -> Error {
  match user_id {
    Some(_) => Error::Forbidden,
    None => Error::Unauthenticated,
  }
}

/// `<stem>-<kind><.ext>`: the bundle title reduced to ASCII alphanumerics
/// (or `drop`), the asset kind, and the locator's extension when it is
/// purely alphanumeric.
pub fn download_filename(title: &str, asset: &Asset) -> String {
  let stem: String = title.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
  let stem = if stem.is_empty() { "drop".to_string() } else { stem };

  let file = asset.locator.rsplit('/').next().unwrap_or_default();
  let ext = file
    .rsplit_once('.')
    .map(|(_, ext)| ext)
    .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    .map(|ext| format!(".{ext}"))
    .unwrap_or_default();

  format!("{stem}-{}{ext}", asset.kind)
}
