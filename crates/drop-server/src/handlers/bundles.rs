//! Bundle listing.

use std::collections::HashMap;

use axum::{Json, extract::State};
use drop_core::{
  bundle::{Asset, ContentBundle},
  store::DropStore,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{AppState, auth::MaybeAuthenticated, error::Error};

#[derive(Serialize)]
pub struct BundleView {
  #[serde(flatten)]
  pub bundle:   ContentBundle,
  pub unlocked: bool,
  pub assets:   Vec<Asset>,
}

/// `GET /bundles`: every bundle, newest first, with its assets and whether
/// the caller has unlocked it.
pub async fn list<S>(
  State(state): State<AppState<S>>,
  MaybeAuthenticated(identity): MaybeAuthenticated,
) -> Result<Json<Vec<BundleView>>, Error>
where
  S: DropStore + 'static,
{
  let bundles = state.store.list_bundles().await.map_err(Error::store)?;

  let mut assets: HashMap<Uuid, Vec<Asset>> = HashMap::new();
  for asset in state.store.list_assets(None).await.map_err(Error::store)? {
    assets.entry(asset.bundle_id).or_default().push(asset);
  }

  let unlocked = match &identity {
    Some(identity) => state.ledger.unlocked_bundles(identity.user.user_id).await?,
    None => Default::default(),
  };

  let views = bundles
    .into_iter()
    .map(|bundle| BundleView {
      unlocked: unlocked.contains(&bundle.bundle_id),
      assets: assets.remove(&bundle.bundle_id).unwrap_or_default(),
      bundle,
    })
    .collect();
  Ok(Json(views))
}
