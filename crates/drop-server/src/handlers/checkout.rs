//! Checkout endpoints: both answer with the provider URL to redirect to.

use axum::{
  Json,
  extract::{Path, State},
};
use drop_core::store::DropStore;
use serde::Serialize;
use uuid::Uuid;

use crate::{AppState, auth::Authenticated, error::Error};

#[derive(Serialize)]
pub struct Redirect {
  pub redirect_url: String,
}

/// `POST /checkout/subscription`
pub async fn subscription<S>(
  State(state): State<AppState<S>>,
  Authenticated(identity): Authenticated,
) -> Result<Json<Redirect>, Error>
where
  S: DropStore + 'static,
{
  let redirect_url = state.checkout.create_subscription_intent(&identity.user).await?;
  Ok(Json(Redirect { redirect_url }))
}

/// `POST /checkout/one-off/{bundle_id}`
pub async fn one_off<S>(
  State(state): State<AppState<S>>,
  Authenticated(identity): Authenticated,
  Path(bundle_id): Path<String>,
) -> Result<Json<Redirect>, Error>
where
  S: DropStore + 'static,
{
  let bundle_id = Uuid::parse_str(&bundle_id).map_err(|_| Error::NotFound)?;
  let redirect_url = state
    .checkout
    .create_one_off_intent(&identity.user, bundle_id)
    .await?;
  Ok(Json(Redirect { redirect_url }))
}
