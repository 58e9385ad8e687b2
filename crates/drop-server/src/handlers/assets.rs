//! Asset downloads.

use axum::{
  body::Body,
  extract::{Path, State},
  http::{HeaderMap, HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use drop_core::store::DropStore;
use uuid::Uuid;

use crate::{AppState, auth::MaybeAuthenticated, error::Error, gateway};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// `GET /assets/{asset_id}/download`
///
/// Malformed ids are refused like unknown ones.
pub async fn download<S>(
  State(state): State<AppState<S>>,
  MaybeAuthenticated(identity): MaybeAuthenticated,
  Path(asset_id): Path<String>,
) -> Result<Response, Error>
where
  S: DropStore + 'static,
{
  let user_id = identity.map(|i| i.user.user_id);
  let asset_id = Uuid::parse_str(&asset_id).map_err(|_| gateway::denied(user_id))?;

  let download = state.gateway.download(user_id, asset_id).await?;
  tracing::info!(
    asset_id = %asset_id,
    user_id = ?user_id,
    size = download.size,
    "download started"
  );

  let mut headers = HeaderMap::new();
  headers.insert(
    header::CONTENT_TYPE,
    HeaderValue::from_str(&download.content_type)
      .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE)),
  );
  headers.insert(header::CONTENT_LENGTH, HeaderValue::from(download.size));
  let disposition = format!("attachment; filename=\"{}\"", download.filename);
  headers.insert(
    header::CONTENT_DISPOSITION,
    HeaderValue::from_str(&disposition)
      .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
  );

  let body = Body::from_stream(download.stream);
  Ok((StatusCode::OK, headers, body).into_response())
}
