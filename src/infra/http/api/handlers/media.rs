//! Media served from the local storage directory.

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::application::assets::AssetStoreError;
use crate::application::media::JPEG_CONTENT_TYPE;
use crate::infra::http::api::error::{ApiError, codes};
use crate::infra::http::api::state::ApiState;

const SOURCE: &str = "infra::http::api::media";

fn media_not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, "Media not found", None)
}

pub async fn serve_media(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let Some(store) = state.media.as_ref() else {
        return Err(media_not_found());
    };

    match store.read(&key).await {
        Ok(bytes) => Ok((
            [
                (header::CONTENT_TYPE, JPEG_CONTENT_TYPE),
                (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
            ],
            bytes,
        )
            .into_response()),
        Err(AssetStoreError::Missing(_)) => Err(media_not_found()),
        Err(err) => {
            error!(target = SOURCE, key = %key, error = %err, "failed to read stored media");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "Failed to read media",
                None,
            ))
        }
    }
}
