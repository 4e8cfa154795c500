//! Profile endpoints: POST /profile/{tag}, GET /profile/{tag}
//!
//! - `POST` takes a `multipart/form-data` body with a single `cpu_profile`
//!   part and streams it straight into the store.
//! - `GET` streams the stored profile back as `default.pgo`.
//! - Anything else on `/profile` is a 400.

use axum::{
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::{StreamExt, TryStreamExt};
use pgo_store::{StoreError, Tag};
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::extract::RemoteAddr;
use crate::state::AppState;

/// The only multipart field an upload may carry.
pub const PROFILE_FIELD: &str = "cpu_profile";

/// Filename suggested to clients downloading a profile.
pub const DOWNLOAD_FILENAME: &str = "default.pgo";

/// POST /profile/{tag} - Store the uploaded profile under `tag`
pub async fn upload_profile(
    State(state): State<AppState>,
    remote: RemoteAddr,
    Path(tag): Path<String>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<StatusCode> {
    let tag = parse_tag(&remote, tag)?;
    let mut multipart = multipart.map_err(|e| {
        info!(remote = %remote, tag = %tag, error = %e, "Upload is not multipart");
        AppError::bad_request(e.body_text())
    })?;

    let mut stored = false;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name != PROFILE_FIELD {
            info!(remote = %remote, tag = %tag, part = %name, "Unrecognized upload part");
            return Err(AppError::bad_request(format!("Unrecognized file: {name}")));
        }
        if stored {
            info!(remote = %remote, tag = %tag, "Duplicate upload part");
            return Err(AppError::bad_request(format!("Duplicate file: {name}")));
        }

        let profile = field.map_err(std::io::Error::other).boxed();
        state
            .store
            .put(&tag, profile)
            .await
            .map_err(|e| storage_failure(&remote, &tag, e))?;
        stored = true;
    }

    if !stored {
        info!(remote = %remote, tag = %tag, "Upload without profile part");
        return Err(AppError::bad_request(format!("Missing file: {PROFILE_FIELD}")));
    }

    info!(remote = %remote, tag = %tag, "Profile stored");
    Ok(StatusCode::OK)
}

/// GET /profile/{tag} - Stream the stored profile for `tag`
pub async fn download_profile(
    State(state): State<AppState>,
    remote: RemoteAddr,
    Path(tag): Path<String>,
) -> Result<Response> {
    let tag = parse_tag(&remote, tag)?;

    let profile = match state.store.get(&tag).await {
        Ok(profile) => profile,
        Err(e) if e.is_not_found() => {
            info!(remote = %remote, tag = %tag, "Profile not found");
            return Err(AppError::from(e));
        }
        Err(e) => return Err(storage_failure(&remote, &tag, e)),
    };

    info!(remote = %remote, tag = %tag, "Serving profile");
    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={DOWNLOAD_FILENAME}"),
        ),
    ];
    Ok((headers, Body::from_stream(profile)).into_response())
}

/// GET or POST on /profile without a tag
pub async fn missing_tag(remote: RemoteAddr) -> AppError {
    info!(remote = %remote, "Request without tag");
    AppError::from(StoreError::EmptyTag)
}

/// Any other method on /profile
pub async fn wrong_method(remote: RemoteAddr, method: Method) -> AppError {
    info!(remote = %remote, method = %method, "Unsupported method");
    AppError::bad_request("Incorrect method, either POST or GET")
}

fn parse_tag(remote: &RemoteAddr, tag: String) -> Result<Tag> {
    Tag::new(tag).map_err(|e| {
        info!(remote = %remote, "Request without tag");
        AppError::from(e)
    })
}

fn storage_failure(remote: &RemoteAddr, tag: &Tag, err: StoreError) -> AppError {
    warn!(remote = %remote, tag = %tag, error = %err, "Profile store failure");
    AppError::Internal(err.to_string())
}
