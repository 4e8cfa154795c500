//! HTTP routes
//!
//! ## Route Structure
//!
//! - `POST /profile/{tag}` - Upload a profile
//! - `GET /profile/{tag}` - Download a profile
//! - `/profile` and `/profile/` answer 400 "No tag supplied"
//!
//! Every other method on these paths answers 400.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{MethodRouter, get},
};

use crate::state::AppState;

pub mod profile;

/// Create the profile router.
///
/// Uploads are streamed into the store, so the default body limit is lifted.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/profile", tagless())
        .route("/profile/", tagless())
        .route(
            "/profile/{*tag}",
            get(profile::download_profile)
                .post(profile::upload_profile)
                .fallback(profile::wrong_method),
        )
        .layer(DefaultBodyLimit::disable())
}

fn tagless() -> MethodRouter<AppState> {
    get(profile::missing_tag)
        .post(profile::missing_tag)
        .fallback(profile::wrong_method)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use pgo_store::{InMemoryProfileStore, ProfileStore, Tag, bytes_stream};
    use tower::ServiceExt;

    use super::*;

    fn app(store: Arc<dyn ProfileStore>) -> Router {
        create_router().with_state(AppState::new(store))
    }

    async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_tagless_paths_are_bad_requests() {
        let store: Arc<dyn ProfileStore> = Arc::new(InMemoryProfileStore::new());

        for uri in ["/profile", "/profile/"] {
            for method in [Method::GET, Method::POST] {
                let (status, body) = send(app(Arc::clone(&store)), method, uri).await;
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "No tag supplied");
            }
        }
    }

    #[tokio::test]
    async fn test_other_methods_are_bad_requests() {
        let store: Arc<dyn ProfileStore> = Arc::new(InMemoryProfileStore::new());

        for uri in ["/profile/svc", "/profile/"] {
            for method in [Method::PUT, Method::DELETE, Method::PATCH] {
                let (status, body) = send(app(Arc::clone(&store)), method, uri).await;
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "Incorrect method, either POST or GET");
            }
        }
    }

    #[tokio::test]
    async fn test_get_streams_stored_profile() {
        let store: Arc<dyn ProfileStore> = Arc::new(InMemoryProfileStore::new());
        let tag = Tag::new("svc").unwrap();
        store.put(&tag, bytes_stream(&b"pprof"[..])).await.unwrap();

        let response = app(store)
            .oneshot(Request::get("/profile/svc").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=default.pgo"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"pprof");
    }

    #[tokio::test]
    async fn test_escaped_tag_is_decoded() {
        let store: Arc<dyn ProfileStore> = Arc::new(InMemoryProfileStore::new());
        let tag = Tag::new("a b/c").unwrap();
        store.put(&tag, bytes_stream(&b"escaped"[..])).await.unwrap();

        let (status, body) = send(app(store), Method::GET, "/profile/a%20b%2Fc").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "escaped");
    }

    #[tokio::test]
    async fn test_unknown_tag_is_not_found() {
        let store: Arc<dyn ProfileStore> = Arc::new(InMemoryProfileStore::new());

        let (status, body) = send(app(store), Method::GET, "/profile/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "no profile for given tag: missing");
    }
}
