//! Subscription Manager Service — a thin axum HTTP facade over the
//! `SubscriptionStore` (spec §4.C).
//!
//! This module performs no business logic beyond encoding and status-code
//! mapping, grounded on the `AppState`/`Router` idiom used by the pack's
//! closest real axum service
//! (`examples/other_examples/..._converge-server.rs.rs`).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::warn;

use crate::error::StoreError;
use crate::record::{NewRecordDetails, Record};
use crate::store::SubscriptionStore;

/// Shared application state: just the store, behind an `Arc` so it's cheap
/// to clone into each axum handler (the store serializes its own writes
/// internally; no extra lock is needed here).
#[derive(Clone)]
pub struct AppState {
    store: Arc<SubscriptionStore>,
}

impl AppState {
    pub fn new(store: Arc<SubscriptionStore>) -> Self {
        Self { store }
    }
}

#[derive(Serialize)]
struct ListResponse {
    subscriptions: Vec<Record>,
}

/// Build the `/v1` router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/subscriptions",
            get(list_subscriptions),
        )
        .route(
            "/v1/subscriptions/:id",
            get(get_subscription)
                .put(create_subscription)
                .delete(delete_subscription),
        )
        .with_state(state)
}

async fn list_subscriptions(State(state): State<AppState>) -> Response {
    let ids = match state.store.list_identifiers().await {
        Ok(ids) => ids,
        Err(e) => return store_error_response(e),
    };

    let mut subscriptions = Vec::with_capacity(ids.len());
    for id in ids {
        match state.store.get(&id).await {
            Ok(record) => subscriptions.push(record),
            Err(e) => return store_error_response(e),
        }
    }

    Json(ListResponse { subscriptions }).into_response()
}

async fn get_subscription(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.get(&id).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn create_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(details): Json<NewRecordDetails>,
) -> Response {
    match state.store.create(&id, details).await {
        Ok(_) => StatusCode::CREATED.into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn delete_subscription(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.deactivate(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error_response(e),
    }
}

/// Map a store error to a bare status code with no body (spec §7: "the
/// subscription-manager service surfaces errors as HTTP status codes with
/// no body").
fn store_error_response(err: StoreError) -> Response {
    let status = match &err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
        StoreError::Exhausted => StatusCode::INTERNAL_SERVER_ERROR,
        StoreError::SerializationError(_) | StoreError::Io(_) | StoreError::RootMissing(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!("subscription manager service error: {}", err);
    }
    status.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn make_state(dir: &TempDir) -> AppState {
        let store = SubscriptionStore::open(dir.path()).unwrap();
        AppState::new(Arc::new(store))
    }

    #[tokio::test]
    async fn put_then_get_returns_created_record() {
        let dir = TempDir::new().unwrap();
        let app = router(make_state(&dir));

        let details = NewRecordDetails {
            customer_id: "cust-1".to_string(),
            product_id: "prod-1".to_string(),
            customer_email: "a@example.com".to_string(),
            bucket_name: "bucket-1".to_string(),
            old_secrets: serde_json::json!({}),
        };
        let body = serde_json::to_vec(&details).unwrap();

        let put_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v1/subscriptions/sub-a")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(put_response.status(), StatusCode::CREATED);

        let get_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/v1/subscriptions/sub-a")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(get_response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn duplicate_put_returns_conflict() {
        let dir = TempDir::new().unwrap();
        let app = router(make_state(&dir));

        let details = NewRecordDetails {
            customer_id: "cust-1".to_string(),
            product_id: "prod-1".to_string(),
            customer_email: "a@example.com".to_string(),
            bucket_name: "bucket-1".to_string(),
            old_secrets: serde_json::json!({}),
        };
        let body = serde_json::to_vec(&details).unwrap();

        for _ in 0..2 {
            app.clone()
                .oneshot(
                    Request::builder()
                        .method("PUT")
                        .uri("/v1/subscriptions/sub-a")
                        .header("content-type", "application/json")
                        .body(Body::from(body.clone()))
                        .unwrap(),
                )
                .await
                .unwrap();
        }

        let second = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v1/subscriptions/sub-a")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn get_unknown_returns_not_found() {
        let dir = TempDir::new().unwrap();
        let app = router(make_state(&dir));

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/v1/subscriptions/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_unknown_returns_not_found() {
        let dir = TempDir::new().unwrap();
        let app = router(make_state(&dir));

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/v1/subscriptions/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_only_shows_active_subscriptions() {
        let dir = TempDir::new().unwrap();
        let app = router(make_state(&dir));

        let details = NewRecordDetails {
            customer_id: "cust-1".to_string(),
            product_id: "prod-1".to_string(),
            customer_email: "a@example.com".to_string(),
            bucket_name: "bucket-1".to_string(),
            old_secrets: serde_json::json!({}),
        };
        let body = serde_json::to_vec(&details).unwrap();

        app.clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v1/subscriptions/sub-a")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        app.clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/v1/subscriptions/sub-a")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let list_response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/v1/subscriptions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(list_response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(list_response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(parsed["subscriptions"].as_array().unwrap().is_empty());
    }
}
