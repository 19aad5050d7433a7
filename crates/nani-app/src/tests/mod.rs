use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, header};
use nani_config::Config;
use nani_translator::CompletionBackend;
use serde_json::Value;
use tower::ServiceExt;

use crate::server::router;
use crate::state::AppState;


pub fn app(backend: Arc<dyn CompletionBackend>) -> (Arc<AppState>, Router) {
    let state = Arc::new(AppState::new(Config::default(), backend));
    let router = router(state.clone(), 1024 * 1024);
    (state, router)
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    tokio::time::timeout(Duration::from_secs(2), router.clone().oneshot(request))
        .await
        .expect("request timed out")
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = tokio::time::timeout(
        Duration::from_secs(2),
        to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("body timed out")
    .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
