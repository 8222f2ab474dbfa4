//! Liveness and readiness endpoints for the ops listener.
//!
//! - `GET /health` - Liveness probe (is the process running?)
//! - `GET /ready` - Readiness probe (are we accepting WebSocket peers?)
//!
//! Readiness is raised once the signaling listener is bound and dropped as
//! soon as shutdown begins, before rooms are drained.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Probe state shared between `main` and the ops router.
#[derive(Debug)]
pub struct HealthState {
    live: AtomicBool,
    ready: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Live, not yet ready.
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Stop advertising readiness (shutdown has begun).
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Serialize)]
struct ProbeBody {
    status: &'static str,
}

/// Router with `/health` and `/ready`.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn liveness_handler(State(state): State<Arc<HealthState>>) -> (StatusCode, Json<ProbeBody>) {
    probe(state.is_live(), "alive", "dead")
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> (StatusCode, Json<ProbeBody>) {
    probe(state.is_ready(), "ready", "not_ready")
}

fn probe(ok: bool, up: &'static str, down: &'static str) -> (StatusCode, Json<ProbeBody>) {
    if ok {
        (StatusCode::OK, Json(ProbeBody { status: up }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ProbeBody { status: down }),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    async fn get_status(app: Router, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");
        let response = app.oneshot(request).await.expect("Failed to execute request");
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_health_state_transitions() {
        let state = HealthState::new();
        assert!(state.is_live());
        assert!(!state.is_ready());

        state.set_ready();
        assert!(state.is_ready());

        state.set_not_ready();
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn test_liveness_endpoint() {
        let app = health_router(Arc::new(HealthState::new()));
        let (status, body) = get_status(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"alive"}"#);
    }

    #[tokio::test]
    async fn test_readiness_follows_state() {
        let state = Arc::new(HealthState::new());

        let (status, body) = get_status(health_router(Arc::clone(&state)), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, r#"{"status":"not_ready"}"#);

        state.set_ready();
        let (status, _) = get_status(health_router(Arc::clone(&state)), "/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_path_returns_404() {
        let app = health_router(Arc::new(HealthState::new()));
        let (status, _) = get_status(app, "/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
