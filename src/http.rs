//! HTTP control surface.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/healthz` | Liveness, plain `ok` |
//! | `GET` | `/api/ping` | `{"pong":true}` |
//! | `POST` | `/api/control?action=..&kw10=..` | Acknowledge a device command |
//! | `GET` | `/api/status` | Pipeline [`HealthReport`](crate::health::HealthReport) |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::health::HealthChecker;
use crate::lifecycle::PipelineHandle;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: PipelineHandle,
    pub health: Arc<HealthChecker>,
}

impl AppState {
    pub fn new(pipeline: PipelineHandle) -> Self {
        Self {
            pipeline,
            health: Arc::new(HealthChecker::new()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ControlParams {
    pub action: Option<String>,
    /// Power setpoint in kW x 10.
    pub kw10: Option<String>,
}

#[derive(Debug, Serialize)]
struct ControlResponse {
    status: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/ping", get(ping))
        .route("/api/control", post(control))
        .route("/api/status", get(status))
        .with_state(state)
}

/// Serve `state` on `addr` until `cancel` fires, then finish open requests.
pub async fn serve(addr: SocketAddr, state: AppState, cancel: CancellationToken) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "http server starting");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            tracing::info!("http server stopping");
        })
        .await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ping() -> impl IntoResponse {
    Json(serde_json::json!({ "pong": true }))
}

/// The command is logged and acknowledged; nothing acts on it yet.
async fn control(Query(params): Query<ControlParams>) -> impl IntoResponse {
    let kw = params
        .kw10
        .as_deref()
        .and_then(|v| v.parse::<i64>().ok())
        .map(|v| v as f64 / 10.0);
    tracing::info!(
        action = params.action.as_deref().unwrap_or(""),
        kw10 = params.kw10.as_deref().unwrap_or(""),
        kw = ?kw,
        "control request received"
    );
    (StatusCode::ACCEPTED, Json(ControlResponse { status: "queued" }))
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pipeline.health_report(&state.health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::lifecycle::{Pipeline, PipelineConfig};
    use crate::store::MemoryStore;

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_healthz_returns_ok() {
        let running = Pipeline::new(PipelineConfig::default(), Arc::new(MemoryStore::new())).start();
        let app = router(AppState::new(running.handle()));

        let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");

        running.stop(std::time::Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_ping_returns_pong() {
        let running = Pipeline::new(PipelineConfig::default(), Arc::new(MemoryStore::new())).start();
        let app = router(AppState::new(running.handle()));

        let req = Request::builder().uri("/api/ping").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!({ "pong": true }));

        running.stop(std::time::Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_control_is_accepted() {
        let running = Pipeline::new(PipelineConfig::default(), Arc::new(MemoryStore::new())).start();
        let app = router(AppState::new(running.handle()));

        let req = Request::builder()
            .method("POST")
            .uri("/api/control?action=charge&kw10=50")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(resp).await["status"], "queued");

        running.stop(std::time::Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_control_rejects_get() {
        let running = Pipeline::new(PipelineConfig::default(), Arc::new(MemoryStore::new())).start();
        let app = router(AppState::new(running.handle()));

        let req = Request::builder()
            .uri("/api/control?action=charge")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

        running.stop(std::time::Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_status_reports_running_pipeline() {
        let running = Pipeline::new(PipelineConfig::default(), Arc::new(MemoryStore::new())).start();
        let app = router(AppState::new(running.handle()));

        let req = Request::builder().uri("/api/status").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let report = body_json(resp).await;
        assert_eq!(report["shutdown"], "Running");
        assert_eq!(report["state"], "Healthy");

        running.stop(std::time::Duration::from_secs(1)).await;
    }
}
