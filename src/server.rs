//! Liveness endpoint for hosted mode

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

/// GET / - reports that the bot process is alive.
pub async fn root() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "The bot is running": "True" })))
}

/// Router serving the liveness endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/", get(root))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_root_reports_running() {
        let (status, Json(body)) = root().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "The bot is running": "True" }));
    }

    #[tokio::test]
    async fn test_router_serves_root() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move { axum::serve(listener, router()).await });

        let body: Value = reqwest::get(format!("http://{addr}/"))
            .await
            .expect("request")
            .json()
            .await
            .expect("json body");
        assert_eq!(body["The bot is running"], "True");
        server.abort();
    }
}
