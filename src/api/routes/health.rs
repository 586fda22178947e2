use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::loader::RouteUnit;
use crate::api::state::AppState;
use crate::storage;

pub fn unit() -> anyhow::Result<RouteUnit> {
    Ok(RouteUnit::new().get("/health", health))
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let database = match state.with_pool(storage::ping).await {
        Ok(()) => "ok",
        Err(err) => {
            tracing::warn!(error = %err, "health check: database ping failed");
            "unavailable"
        }
    };

    Ok(Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_dir, state) = crate::api::test_support::state();
        let app = Router::new()
            .route("/health", axum::routing::get(health))
            .with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 10_000)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["data"]["database"], "ok");
        assert!(json["meta"]["timestamp"].is_string());
    }
}
