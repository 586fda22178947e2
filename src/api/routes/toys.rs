//! Toy catalogue endpoints. `{id}` is checked by the id validator before
//! any handler here runs.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::loader::RouteUnit;
use crate::api::state::AppState;
use crate::storage::toys;

pub fn unit() -> anyhow::Result<RouteUnit> {
    Ok(RouteUnit::new()
        .get("/toys", list_toys)
        .get("/toys/{id}", get_toy)
        .delete("/toys/{id}", delete_toy))
}

async fn list_toys(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let toys = state.with_pool(toys::list).await?;
    let total = toys.len();
    Ok(Json(json!({ "data": toys, "meta": { "total": total } })))
}

async fn get_toy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let lookup = id.clone();
    let toy = state
        .with_pool(move |pool| toys::get(pool, &lookup))
        .await?
        .ok_or_else(|| toy_not_found(&id))?;
    Ok(Json(json!({ "data": toy })))
}

async fn delete_toy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let target = id.clone();
    if state.with_pool(move |pool| toys::delete(pool, &target)).await? {
        tracing::info!(%id, "toy deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(toy_not_found(&id))
    }
}

fn toy_not_found(id: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, format!("toy {id} not found"))
}
