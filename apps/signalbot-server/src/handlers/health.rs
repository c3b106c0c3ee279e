use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "gateway": state.gateway.name(),
        "plans": state.catalog.plans().len(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
