// [apps/job-executor/src/handlers/health.rs]
//! GET /api/health: latido del proceso.

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
