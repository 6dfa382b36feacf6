//! Handles GET /api/v1/health - Liveness probe

use axum::Json;
use serde_json::{Value, json};

pub async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "UP",
        "service": "liveness",
    }))
}
