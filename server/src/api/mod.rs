mod tag;

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

/// Build the API router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api_info))
        .merge(tag::router())
}

/// GET / - API information
async fn api_info() -> Json<Value> {
    Json(json!({
        "message": "NFC Hex Reader/Writer API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "read": "/read-pk",
            "write": "/write-pk",
        },
    }))
}
