use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tagstation_shared::{codec, ReadProfile, SessionError, USER_START_BLOCK};
use tracing::info;

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/read-pk", get(read_pk))
        .route("/write-pk", post(write_pk))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadHexResponse {
    pub uid: String,
    pub hex_data: String,
    pub total_bytes: usize,
    pub successful_blocks: usize,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteHexRequest {
    pub hex_string: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WriteHexResponse {
    pub uid: String,
    pub hex_string: String,
    pub total_bytes: usize,
    pub total_blocks: usize,
    pub message: String,
}

/// GET /read-pk - Read a hex payload from the next tag presented
async fn read_pk(State(state): State<Arc<AppState>>) -> Result<Json<ReadHexResponse>, ApiError> {
    let poll = state.config.hardware.poll;
    let timeout = state.config.detect_timeout;
    let mut station = state.station.clone().lock_owned().await;

    let (uid, outcome) = tokio::task::spawn_blocking(move || {
        let mut session = station.session(poll);
        info!(session = %session.id(), "Waiting for an NFC tag to read hex data...");
        let uid = session.wait_for_tag(timeout)?;
        let outcome = session.read_payload(ReadProfile::hex_payload())?;
        Ok::<_, SessionError>((uid, outcome))
    })
    .await?
    .map_err(ApiError::from_read)?;

    Ok(Json(ReadHexResponse {
        uid: uid.to_hex(),
        hex_data: hex::encode(&outcome.payload),
        total_bytes: outcome.payload.len(),
        successful_blocks: outcome.blocks_read,
        message: "Hex data successfully read from NFC tag".into(),
    }))
}

/// POST /write-pk - Write a hex payload to the next tag presented
async fn write_pk(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WriteHexRequest>,
) -> Result<Json<WriteHexResponse>, ApiError> {
    let hex_string = request.hex_string.trim().to_string();
    let data = codec::parse_hex_payload(&hex_string)?;
    let total_bytes = data.len();
    let padded = codec::pad(&data);
    info!(
        "Hex string to write: {} ({} bytes, padded to {})",
        hex_string,
        total_bytes,
        padded.len()
    );

    let poll = state.config.hardware.poll;
    let timeout = state.config.detect_timeout;
    let mut station = state.station.clone().lock_owned().await;

    let (uid, outcome) = tokio::task::spawn_blocking(move || {
        let mut session = station.session(poll);
        info!(session = %session.id(), "Waiting for an NFC tag...");
        let uid = session.wait_for_tag(timeout)?;
        let outcome = session.write_payload(USER_START_BLOCK, &padded)?;
        Ok::<_, SessionError>((uid, outcome))
    })
    .await?
    .map_err(ApiError::from_write)?;

    Ok(Json(WriteHexResponse {
        uid: uid.to_hex(),
        hex_string,
        total_bytes,
        total_blocks: outcome.blocks_written,
        message: "Hex string successfully written to NFC tag".into(),
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tagstation_shared::sim::{LedProbe, RecordingLed, SimulatedField, SimulatedReader, SimulatedTag};
    use tagstation_shared::{PollConfig, Station};
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;

    const UID: [u8; 7] = [0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6];

    fn test_app(field: &SimulatedField) -> (Router, LedProbe) {
        let (led, probe) = RecordingLed::new();
        let station = Station::new(Box::new(SimulatedReader::new(field.clone())), Box::new(led));

        let mut config = Config::default();
        config.detect_timeout = Duration::from_millis(150);
        config.hardware.poll = PollConfig {
            probe_timeout: Duration::from_millis(10),
            poll_interval: Duration::from_millis(10),
        };

        let state = Arc::new(AppState {
            config,
            station: Arc::new(Mutex::new(station)),
        });
        (crate::app(state), probe)
    }

    fn ntag() -> SimulatedTag {
        SimulatedTag::ntag(UID.to_vec(), 45)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn write_request(hex_string: &str) -> Request<Body> {
        Request::post("/write-pk")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({ "hex_string": hex_string }).to_string()))
            .unwrap()
    }

    fn read_request() -> Request<Body> {
        Request::get("/read-pk").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn api_info_lists_endpoints() {
        let (app, _) = test_app(&SimulatedField::empty());
        let (status, body) = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "NFC Hex Reader/Writer API");
        assert_eq!(body["endpoints"]["read"], "/read-pk");
        assert_eq!(body["endpoints"]["write"], "/write-pk");
    }

    #[tokio::test]
    async fn write_then_read_recovers_payload() {
        let field = SimulatedField::with_tag(ntag());
        let (app, probe) = test_app(&field);

        let (status, body) = send(&app, write_request(" 48656c6c6f ")).await;
        assert_eq!(status, StatusCode::OK);
        let written: WriteHexResponse = serde_json::from_value(body).unwrap();
        assert_eq!(written.uid, "04A1B2C3D4E5F6");
        assert_eq!(written.hex_string, "48656c6c6f");
        assert_eq!(written.total_bytes, 5);
        assert_eq!(written.total_blocks, 2);
        assert_eq!(field.page(4), Some(*b"Hell"));
        assert_eq!(field.page(5), Some([b'o', 0, 0, 0]));

        let (status, body) = send(&app, read_request()).await;
        assert_eq!(status, StatusCode::OK);
        let read: ReadHexResponse = serde_json::from_value(body).unwrap();
        assert_eq!(read.uid, "04A1B2C3D4E5F6");
        assert_eq!(read.hex_data, "48656c6c6f");
        assert_eq!(read.total_bytes, 5);
        // blocks 4 and 5 plus the empty block that ends the data
        assert_eq!(read.successful_blocks, 3);
        assert_eq!(read.message, "Hex data successfully read from NFC tag");

        assert!(!probe.is_lit());
        assert_eq!(probe.history().iter().filter(|lit| **lit).count(), 2);
    }

    #[tokio::test]
    async fn empty_hex_is_rejected_before_polling() {
        let field = SimulatedField::with_tag(ntag());
        let (app, probe) = test_app(&field);

        let (status, body) = send(&app, write_request("   ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "No hex string provided");
        assert_eq!(field.poll_count(), 0);
        assert!(probe.history().is_empty());
    }

    #[tokio::test]
    async fn malformed_hex_is_rejected() {
        let field = SimulatedField::with_tag(ntag());
        let (app, _) = test_app(&field);

        let (status, body) = send(&app, write_request("48zz")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().starts_with("Invalid hex string"));
        assert_eq!(field.poll_count(), 0);
    }

    #[tokio::test]
    async fn read_without_tag_times_out() {
        let field = SimulatedField::empty();
        let (app, probe) = test_app(&field);

        let (status, body) = send(&app, read_request()).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert!(body["detail"].as_str().unwrap().starts_with("Timeout: No NFC tag found"));
        assert!(field.poll_count() > 0);
        assert!(probe.history().is_empty());
    }

    #[tokio::test]
    async fn write_without_tag_times_out() {
        let field = SimulatedField::empty();
        let (app, probe) = test_app(&field);

        let (status, _) = send(&app, write_request("cafe")).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert!(probe.history().is_empty());
    }

    #[tokio::test]
    async fn blank_tag_reports_all_null_bytes() {
        let field = SimulatedField::with_tag(ntag());
        let (app, probe) = test_app(&field);

        let (status, body) = send(&app, read_request()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "No valid hex data found (all null bytes)");
        assert!(!probe.is_lit());
    }

    #[tokio::test]
    async fn unreadable_tag_reports_no_data() {
        let mut tag = ntag();
        tag.fail_reads_from(4);
        let field = SimulatedField::with_tag(tag);
        let (app, _) = test_app(&field);

        let (status, body) = send(&app, read_request()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "No data could be read from the tag");
    }

    #[tokio::test]
    async fn read_failure_keeps_earlier_blocks() {
        let mut tag = ntag();
        tag.write_page(4, [0xDE, 0xAD, 0xBE, 0xEF]);
        tag.write_page(5, [0x01, 0x02, 0x03, 0x04]);
        tag.write_page(6, [0x05, 0x06, 0x07, 0x08]);
        tag.fail_reads_from(6);
        let field = SimulatedField::with_tag(tag);
        let (app, _) = test_app(&field);

        let (status, body) = send(&app, read_request()).await;
        assert_eq!(status, StatusCode::OK);
        let read: ReadHexResponse = serde_json::from_value(body).unwrap();
        assert_eq!(read.hex_data, "deadbeef01020304");
        assert_eq!(read.successful_blocks, 2);
    }

    #[tokio::test]
    async fn failed_block_write_is_a_server_error() {
        let mut tag = ntag();
        tag.fail_writes_at(5);
        let field = SimulatedField::with_tag(tag);
        let (app, probe) = test_app(&field);

        let (status, body) = send(&app, write_request("0102030405060708")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().starts_with("Error writing to NFC tag"));
        assert_eq!(field.page(4), Some([1, 2, 3, 4]));
        assert!(!probe.is_lit());
    }
}
