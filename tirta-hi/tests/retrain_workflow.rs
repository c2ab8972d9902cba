//! End-to-end retrain workflow tests against a stub training service
//!
//! A real HTTP server stands in for the external training service so the
//! full path is exercised: multipart submission, bounded timeout, response
//! decoding, forecast persistence and registry status updates.

use axum::{
    body::{Body, Bytes},
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use http_body_util::BodyExt;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use tirta_common::events::{EventBus, TirtaEvent};
use tirta_hi::config::IngestConfig;
use tirta_hi::AppState;
use tower::util::ServiceExt;

const BOUNDARY: &str = "tirta-retrain-boundary";
const DAILY_CSV: &[u8] = b"date,total_m3\n2025-01-01,1.5\n2025-01-02,2.25\n2025-01-03,1.8\n";

#[derive(Clone, Copy)]
enum StubMode {
    /// 200 with a complete forecast response
    Success,
    /// 500 with a plain-text failure detail
    Failure,
    /// Never answers within any test timeout
    Hang,
}

fn stub_response() -> serde_json::Value {
    json!({
        "daily": [
            { "date": "2025-01-04",
              "volumeInLiters": 1900.0,
              "volumeInLiters_lower": 1500.0,
              "volumeInLiters_upper": 2300.0 }
        ],
        "weekly": [],
        "monthly": [
            { "month": "2025-01",
              "volumeInLiters": 58000.0,
              "volumeInLiters_lower": 50000.0,
              "volumeInLiters_upper": 66000.0 }
        ],
        "metrics": { "mae": 0.4, "rmse": 0.6, "mape": 7.5, "train_size": 3, "test_size": 1 },
        "model": "prophet"
    })
}

/// Spawn a stub training service on an ephemeral port, returning its base URL
async fn spawn_training_stub(mode: StubMode) -> String {
    let app = Router::new().route(
        "/api/train",
        post(move |_body: Bytes| async move {
            match mode {
                StubMode::Success => Json(stub_response()).into_response(),
                StubMode::Failure => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "model error").into_response()
                }
                StubMode::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Json(stub_response()).into_response()
                }
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub listener");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    format!("http://{}", addr)
}

async fn create_test_app(
    training_url: String,
    training_timeout: Duration,
) -> (axum::Router, AppState, TempDir) {
    let data_dir = tempfile::tempdir().expect("Failed to create temp data folder");

    let pool = sqlx::SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    tirta_hi::db::init_tables(&pool)
        .await
        .expect("Failed to initialize database schema");

    let config = IngestConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        data_folder: data_dir.path().to_path_buf(),
        training_service_url: training_url,
        training_timeout,
        telemetry_export_url: None,
        telemetry_device_id: "water_meter_01".to_string(),
        telemetry_range: "-30d".to_string(),
        auto_train: false,
    };

    let event_bus = EventBus::new(100);
    let state = AppState::new(pool, event_bus, config).expect("Failed to build app state");
    let app = tirta_hi::build_router(state.clone());

    (app, state, data_dir)
}

fn multipart_body(content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"data.csv\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: text/csv\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Upload the sample CSV and return the new upload id
async fn upload_sample(app: &axum::Router) -> String {
    let request = Request::builder()
        .method("POST")
        .uri("/api/uploads")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(DAILY_CSV)))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = response_json(response).await;
    json["upload"]["id"].as_str().unwrap().to_string()
}

fn retrain_request(upload_id: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/retrain")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "upload_id": upload_id, "use_telemetry": false }).to_string(),
        ))
        .unwrap()
}

async fn fetch_upload(app: &axum::Router, upload_id: &str) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/uploads/{}", upload_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await
}

#[tokio::test]
async fn successful_retrain_produces_forecast_and_trained_status() {
    let url = spawn_training_stub(StubMode::Success).await;
    let (app, _state, _dir) = create_test_app(url, Duration::from_secs(10)).await;

    let upload_id = upload_sample(&app).await;

    let response = app
        .clone()
        .oneshot(retrain_request(&upload_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = response_json(response).await;
    assert_eq!(result["success"], true);
    assert_eq!(result["metrics"]["mape"], 7.5);
    assert_eq!(result["forecast_summary"]["daily_count"], 1);
    assert_eq!(result["forecast_summary"]["monthly_count"], 1);

    let upload = fetch_upload(&app, &upload_id).await;
    assert_eq!(upload["status"], "trained");
    assert_eq!(upload["training_result"]["success"], true);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/forecast")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let forecast = response_json(response).await;
    assert_eq!(forecast["metadata"]["model"], "prophet");
    assert_eq!(forecast["daily"][0]["volumeInLiters"], 1900.0);
}

#[tokio::test]
async fn cost_projection_applies_tiered_tariff_to_monthly_forecast() {
    let url = spawn_training_stub(StubMode::Success).await;
    let (app, _state, _dir) = create_test_app(url, Duration::from_secs(10)).await;

    let upload_id = upload_sample(&app).await;
    let response = app
        .clone()
        .oneshot(retrain_request(&upload_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/forecast/cost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    let monthly = json["monthly"].as_array().unwrap();
    assert_eq!(monthly.len(), 1);
    assert_eq!(monthly[0]["month"], "2025-01");
    assert_eq!(monthly[0]["volume_m3"], 58.0);
    // 10 @ 3000 + 10 @ 4500 + 38 @ 6000
    assert_eq!(monthly[0]["estimated_cost"], 303_000);
}

#[tokio::test]
async fn remote_failure_maps_to_bad_gateway_and_failed_status() {
    let url = spawn_training_stub(StubMode::Failure).await;
    let (app, _state, _dir) = create_test_app(url, Duration::from_secs(10)).await;

    let upload_id = upload_sample(&app).await;

    let response = app
        .clone()
        .oneshot(retrain_request(&upload_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let json = response_json(response).await;
    assert_eq!(json["error"]["code"], "TRAINING_FAILED");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("model error"));

    // Failure is durable: the registry reflects it on a follow-up read.
    let upload = fetch_upload(&app, &upload_id).await;
    assert_eq!(upload["status"], "failed");
    assert_eq!(upload["training_result"]["success"], false);
    assert!(upload["training_result"]["error"]
        .as_str()
        .unwrap()
        .contains("model error"));
}

#[tokio::test]
async fn unresponsive_training_service_times_out() {
    let url = spawn_training_stub(StubMode::Hang).await;
    let (app, _state, _dir) = create_test_app(url, Duration::from_secs(1)).await;

    let upload_id = upload_sample(&app).await;

    let started = std::time::Instant::now();
    let response = app
        .clone()
        .oneshot(retrain_request(&upload_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(10));

    let json = response_json(response).await;
    assert_eq!(json["error"]["code"], "TRAINING_TIMEOUT");

    let upload = fetch_upload(&app, &upload_id).await;
    assert_eq!(upload["status"], "failed");
}

#[tokio::test]
async fn retrain_of_unknown_upload_is_not_found() {
    let url = spawn_training_stub(StubMode::Success).await;
    let (app, _state, _dir) = create_test_app(url, Duration::from_secs(10)).await;

    let response = app
        .oneshot(retrain_request(&uuid::Uuid::new_v4().to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn retrain_session_is_queryable_after_completion() {
    let url = spawn_training_stub(StubMode::Success).await;
    let (app, state, _dir) = create_test_app(url, Duration::from_secs(10)).await;

    let upload_id = upload_sample(&app).await;

    let mut rx = state.event_bus.subscribe();
    let response = app
        .clone()
        .oneshot(retrain_request(&upload_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut session_id = None;
    while let Ok(event) = rx.try_recv() {
        if let TirtaEvent::RetrainStarted { session_id: id, .. } = event {
            session_id = Some(id);
            break;
        }
    }
    let session_id = session_id.expect("RetrainStarted event not observed");

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/retrain/sessions/{}", session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let session = response_json(response).await;
    assert_eq!(session["state"], "completed");
    assert!(!session["log"].as_array().unwrap().is_empty());
    assert!(session["ended_at"].is_string());
}
