//! REST surface tests driven through the router without a socket.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use sampling_roster::api::{router, AppState};
use sampling_roster::config::SchedulerConfig;
use sampling_roster::domain::Sampler;
use sampling_roster::repository::InMemoryRepository;

fn app_with(repo: Arc<InMemoryRepository>) -> Router {
    router(Arc::new(AppState::new(repo, SchedulerConfig::default())))
}

fn app() -> Router {
    app_with(Arc::new(
        InMemoryRepository::new().with_samplers(vec![Sampler::new("Amy Cole"), Sampler::new("Beth Fox")]),
    ))
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn generate_body(total: u32, samplers: Value) -> Value {
    json!({
        "officeSampling": {
            "sampler": { "name": "Office Lead" },
            "startTime": "2025-01-06T03:00:00Z",
            "finishTime": "2025-01-06T09:00:00Z"
        },
        "totalDischargeHours": total,
        "samplers": samplers,
        "vesselName": "MT Aurora"
    })
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(app(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");
}

#[tokio::test]
async fn test_generate_schedule() {
    let (status, body) = send(
        app(),
        Method::POST,
        "/schedules/generate",
        Some(generate_body(24, json!(["Amy Cole", "Beth Fox"]))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalHours"], 24.0);
    assert_eq!(body["complete"], true);

    let turns = body["lineSampling"].as_array().unwrap();
    assert_eq!(turns[0]["sampler"]["name"], "Amy Cole");
    assert_eq!(turns[0]["startTime"], "2025-01-06T09:00:00Z");
    assert_eq!(turns[0]["finishTime"], "2025-01-06T19:00:00Z");
    assert_eq!(turns[1]["sampler"]["name"], "Beth Fox");
}

#[tokio::test]
async fn test_empty_sampler_list_is_bad_request() {
    let (status, body) = send(
        app(),
        Method::POST,
        "/schedules/generate",
        Some(generate_body(12, json!([]))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalidInput");
}

#[tokio::test]
async fn test_upstream_outage_is_bad_gateway() {
    let repo = Arc::new(InMemoryRepository::new().with_samplers(vec![Sampler::new("Amy Cole")]));
    repo.set_offline(true);
    let (status, body) = send(
        app_with(repo),
        Method::POST,
        "/schedules/generate",
        Some(generate_body(12, json!(["Amy Cole"]))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "upstreamUnavailable");
}

#[tokio::test]
async fn test_validate_reports_every_check() {
    let body = json!({
        "samplerName": "Amy Cole",
        "startTime": "2025-01-06T19:00:00Z",
        "finishTime": "2025-01-07T07:00:00Z",
        "lineSampling": [{
            "sampler": { "name": "Amy Cole" },
            "startTime": "2025-01-06T09:00:00Z",
            "finishTime": "2025-01-06T19:00:00Z"
        }]
    });
    let (status, body) = send(app(), Method::POST, "/schedules/validate", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["origin"], "cached");
    assert_eq!(body["rest"]["isValid"], false);
    assert_eq!(body["weekly"]["isValid"], true);
    assert_eq!(body["overall"]["isValid"], false);
}

#[tokio::test]
async fn test_recalculate_rejects_inverted_turn() {
    let body = json!({
        "editedFirstTurn": {
            "sampler": { "name": "Amy Cole" },
            "startTime": "2025-01-06T15:00:00Z",
            "finishTime": "2025-01-06T09:00:00Z"
        },
        "etc": "2025-01-07T19:00:00Z",
        "samplers": ["Beth Fox"]
    });
    let (status, body) = send(app(), Method::POST, "/schedules/recalculate", Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "inconsistentData");
}

#[tokio::test]
async fn test_single_turn() {
    let body = json!({
        "etc": "2025-01-06T10:00:00Z",
        "samplers": ["Amy Cole", "Beth Fox"]
    });
    let (status, body) = send(app(), Method::POST, "/schedules/single-turn", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    let turns = body["lineSampling"].as_array().unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0]["hours"], 4.0);
    assert_eq!(turns[0]["assignment"], "fixedSingleTurn");
}

#[tokio::test]
async fn test_clear_cache_and_info() {
    let app = app();
    send(
        app.clone(),
        Method::POST,
        "/schedules/generate",
        Some(generate_body(12, json!(["Amy Cole", "Beth Fox"]))),
    )
    .await;

    let (_, info) = send(app.clone(), Method::GET, "/info", None).await;
    assert_eq!(info["cachedWeeks"], 1);
    assert_eq!(info["activeGenerations"], 1);

    let (status, cleared) = send(app.clone(), Method::DELETE, "/cache", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["droppedWeeks"], 1);

    let (_, info) = send(app, Method::GET, "/info", None).await;
    assert_eq!(info["cachedWeeks"], 0);
}

#[tokio::test]
async fn test_demo_data() {
    let (status, list) = send(app(), Method::GET, "/demo-data", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!(["SMALL", "LARGE"]));

    let (status, data) = send(app(), Method::GET, "/demo-data/SMALL", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["samplers"].as_array().map(Vec::len), Some(8));
    assert_eq!(data["request"]["totalDischargeHours"], 36);

    let (status, _) = send(app(), Method::GET, "/demo-data/HUGE", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
