mod support;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

use civic_reports::domain::reports::Status;
use civic_reports::infra::http::api::handlers;
use civic_reports::infra::http::api::models::RadiusQuery;
use civic_reports::infra::http::build_router;
use support::{Harness, JWT_SECRET, encode_image, metadata, report};

const MAX_REQUEST_BYTES: usize = 30 * 1024 * 1024;
const BOUNDARY: &str = "civic-test-boundary";

fn router(harness: &Harness) -> Router {
    build_router(harness.api_state(), MAX_REQUEST_BYTES)
}

fn token(secret: &str) -> String {
    encode(
        &Header::default(),
        &json!({ "sub": "moderator-1" }),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("encode token")
}

fn bearer() -> String {
    format!("Bearer {}", token(JWT_SECRET))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router responds");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn authorized(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, bearer());
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn multipart(metadata: Option<&str>, files: &[(&str, Vec<u8>)]) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(metadata) = metadata {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"json\"\r\n\r\n{metadata}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, data) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/api/reports/new")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn jpeg() -> Vec<u8> {
    encode_image(40, 30, image::ImageFormat::Jpeg)
}

async fn seed_city(harness: &Harness) {
    harness.reports.seed(report(1, Status::UNVERIFIED, 54.98, 73.37)).await;
    harness.reports.seed(report(2, Status::OPENED, 54.981, 73.37)).await;
    harness.reports.seed(report(3, Status::IN_PROGRESS, 54.99, 73.38)).await;
    harness.reports.seed(report(4, Status::REJECTED, 55.10, 73.37)).await;
    harness.reports.seed(report(5, Status::REJECTED, 55.20, 73.50)).await;
}

fn numbers(body: &Value) -> Vec<i64> {
    body.as_array()
        .expect("array body")
        .iter()
        .map(|report| report["number"].as_i64().expect("number"))
        .collect()
}

#[tokio::test]
async fn multipart_submission_creates_a_report() {
    let harness = Harness::new();
    let app = router(&harness);

    let (status, body) = send(
        &app,
        multipart(
            Some(&metadata(None, 54.98, 73.37)),
            &[("one.jpg", jpeg()), ("two.jpg", jpeg())],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["number"], 1);
    assert_eq!(body["status"], 1);
    assert_eq!(body["geo"]["type"], "Point");
    assert_eq!(body["geo"]["coordinates"], json!([54.98, 73.37]));
    assert_eq!(body["media"].as_array().unwrap().len(), 2);

    let (status, fetched) = send(&app, get("/api/reports/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, body);

    let id = body["id"].as_str().unwrap();
    let (status, by_id) = send(&app, get(&format!("/api/reports/id/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_id["number"], 1);
}

#[tokio::test]
async fn multipart_problems_map_to_client_errors() {
    let harness = Harness::new();
    let app = router(&harness);

    let (status, body) = send(&app, multipart(None, &[("one.jpg", jpeg())])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_failed");

    let (status, body) = send(
        &app,
        multipart(Some(&metadata(None, 54.98, 73.37)), &[]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_failed");

    let (status, body) = send(
        &app,
        multipart(
            Some(&metadata(None, 54.98, 73.37)),
            &[("doc.jpg", b"%PDF-1.7 not an image".to_vec())],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"]["code"], "unsupported_media");

    assert!(harness.reports.rows.lock().await.is_empty());
}

#[tokio::test]
async fn lookups_validate_numbers_and_ids() {
    let harness = Harness::new();
    seed_city(&harness).await;
    let app = router(&harness);

    for uri in ["/api/reports/0", "/api/reports/-2", "/api/reports/abc"] {
        let (status, body) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], "invalid_argument");
    }

    let (status, body) = send(&app, get("/api/reports/42")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _) = send(&app, get("/api/reports/id/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        get("/api/reports/id/6f1c1f44-2f44-4bb5-9a36-0c1c3a6a1a11"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listings_filter_by_status_and_report_empty_results() {
    let harness = Harness::new();
    let app = router(&harness);

    let (status, body) = send(&app, get("/api/reports/all")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "empty_result");

    seed_city(&harness).await;

    let (status, body) = send(&app, get("/api/reports/all")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(numbers(&body), vec![5, 4, 3, 2, 1]);

    let (_, body) = send(&app, get("/api/reports/all?status=2,3,x")).await;
    assert_eq!(numbers(&body), vec![3, 2]);

    let (status, _) = send(&app, get("/api/reports/all?status=4")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn filter_applies_count_and_sort() {
    let harness = Harness::new();
    seed_city(&harness).await;
    let app = router(&harness);

    let (_, body) = send(&app, get("/api/reports/filter?count=2")).await;
    assert_eq!(numbers(&body), vec![5, 4]);

    let (_, body) = send(&app, get("/api/reports/filter?count=2&sort=1")).await;
    assert_eq!(numbers(&body), vec![1, 2]);

    let (_, body) = send(&app, get("/api/reports/filter?count=0&sort=9")).await;
    assert_eq!(numbers(&body), vec![5, 4, 3, 2, 1]);

    let (_, body) = send(&app, get("/api/reports/filter?status=5&sort=1")).await;
    assert_eq!(numbers(&body), vec![4, 5]);
}

#[tokio::test]
async fn radius_search_returns_nearest_first() {
    let harness = Harness::new();
    seed_city(&harness).await;
    let app = router(&harness);

    let (status, body) = send(&app, get("/api/reports/radius?lat=54.98&lon=73.37&r=2000")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(numbers(&body), vec![1, 2, 3]);

    let (_, body) = send(
        &app,
        get("/api/reports/radius?lat=54.98&lon=73.37&r=2000&status=2,3"),
    )
    .await;
    assert_eq!(numbers(&body), vec![2, 3]);

    let (status, _) = send(&app, get("/api/reports/radius?lat=0&lon=0&r=10")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/api/reports/radius?lat=54.98&lon=73.37&r=-1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn radius_handler_requires_all_parameters() {
    let harness = Harness::new();
    let Err(err) = handlers::reports_in_radius(
        State(harness.api_state()),
        Query(RadiusQuery {
            lat: Some(54.98),
            lon: None,
            r: Some(100.0),
            status: None,
        }),
    )
    .await
    else {
        panic!("radius search without a longitude must fail");
    };
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.code(), "invalid_argument");
}

#[tokio::test]
async fn polygon_search_needs_three_vertices() {
    let harness = Harness::new();
    seed_city(&harness).await;
    let app = router(&harness);

    let square = json!({ "quad": [[54.97, 73.36], [54.97, 73.39], [55.0, 73.39], [55.0, 73.36]] });
    let request = Request::post("/api/reports/quad")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(square.to_string()))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(numbers(&body), vec![3, 2, 1]);

    let request = Request::post("/api/reports/quad?status=1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(square.to_string()))
        .unwrap();
    let (_, body) = send(&app, request).await;
    assert_eq!(numbers(&body), vec![1]);

    let line = json!({ "quad": [[54.97, 73.36], [55.0, 73.39]] });
    let request = Request::post("/api/reports/quad")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(line.to_string()))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_argument");
}

#[tokio::test]
async fn moderator_routes_require_a_valid_token() {
    let harness = Harness::new();
    seed_city(&harness).await;
    let app = router(&harness);

    let (status, body) = send(&app, get("/api/reports/statistic")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let forged = Request::get("/api/reports/statistic")
        .header(header::AUTHORIZATION, format!("Bearer {}", token("other-secret")))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        authorized(Method::GET, "/api/reports/statistic", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "total": 5,
            "unverified": 1,
            "opened": 1,
            "in_progress": 1,
            "closed": 0,
            "rejected": 2,
        })
    );

    let (status, _) = send(&app, Request::delete("/api/reports/1").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(harness.reports.rows.lock().await.len(), 5);
}

#[tokio::test]
async fn moderator_routes_are_closed_without_a_secret() {
    let harness = Harness::new();
    let app = build_router(harness.api_state_with_secret(None), MAX_REQUEST_BYTES);

    let (status, _) = send(
        &app,
        authorized(Method::GET, "/api/reports/statistic", None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn status_changes_are_range_checked() {
    let harness = Harness::new();
    seed_city(&harness).await;
    let app = router(&harness);

    let (status, body) = send(
        &app,
        authorized(Method::PATCH, "/api/reports/status/1", Some(json!({ "status": 4 }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 4);

    let (status, body) = send(
        &app,
        authorized(Method::PATCH, "/api/reports/status/1", Some(json!({ "status": 7 }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_argument");

    let (status, _) = send(
        &app,
        authorized(Method::PATCH, "/api/reports/status/99", Some(json!({ "status": 2 }))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn full_replace_keeps_identity_fields() {
    let harness = Harness::new();
    seed_city(&harness).await;
    let app = router(&harness);

    let (_, original) = send(&app, get("/api/reports/2")).await;
    let mut edited = original.clone();
    edited["description"] = json!("Lid replaced by the city");
    edited["created"] = json!("2001-01-01T00:00:00Z");
    edited["id"] = json!("6f1c1f44-2f44-4bb5-9a36-0c1c3a6a1a11");

    let (status, body) = send(&app, authorized(Method::PUT, "/api/reports", Some(edited))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], original["id"]);
    assert_eq!(body["created"], original["created"]);
    assert_eq!(body["description"], "Lid replaced by the city");

    let (_, fetched) = send(&app, get("/api/reports/2")).await;
    assert_eq!(fetched["description"], "Lid replaced by the city");
}

#[tokio::test]
async fn deletions_report_missing_rows() {
    let harness = Harness::new();
    seed_city(&harness).await;
    let app = router(&harness);

    let (status, _) = send(&app, authorized(Method::DELETE, "/api/reports/3", None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, authorized(Method::DELETE, "/api/reports/3", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, authorized(Method::DELETE, "/api/reports/rejected", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "deleted": 2 }));
    let (status, _) = send(&app, authorized(Method::DELETE, "/api/reports/rejected", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, get("/api/reports/all")).await;
    assert_eq!(numbers(&body), vec![2, 1]);
}

#[tokio::test]
async fn health_and_media_routes() {
    let harness = Harness::new();
    let state = harness.api_state();

    let response = handlers::health(State(state.clone())).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let Err(err) = handlers::serve_media(State(state), Path("reports/x.jpg".to_string())).await
    else {
        panic!("media is not served for remote storage");
    };
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}
