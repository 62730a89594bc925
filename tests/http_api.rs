use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use classsync::{
    assets::memory::MemoryObjectStore,
    persist::sqlite::SqliteContentStore,
    record::ClassroomInfo,
    runtime::handle::{RuntimeConfig, spawn_syncer},
    server::{ApiState, router},
    types::RowId,
};

fn app() -> (Router, RowId) {
    let mut store = SqliteContentStore::open_in_memory().expect("open sqlite");
    let classroom = store
        .create_classroom(&ClassroomInfo::default(), true)
        .expect("classroom");
    let handle = spawn_syncer(
        Box::new(store),
        Box::new(MemoryObjectStore::default()),
        RuntimeConfig::default(),
    );
    (router(ApiState { handle }, None), classroom)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn sync_round_trip_over_http() {
    let (app, classroom) = app();

    let body = json!({
        "id": classroom.to_string(),
        "name": "Ignored unless flagged",
        "modules": [{
            "id": "m-tmp-1",
            "position": 0,
            "name": "Getting started",
            "mutation": { "created": true },
            "lessons": [{
                "id": "l-tmp-1",
                "parentId": "m-tmp-1",
                "position": 0,
                "name": "Hello",
                "resources": [{
                    "id": "r-tmp-1",
                    "kind": "file",
                    "url": "data:image/png;base64,iVBORw0KGgo=",
                    "displayName": "logo"
                }]
            }]
        }]
    });

    let (status, value) = send(&app, post_json(&format!("/classrooms/{classroom}/sync"), &body)).await;
    assert_eq!(status, StatusCode::OK, "{value}");
    assert_eq!(value["statusCode"], 200);
    let report = &value["report"];
    assert_eq!(report["classroomId"], classroom);
    assert_eq!(report["modules"]["inserted"], 1);
    assert_eq!(report["lessons"]["inserted"], 1);
    assert_eq!(report["resources"]["inserted"], 1);
    let module_row = report["idMap"]["m-tmp-1"].as_i64().expect("module id");

    let (status, stored) = send(&app, get(&format!("/classrooms/{classroom}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["modules"][0]["id"], module_row);
    assert_eq!(stored["modules"][0]["name"], "Getting started");
    let resource = &stored["modules"][0]["lessons"][0]["resources"][0];
    assert_eq!(resource["fileSize"], 8);
    assert!(
        resource["url"]
            .as_str()
            .expect("url")
            .starts_with("memory://assets/lessons/")
    );
}

#[tokio::test]
async fn mismatched_and_malformed_bodies_are_unprocessable() {
    let (app, classroom) = app();

    let (status, value) = send(
        &app,
        post_json(&format!("/classrooms/{classroom}/sync"), &json!({ "id": 77 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(value["error"], "InvalidPayload");
    assert_eq!(value["statusCode"], 422);

    let (status, value) = send(
        &app,
        post_json(
            &format!("/classrooms/{classroom}/sync"),
            &json!({ "id": classroom, "modules": [{ "id": "", "name": "x" }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(value["error"], "InvalidPayload");

    let (status, value) = send(
        &app,
        post_json(
            &format!("/classrooms/{classroom}/sync"),
            &json!({
                "id": classroom,
                "modules": [
                    { "id": "m-x", "name": "a" },
                    { "id": "m-x", "name": "b" }
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(value["error"], "InvalidTree");
}

#[tokio::test]
async fn unknown_classrooms_are_not_found() {
    let (app, _) = app();

    let (status, value) = send(&app, get("/classrooms/9999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(value["error"], "NotFound");

    let (status, value) = send(&app, get("/classrooms/not-a-number")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(value["statusCode"], 404);

    let (status, value) = send(
        &app,
        post_json("/classrooms/9999/sync", &json!({ "id": "9999" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(value["error"], "NotFound");
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _) = app();
    let (status, value) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, Value::String("OK".to_string()));
}
