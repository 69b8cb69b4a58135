use axum::body::Body;
use axum::http::{Request, StatusCode};
use duckpond::config::Settings;
use duckpond::storage::{LocalStorage, S3Config, Storage};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

fn settings(local_root: &std::path::Path) -> Settings {
    Settings {
        host: "127.0.0.1".to_string(),
        port: 0,
        local_root: local_root.to_path_buf(),
        s3: S3Config::default(),
        ttl_seconds: 0,
        bearer_token: None,
        query_splitting: false,
        log_level: "info".to_string(),
    }
}

async fn post(app: &axum::Router, path: &str, body: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(path)
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// S1 — create, insert twice, select both rows back in either order.
#[tokio::test]
async fn scenario_s1_create_insert_select() {
    let dir = tempfile::tempdir().unwrap();
    let app = duckpond::build_app(&settings(dir.path())).unwrap();

    let (status, body) = post(
        &app,
        "/query",
        "CREATE TABLE messages (id VARCHAR, text VARCHAR, usage INTEGER)",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 0);

    post(
        &app,
        "/query",
        "INSERT INTO messages VALUES ('01947471-2ded-7812-cafe-34567000b33f','one',1)",
    )
    .await;
    post(
        &app,
        "/query",
        "INSERT INTO messages VALUES ('01947471-2ded-7812-cafe-34567000b33e','more',1)",
    )
    .await;

    let (status, body) = post(&app, "/query", "SELECT id, text FROM messages").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 2);
    let ids: Vec<String> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row[0].as_str().unwrap().to_string())
        .collect();
    assert!(ids.contains(&"01947471-2ded-7812-cafe-34567000b33e".to_string()));
    assert!(ids.contains(&"01947471-2ded-7812-cafe-34567000b33f".to_string()));
}

/// S2 — VACUUM compacts two live files into one, then a second VACUUM
/// reclaims the tombstoned pair, and a third is a no-op.
#[tokio::test]
async fn scenario_s2_vacuum_merge_then_reclaim() {
    let dir = tempfile::tempdir().unwrap();
    let app = duckpond::build_app(&settings(dir.path())).unwrap();

    post(&app, "/query", "CREATE TABLE t (a INT)").await;
    post(&app, "/query", "INSERT INTO t VALUES (1)").await;
    post(&app, "/query", "INSERT INTO t VALUES (2)").await;

    let (status, body) = post(&app, "/query", "VACUUM t").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 0);

    let (status, _) = post(&app, "/query", "VACUUM t").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(&app, "/query", "VACUUM t").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 0);

    let (status, body) = post(&app, "/query", "SELECT * FROM t").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 2);
}

/// S4 — a freshly created, never-inserted-into table selects as empty with
/// its declared schema still reported.
#[tokio::test]
async fn scenario_s4_empty_table_select() {
    let dir = tempfile::tempdir().unwrap();
    let app = duckpond::build_app(&settings(dir.path())).unwrap();

    post(&app, "/query", "CREATE TABLE t (a INT)").await;
    let (status, body) = post(&app, "/query", "SELECT * FROM t").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 0);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    assert_eq!(body["meta"][0]["name"], "a");
    assert_eq!(body["meta"][0]["type"], "INTEGER");
}

/// S5 — the parse endpoint classifies without touching storage or the log.
#[tokio::test]
async fn scenario_s5_parse_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = duckpond::build_app(&settings(dir.path())).unwrap();

    let (status, body) = post(&app, "/parse", "SELECT * FROM app.users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["operation"], "select");
    assert_eq!(body["table"], "app.users");
}

/// S6 — `uuid_v7_time` recovers the millisecond timestamp embedded in a
/// `uuidv7()` value, end to end through the SQL surface.
#[tokio::test]
async fn scenario_s6_uuidv7_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let app = duckpond::build_app(&settings(dir.path())).unwrap();

    let (status, body) = post(
        &app,
        "/query",
        "SELECT uuid_v7_time(uuidv7()) > 0 AS ok",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 1);
    assert_eq!(body["data"][0][0], "true");
}

/// A request missing a configured bearer token is rejected before it ever
/// reaches the pipeline.
#[tokio::test]
async fn bearer_token_gate_rejects_unauthenticated_requests() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = settings(dir.path());
    cfg.bearer_token = Some("topsecret".to_string());
    let app = duckpond::build_app(&cfg).unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/query")
        .body(Body::from("SELECT 1"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

/// S3 — concurrent writers racing the same log ETag: exactly one of two
/// conditional writes against the same observed ETag succeeds, the other
/// gets a precondition failure it must turn into `ConcurrentLogUpdate`.
#[tokio::test]
async fn scenario_s3_concurrent_writers_race_on_etag() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(dir.path()).unwrap();

    let initial = storage
        .write("t/_delta_log/00000000000000000000.json", "{}".into(), Some(""))
        .await
        .unwrap();

    let (_, observed) = storage
        .read("t/_delta_log/00000000000000000000.json")
        .await
        .unwrap();
    assert_eq!(observed.etag, initial.etag);

    let a = storage.write(
        "t/_delta_log/00000000000000000000.json",
        "{\"writer\":\"a\"}".into(),
        Some(&observed.etag),
    );
    let b = storage.write(
        "t/_delta_log/00000000000000000000.json",
        "{\"writer\":\"b\"}".into(),
        Some(&observed.etag),
    );
    let (a_result, b_result) = tokio::join!(a, b);

    let successes = [a_result.is_ok(), b_result.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(successes, 1, "exactly one writer wins the CAS race");
}
