use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing_test::traced_test;

use super::build;
use crate::config::Config;
use crate::db::sqlite::SqliteStore;
use crate::middleware::trace::X_TRACE_ID;
use crate::state::AppState;

/// Recognizer stand-in that writes a fixed two-row table to its output.
const TABLE_SCRIPT: &str = r#"printf '# defect recognition\n# v1\nx,y,Whiskers,Chipping,Scratch,No Error\n0,0,0.9,0.05,0.03,0.02\n1,0,0.1,0.1,0.1,0.7\n' > "$4""#;

struct TestApp {
    dir: tempfile::TempDir,
    app: Router,
}

impl TestApp {
    fn upload_root(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn wait_terminal(&self, workflow_id: &str) -> String {
        let uri = format!("/v1/workflows/{workflow_id}/status");
        for _ in 0..500 {
            let (_, body) = self.call(Method::GET, &uri, None).await;
            let status = body["status"].as_str().unwrap_or_default().to_owned();
            if status != "RUNNING" {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {workflow_id} did not finish");
    }
}

async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        bind_address: "127.0.0.1:0".into(),
        database_url: format!("sqlite://{}?mode=rwc", dir.path().join("ifm.db").display()),
        log_level: "info".into(),
        log_json: false,
        queue_capacity: 16,
        upload_root: dir.path().join("uploads"),
        work_dir: dir.path().join("work"),
        recognizer_program: "sh".into(),
        recognizer_args: vec!["-c".into(), TABLE_SCRIPT.into(), "sh".into()],
        model_timeout_secs: 10,
        step_timeout_secs: 10,
        max_attempts: 2,
        run_retention_secs: 0,
        enable_swagger: true,
        cors_allowed_origins: None,
    };
    let store = SqliteStore::connect(&config.database_url).await.unwrap();
    let state = Arc::new(AppState::new(config, store));
    TestApp {
        app: build(state),
        dir,
    }
}

fn ready_analysis() -> Value {
    json!({
        "name": "wafer batch",
        "inputs": [{ "reference": { "image_file": "wafer.tif" } }],
        "model_binary": { "reference": { "file": "binary.h5" } },
        "model_classification": { "reference": { "file": "classifier.h5" } }
    })
}

#[tokio::test]
async fn health_reports_upload_root() {
    let t = test_app().await;
    let (status, body) = t.call(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["service"], "ifm-server");

    std::fs::create_dir_all(t.upload_root()).unwrap();
    let (_, body) = t.call(Method::GET, "/health", None).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["uploads_ready"], true);
}

#[tokio::test]
async fn health_echoes_trace_id() {
    let t = test_app().await;
    let trace_id = "5f0c6a4e-2a3b-4c1d-9e8f-0a1b2c3d4e5f";
    let request = Request::builder()
        .uri("/health")
        .header(X_TRACE_ID, trace_id)
        .body(Body::empty())
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[X_TRACE_ID], trace_id);
}

#[tokio::test]
async fn openapi_document_lists_routes() {
    let t = test_app().await;
    let (status, body) = t.call(Method::GET, "/api-docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/v1/analyses/{id}/inference"].is_object());
    assert!(body["paths"]["/v1/workflows/{id}/status"].is_object());
}

#[tokio::test]
async fn schema_packages_are_listed() {
    let t = test_app().await;
    let (status, body) = t.call(Method::GET, "/v1/schemas", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert_eq!(names, ["SampleSchema", "XRFSchema", "IFMSchema", "EfficienciesSchema"]);

    let (status, body) = t.call(Method::GET, "/v1/schemas/IFMSchema", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["sections"]["TwoStepAnalysis"].is_object());

    let (status, _) = t.call(Method::GET, "/v1/schemas/Nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_workflow_reports_unknown_status() {
    let t = test_app().await;
    let (status, body) = t.call(Method::GET, "/v1/workflows/missing/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "workflow_id": "missing", "status": "UNKNOWN" }));

    let (status, _) = t.call(Method::GET, "/v1/workflows/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t.call(Method::POST, "/v1/workflows/missing/cancel", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn analysis_requires_readable_upload() {
    let t = test_app().await;
    let body = json!({ "upload_id": "nowhere", "user_id": "alice" });
    let (status, _) = t.call(Method::POST, "/v1/analyses", Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let upload = json!({ "upload_id": "u1", "main_author": "alice" });
    let (status, _) = t.call(Method::POST, "/v1/uploads", Some(upload)).await;
    assert_eq!(status, StatusCode::CREATED);

    let body = json!({ "upload_id": "u1", "user_id": "mallory" });
    let (status, _) = t.call(Method::POST, "/v1/analyses", Some(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let body = json!({ "upload_id": "u1", "user_id": "" });
    let (status, _) = t.call(Method::POST, "/v1/analyses", Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn malformed_analysis_id_is_bad_request() {
    let t = test_app().await;
    let (status, body) = t.call(Method::GET, "/v1/analyses/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not-a-uuid"));
}

#[tokio::test]
#[traced_test]
async fn trigger_without_models_starts_nothing() {
    let t = test_app().await;
    let upload = json!({ "upload_id": "u1", "main_author": "alice" });
    t.call(Method::POST, "/v1/uploads", Some(upload)).await;

    let body = json!({ "upload_id": "u1", "user_id": "alice", "analysis": { "name": "empty" } });
    let (_, created) = t.call(Method::POST, "/v1/analyses", Some(body)).await;
    let id = created["record"]["id"].as_str().unwrap();

    let (status, body) = t
        .call(Method::POST, &format!("/v1/analyses/{id}/inference"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["started"], json!([]));
    assert_eq!(body["record"]["analysis"]["trigger_run_workflow"], false);
    assert_eq!(body["record"]["analysis"]["method"], "IFM Two Step Analysis");
    assert!(logs_contain("inference trigger ignored"));
}

#[cfg(unix)]
#[tokio::test]
async fn trigger_run_and_refresh_links_result() {
    let t = test_app().await;
    let upload = json!({ "upload_id": "u1", "main_author": "alice" });
    t.call(Method::POST, "/v1/uploads", Some(upload)).await;

    let body = json!({ "upload_id": "u1", "user_id": "alice", "analysis": ready_analysis() });
    let (status, created) = t.call(Method::POST, "/v1/analyses", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["started"], json!([]));
    let id = created["record"]["id"].as_str().unwrap().to_owned();
    let provenance = &created["record"]["analysis"]["provenance"]["inputs"];
    assert_eq!(provenance.as_array().unwrap().len(), 2);

    let (status, triggered) = t
        .call(Method::POST, &format!("/v1/analyses/{id}/inference"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let started = triggered["started"].as_array().unwrap();
    assert_eq!(started.len(), 1);
    let workflow_id = started[0].as_str().unwrap().to_owned();
    assert_eq!(
        triggered["record"]["analysis"]["triggered_inferences"][0]["status"],
        "RUNNING"
    );

    assert_eq!(t.wait_terminal(&workflow_id).await, "COMPLETED");

    let (status, run) = t
        .call(Method::GET, &format!("/v1/workflows/{workflow_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["phase"], "COMPLETED");
    assert_eq!(run["steps"].as_array().unwrap().len(), 3);

    let archive = t
        .upload_root()
        .join("u1/raw")
        .join(&workflow_id)
        .join(ifm_core::archive::ARCHIVE_FILE_NAME);
    assert!(archive.exists());

    let refresh = format!("/v1/analyses/{id}/statuses/refresh");
    let (status, refreshed) = t.call(Method::POST, &refresh, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["linked"], 1);
    let analysis = &refreshed["record"]["analysis"];
    assert_eq!(analysis["triggered_inferences"][0]["status"], "COMPLETED");
    assert_eq!(analysis["triggered_inferences"][0]["linked"], true);
    assert_eq!(analysis["outputs"][0]["defect_prevalence"]["whiskers"], 0.5);
    assert_eq!(analysis["outputs"][0]["defect_prevalence"]["no_error"], 0.5);
    assert_eq!(analysis["figures"].as_array().unwrap().len(), 1);

    let (_, again) = t.call(Method::POST, &refresh, None).await;
    assert_eq!(again["linked"], 0);

    let (_, stored) = t.call(Method::GET, &format!("/v1/analyses/{id}"), None).await;
    assert_eq!(stored["analysis"]["outputs"].as_array().unwrap().len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn saving_with_trigger_keeps_run_history() {
    let t = test_app().await;
    let upload = json!({ "upload_id": "u1", "main_author": "alice" });
    t.call(Method::POST, "/v1/uploads", Some(upload)).await;

    let mut analysis = ready_analysis();
    analysis["trigger_run_workflow"] = json!(true);
    let body = json!({ "upload_id": "u1", "user_id": "alice", "analysis": analysis });
    let (_, created) = t.call(Method::POST, "/v1/analyses", Some(body)).await;
    assert_eq!(created["started"].as_array().unwrap().len(), 1);
    let id = created["record"]["id"].as_str().unwrap().to_owned();

    let mut edited = ready_analysis();
    edited["name"] = json!("renamed");
    edited["trigger_run_workflow"] = json!(true);
    let (status, saved) = t
        .call(
            Method::PUT,
            &format!("/v1/analyses/{id}"),
            Some(json!({ "analysis": edited })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["started"].as_array().unwrap().len(), 1);
    let record = &saved["record"]["analysis"];
    assert_eq!(record["name"], "renamed");
    assert_eq!(record["triggered_inferences"].as_array().unwrap().len(), 2);

    let (_, listed) = t.call(Method::GET, "/v1/analyses?upload_id=u1", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn escaping_file_names_are_rejected() {
    let t = test_app().await;
    let upload = json!({ "upload_id": "u1", "main_author": "alice" });
    t.call(Method::POST, "/v1/uploads", Some(upload)).await;

    let mut analysis = ready_analysis();
    analysis["inputs"][0]["reference"]["image_file"] = json!("../../../../tmp/evil.tif");
    analysis["trigger_run_workflow"] = json!(true);
    let body = json!({ "upload_id": "u1", "user_id": "alice", "analysis": analysis });
    let (status, body) = t.call(Method::POST, "/v1/analyses", Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("evil.tif"));

    let body = json!({ "upload_id": "u1", "user_id": "alice", "analysis": ready_analysis() });
    let (_, created) = t.call(Method::POST, "/v1/analyses", Some(body)).await;
    let id = created["record"]["id"].as_str().unwrap().to_owned();

    let mut edited = ready_analysis();
    edited["model_binary"]["reference"]["file"] = json!("/etc/passwd");
    edited["trigger_run_workflow"] = json!(true);
    let (status, _) = t
        .call(
            Method::PUT,
            &format!("/v1/analyses/{id}"),
            Some(json!({ "analysis": edited })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, stored) = t.call(Method::GET, &format!("/v1/analyses/{id}"), None).await;
    assert_eq!(stored["analysis"]["model_binary"]["reference"]["file"], "binary.h5");
    assert_eq!(stored["analysis"]["triggered_inferences"], json!([]));
}

#[tokio::test]
async fn concurrent_saves_keep_every_run_status() {
    let t = test_app().await;
    let upload = json!({ "upload_id": "u1", "main_author": "alice" });
    t.call(Method::POST, "/v1/uploads", Some(upload)).await;
    let body = json!({ "upload_id": "u1", "user_id": "alice", "analysis": ready_analysis() });
    let (_, created) = t.call(Method::POST, "/v1/analyses", Some(body)).await;
    let id = created["record"]["id"].as_str().unwrap().to_owned();

    let trigger = format!("/v1/analyses/{id}/inference");
    let refresh = format!("/v1/analyses/{id}/statuses/refresh");
    let (a, b, c, _, _, _) = tokio::join!(
        t.call(Method::POST, &trigger, None),
        t.call(Method::POST, &trigger, None),
        t.call(Method::POST, &trigger, None),
        t.call(Method::POST, &refresh, None),
        t.call(Method::POST, &refresh, None),
        t.call(Method::POST, &refresh, None),
    );
    let mut started: Vec<String> = [a, b, c]
        .iter()
        .flat_map(|(_, body)| body["started"].as_array().unwrap().clone())
        .filter_map(|id| id.as_str().map(str::to_owned))
        .collect();
    assert_eq!(started.len(), 3);

    let (_, stored) = t.call(Method::GET, &format!("/v1/analyses/{id}"), None).await;
    let mut recorded: Vec<String> = stored["analysis"]["triggered_inferences"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["workflow_id"].as_str().map(str::to_owned))
        .collect();
    started.sort();
    recorded.sort();
    assert_eq!(recorded, started);
}
