mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use common::Harness;
use grid_study::api;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn app(h: &Harness) -> Router {
    api::router(h.state.clone(), &h.state.cfg)
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("userId", "alice");
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn node_uri(h: &Harness, node: Uuid, tail: &str) -> String {
    format!(
        "/v1/studies/{}/root-networks/{}/nodes/{}/{}",
        h.study.study_uuid, h.study.root_network.id, node, tail
    )
}

#[tokio::test]
async fn healthz_answers() {
    let h = Harness::new();
    let (status, _) = send(app(&h), request(Method::GET, "/v1/healthz", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn create_study_returns_root_and_root_network() {
    let h = Harness::new();
    let body = json!({ "networkUuid": Uuid::new_v4(), "caseUuid": Uuid::new_v4() });
    let (status, created) = send(app(&h), request(Method::POST, "/v1/studies", Some(body))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["rootNode"]["type"], "ROOT");
    assert_eq!(created["rootNetwork"]["name"], "base");

    let tree_uri = format!("/v1/studies/{}/tree", created["studyUuid"].as_str().unwrap());
    let (status, tree) = send(app(&h), request(Method::GET, &tree_uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tree.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn run_on_root_is_forbidden_with_a_code() {
    let h = Harness::new();
    let uri = node_uri(&h, h.root(), "loadflow/run");
    let (status, body) = send(app(&h), request(Method::POST, &uri, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "ROOT_NODE_NOT_COMPUTABLE");
}

#[tokio::test]
async fn run_needs_a_user() {
    let h = Harness::new();
    let req = Request::builder()
        .method(Method::POST)
        .uri(node_uri(&h, h.n1, "loadflow/run"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app(&h), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_computation_is_not_found() {
    let h = Harness::new();
    let uri = node_uri(&h, h.n1, "crystal-ball/run");
    let (status, _) = send(app(&h), request(Method::POST, &uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn run_status_and_result_over_http() {
    let h = Harness::new();
    let (status, _) = send(app(&h), request(Method::GET, &node_uri(&h, h.n1, "security-analysis/status"), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(
        app(&h),
        request(Method::POST, &node_uri(&h, h.n1, "security-analysis/run"), Some(json!({"k": 1}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let result_uuid = body["resultUuid"].as_str().unwrap().to_string();

    let (status, body) = send(app(&h), request(Method::POST, &node_uri(&h, h.n1, "security-analysis/run"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "SECURITY_ANALYSIS_NOT_RUNNABLE");

    let (status, body) = send(app(&h), request(Method::GET, &node_uri(&h, h.n1, "security-analysis/status"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "RUNNING");

    let uri = node_uri(&h, h.n1, "security-analysis/result?page=2");
    let (status, body) = send(app(&h), request(Method::GET, &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resultUuid"], result_uuid);
    assert_eq!(body["query"]["page"], "2");
}

#[tokio::test]
async fn bus_ingress_accepts_known_destinations() {
    let h = Harness::new();
    let message = json!({ "headers": { "resultUuid": Uuid::new_v4().to_string() } });
    let (status, _) = send(
        app(&h),
        request(Method::POST, "/v1/bus/loadflow.result", Some(message.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _) = send(app(&h), request(Method::POST, "/v1/bus/nowhere.result", Some(message))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn supervision_count_and_dry_run() {
    let h = Harness::new();
    h.state
        .orchestrator
        .run(h.ctx(h.n1), grid_study::domain::ComputationType::ShortCircuit, "alice", None)
        .await
        .unwrap();

    let (status, body) = send(
        app(&h),
        request(Method::GET, "/v1/supervision/computation/results/count?type=SHORT_CIRCUIT", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body) = send(
        app(&h),
        request(
            Method::DELETE,
            "/v1/supervision/computation/results?type=SHORT_CIRCUIT&dryRun=true",
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert!(h.slot(h.n1, grid_study::domain::ComputationType::ShortCircuit).is_some());
}

#[tokio::test]
async fn parameters_round_trip_and_notify() {
    let mut h = Harness::new();
    let uri = format!("/v1/studies/{}/loadflow/parameters", h.study.study_uuid);
    let (status, _) = send(app(&h), request(Method::GET, &uri, None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(app(&h), request(Method::POST, &uri, Some(json!({"dc": true})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.drain(), vec!["loadflow_parameters"]);

    let (status, body) = send(app(&h), request(Method::GET, &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"dc": true}));
}

#[tokio::test]
async fn tree_edits_over_http() {
    let h = Harness::new();
    let insert = format!(
        "/v1/studies/{}/tree/nodes/{}?mode=AFTER",
        h.study.study_uuid, h.n1
    );
    let (status, node) = send(
        app(&h),
        request(Method::POST, &insert, Some(json!({"name": "mid", "subtype": "SECURITY"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(node["children"][0], h.n2.to_string());

    let (status, _) = send(
        app(&h),
        request(Method::POST, &insert, Some(json!({"name": ""}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        app(&h),
        request(Method::GET, &node_uri(&h, h.n2, "build-status"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["buildStatus"], "NOT_BUILT");
}
