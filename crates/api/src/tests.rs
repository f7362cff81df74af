use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use engine::{EngineConfig, MemoryRepository, ProcessEngine};
use services::mock::{RecordingSink, StaticDirectory};

use super::{router, AppState};

fn app() -> Router {
    let directory = StaticDirectory::default()
        .with_user("kim", "Kim", Some("tooling"))
        .with_user("park", "Park", Some("quality"));
    let engine = ProcessEngine::new(
        Arc::new(MemoryRepository::new()),
        Arc::new(directory),
        Arc::new(RecordingSink::new()),
        EngineConfig::default(),
    );
    router(AppState::new(Arc::new(engine)))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

fn linear_graph() -> Value {
    json!({
        "nodes": [
            {"id": "s", "type": "start"},
            {"id": "a", "type": "task", "name": "Draft", "deadlineOffsetDays": 2},
            {"id": "b", "type": "task", "name": "Review", "taskType": "APPROVAL"},
            {"id": "e", "type": "end"}
        ],
        "edges": [
            {"id": "e1", "source": "s", "target": "a"},
            {"id": "e2", "source": "a", "target": "b"},
            {"id": "e3", "source": "b", "target": "e"}
        ]
    })
}

async fn create_template(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/templates",
        Some(json!({"title": "Release", "type": "PROJECT", "graph": linear_graph()})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_owned()
}

fn task_id(view: &Value, template: &str) -> String {
    view["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["taskTemplateId"] == template)
        .and_then(|t| t["id"].as_str())
        .unwrap()
        .to_owned()
}

#[tokio::test]
async fn healthz_returns_ok() {
    let (status, body) = send(&app(), "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn template_crud_round_trip() {
    let app = app();
    let id = create_template(&app).await;

    let (status, body) = send(&app, "GET", &format!("/templates/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tasks"][1]["predecessorIds"], "a");
    assert_eq!(body["tasks"][1]["predecessorMode"], "ALL");
    assert_eq!(body["graph"]["nodes"][1]["deadlineOffsetDays"], 2);

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/templates/{id}"),
        Some(json!({"title": "Release v2", "graph": linear_graph()})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Release v2");

    let (status, body) = send(&app, "GET", "/templates", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", &format!("/templates/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "GET", &format!("/templates/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn compile_preview_lists_violations() {
    let app = app();
    let graph = json!({
        "nodes": [
            {"id": "s", "type": "start"},
            {"id": "a", "type": "task"},
            {"id": "b", "type": "task"},
            {"id": "orphan", "type": "task"}
        ],
        "edges": [
            {"id": "e1", "source": "s", "target": "a"},
            {"id": "e2", "source": "a", "target": "b"},
            {"id": "e3", "source": "b", "target": "a"}
        ]
    });

    let (status, body) = send(&app, "POST", "/templates/compile", Some(graph)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["violations"].as_array().unwrap().len() >= 2);

    let (status, body) = send(&app, "POST", "/templates/compile", Some(linear_graph())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["linearized"], false);
    assert_eq!(body["tasks"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_node_type_is_rejected() {
    let graph = json!({"nodes": [{"id": "s", "type": "timer"}], "edges": []});
    let (status, _) = send(&app(), "POST", "/templates/compile", Some(graph)).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn process_lifecycle_over_http() {
    let app = app();
    let template_id = create_template(&app).await;

    let (status, started) = send(
        &app,
        "POST",
        "/processes",
        Some(json!({
            "templateId": template_id,
            "title": "Release 1.4",
            "startedById": "kim",
            "itemCode": "IT-14",
            "taskAssignees": [
                {"taskTemplateId": "a", "assigneeId": "kim"},
                {"taskTemplateId": "b", "assigneeId": "nobody"}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(started["instance"]["status"], "ACTIVE");
    assert_eq!(started["instance"]["itemCode"], "IT-14");
    assert_eq!(started["warnings"][0]["kind"], "missingAssignee");
    assert_eq!(started["progress"]["total"], 2);

    let id = started["instance"]["id"].as_str().unwrap().to_owned();
    let a = task_id(&started, "a");
    let b = task_id(&started, "b");

    // b waits on a.
    let (status, _) = send(&app, "POST", &format!("/processes/{id}/tasks/{b}/start"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, view) = send(&app, "POST", &format!("/processes/{id}/tasks/{a}/complete"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["progress"]["completed"], 1);

    // Approval tasks must be started before completion.
    let (status, _) = send(&app, "POST", &format!("/processes/{id}/tasks/{b}/complete"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send(&app, "POST", &format!("/processes/{id}/tasks/{b}/start"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, view) = send(&app, "POST", &format!("/processes/{id}/tasks/{b}/complete"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["instance"]["status"], "COMPLETED");
    assert_eq!(view["progress"]["allTerminal"], true);

    let (status, list) = send(&app, "GET", "/processes?status=completed", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "GET", "/processes?status=paused", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn stop_skip_and_resume_over_http() {
    let app = app();
    let template_id = create_template(&app).await;
    let (_, started) = send(
        &app,
        "POST",
        "/processes",
        Some(json!({"templateId": template_id, "title": "Release 1.5", "startedById": "kim"})),
    )
    .await;
    let id = started["instance"]["id"].as_str().unwrap().to_owned();
    let a = task_id(&started, "a");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/processes/{id}/stop"),
        Some(json!({"actorId": "kim", "stopType": "SUSPENDED", "reason": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("reason"));

    let (status, view) = send(
        &app,
        "POST",
        &format!("/processes/{id}/stop"),
        Some(json!({"actorId": "kim", "stopType": "SUSPENDED", "reason": "freeze"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["instance"]["stopReason"], "freeze");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/processes/{id}/tasks/{a}/skip"),
        Some(json!({"reason": "not needed"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/processes/{id}/resume"),
        Some(json!({"actorId": "kim"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, view) = send(&app, "POST", &format!("/processes/{id}/tasks/{a}/skip"), None).await;
    assert_eq!(status, StatusCode::OK);
    let skipped = view["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["taskTemplateId"] == "a")
        .unwrap();
    assert_eq!(skipped["status"], "SKIPPED");

    let (status, summary) = send(&app, "GET", "/assignees/progress", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(summary.is_array());
}

#[tokio::test]
async fn missing_process_is_404() {
    let uri = format!("/processes/{}", uuid::Uuid::new_v4());
    let (status, _) = send(&app(), "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
