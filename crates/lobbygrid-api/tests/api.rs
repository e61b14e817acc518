//! Router-level tests through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use lobbygrid_api::build_router;
use lobbygrid_control::MemoryControlPlane;
use lobbygrid_pool::{PoolConfig, ResourcePool};
use lobbygrid_proxy::RoutingTable;
use lobbygrid_scheduler::{LogNotifier, Lobby, Orchestrator, OrchestratorConfig};

fn test_lobby(cp: Arc<MemoryControlPlane>) -> (Lobby, tokio::sync::watch::Sender<bool>) {
    let pool = Arc::new(ResourcePool::new(cp.clone(), PoolConfig::default()));
    let (tx, rx) = tokio::sync::watch::channel(false);
    let orchestrator = Orchestrator::new(cp, pool, RoutingTable::new(), OrchestratorConfig::default(), rx);
    (Lobby::new(Arc::new(orchestrator), Arc::new(LogNotifier)), tx)
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn api_list_games_empty() {
    let (lobby, _tx) = test_lobby(Arc::new(MemoryControlPlane::new()));
    let resp = build_router(lobby).oneshot(get("/api/v1/games")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], Value::Array(vec![]));
}

#[tokio::test]
async fn api_create_then_get_game() {
    let cp = Arc::new(MemoryControlPlane::new().with_auto_ready());
    let (lobby, _tx) = test_lobby(cp);
    let router = build_router(lobby.clone());

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/games")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"game": "hunter_vs_speedrunner", "requester": "alex"}"#))
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body = json_body(resp).await;
    assert_eq!(body["data"]["game"], "hunter_vs_speedrunner");

    // Creation completes on its own task.
    let mut id = None;
    for _ in 0..50 {
        if let Some(first) = lobby.list_joinable().into_iter().next() {
            id = Some(first);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let id = id.expect("game never became joinable");

    let resp = router.oneshot(get(&format!("/api/v1/games/{id}"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["data"]["id"], id);
    assert_eq!(body["data"]["state"], "running");
    assert!(body["data"]["endpoint"].is_string());
}

#[tokio::test]
async fn api_delete_game() {
    let cp = Arc::new(MemoryControlPlane::new().with_auto_ready());
    let (lobby, _tx) = test_lobby(cp);
    lobby
        .orchestrator()
        .create_instance(lobbygrid_core::GameType::BlockShuffle, "steve")
        .await
        .unwrap();
    let id = lobby.list_joinable().into_iter().next().unwrap();
    let router = build_router(lobby);

    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/games/{id}"))
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router.oneshot(get(&format!("/api/v1/games/{id}"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_rejects_unknown_game_type() {
    let (lobby, _tx) = test_lobby(Arc::new(MemoryControlPlane::new()));
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/games")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"game": "hide_and_seek"}"#))
        .unwrap();
    let resp = build_router(lobby).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = json_body(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("block_shuffle"));
}

#[tokio::test]
async fn api_lists_game_types() {
    let (lobby, _tx) = test_lobby(Arc::new(MemoryControlPlane::new()));
    let resp = build_router(lobby).oneshot(get("/api/v1/game-types")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["hunter_vs_speedrunner", "block_shuffle"]);
}

#[tokio::test]
async fn api_pool_status() {
    let (lobby, _tx) = test_lobby(Arc::new(MemoryControlPlane::new()));
    lobby.orchestrator().pool().reconcile(0).await.unwrap();

    let resp = build_router(lobby).oneshot(get("/api/v1/pool")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["data"]["generating"], 1);
    assert_eq!(body["data"]["target_size"], 10);
    assert_eq!(body["data"]["paused"], false);
}
