//! Route-level tests.
//!
//! Drive the full router with `oneshot` against a controller backed by a
//! provider that records allocation requests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower::ServiceExt;

use fleetgrid_api::build_router;
use fleetgrid_controller::{ClusterController, LaunchContext, ResourceProvider};
use fleetgrid_core::{ClusterId, ResourceUnit, UnitId};
use fleetgrid_grid::AllocationRequest;

#[derive(Default)]
struct RequestLog {
    requests: Mutex<HashMap<ClusterId, AllocationRequest>>,
}

#[async_trait]
impl ResourceProvider for RequestLog {
    async fn allocate(
        &self,
        cluster: &ClusterId,
        request: &AllocationRequest,
    ) -> anyhow::Result<()> {
        self.requests
            .lock()
            .await
            .insert(cluster.clone(), request.clone());
        Ok(())
    }

    async fn release(&self, _: &UnitId) -> anyhow::Result<()> {
        Ok(())
    }

    async fn launch(&self, _: &ResourceUnit, _: &LaunchContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn terminate(&self, _: &UnitId) -> anyhow::Result<()> {
        Ok(())
    }
}

fn setup() -> (Router, ClusterController, Arc<RequestLog>) {
    let provider = Arc::new(RequestLog::default());
    let controller = ClusterController::new(provider.clone());
    (build_router(controller.clone()), controller, provider)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create(router: &Router, id: &str, spec: Value) -> StatusCode {
    let req = json_request(
        "POST",
        "/api/v1/clusters",
        json!({ "cluster_id": id, "projection": "any", "spec": spec }),
    );
    router.clone().oneshot(req).await.unwrap().status()
}

#[tokio::test]
async fn create_start_and_inspect() {
    let (router, _controller, provider) = setup();
    assert_eq!(create(&router, "c1", json!({ "any": 2 })).await, StatusCode::CREATED);

    let req = json_request("PUT", "/api/v1/clusters/c1", json!({ "action": "start" }));
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["state"], "RUNNING");
    assert_eq!(body["data"]["kind"], "any");

    assert_eq!(provider.requests.lock().await["c1"].any, 2);

    let resp = router.clone().oneshot(get("/api/v1/clusters")).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["data"]["c1"]["spec"]["any"], 2);

    let resp = router.oneshot(get("/api/v1/clusters/c1/satisfy")).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["data"]["allocation"]["any"], 2);
    assert_eq!(body["data"]["evictions"], json!([]));
}

#[tokio::test]
async fn duplicate_create_is_bad_request() {
    let (router, _controller, _provider) = setup();
    assert_eq!(create(&router, "c1", json!({ "any": 1 })).await, StatusCode::CREATED);
    assert_eq!(create(&router, "c1", json!({ "any": 1 })).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patch_modifies_spec() {
    let (router, controller, provider) = setup();
    create(&router, "c1", json!({ "any": 1 })).await;
    controller.start_cluster("c1").await;

    let req = json_request("PATCH", "/api/v1/clusters/c1", json!({ "any": 4 }));
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["data"]["spec"]["any"], 4);
    assert_eq!(provider.requests.lock().await["c1"].any, 4);

    let req = json_request(
        "PATCH",
        "/api/v1/clusters/c1",
        json!({ "kind": "nodes", "nodes": { "h1": 1 } }),
    );
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["success"], false);
}

#[tokio::test]
async fn stop_then_delete() {
    let (router, controller, _provider) = setup();
    create(&router, "c1", json!({ "any": 1 })).await;
    controller.start_cluster("c1").await;

    let req = json_request("PUT", "/api/v1/clusters/c1", json!({ "action": "stop" }));
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(body_json(resp).await["data"]["state"], "STOPPED");

    let req = Request::builder()
        .method("DELETE")
        .uri("/api/v1/clusters/c1")
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router.oneshot(get("/api/v1/clusters/c1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_cluster_routes_are_not_found() {
    let (router, _controller, _provider) = setup();

    let req = json_request("PUT", "/api/v1/clusters/nope", json!({ "action": "start" }));
    assert_eq!(router.clone().oneshot(req).await.unwrap().status(), StatusCode::NOT_FOUND);

    let req = json_request("PATCH", "/api/v1/clusters/nope", json!({ "any": 1 }));
    assert_eq!(router.clone().oneshot(req).await.unwrap().status(), StatusCode::NOT_FOUND);

    let resp = router.oneshot(get("/api/v1/clusters/nope/satisfy")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["success"], false);
}
