//! REST API handlers.
//!
//! Each handler calls into the `ClusterController` and returns JSON
//! wrapped in the common response envelope.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::debug;

use fleetgrid_core::{BlueprintId, ClusterId, ExtraProperties, PlacementSpec, ProjectionKind};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn not_found(id: &str) -> axum::response::Response {
    error_response(&format!("cluster not found: {id}"), StatusCode::NOT_FOUND).into_response()
}

// ── Clusters ───────────────────────────────────────────────────

/// GET /api/v1/clusters
pub async fn list_clusters(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.controller.list_clusters().await)
}

/// GET /api/v1/clusters/{id}
pub async fn get_cluster(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.controller.get_cluster(&id).await {
        Some(snapshot) => ApiResponse::ok(snapshot).into_response(),
        None => not_found(&id),
    }
}

/// Create request body.
#[derive(Debug, Deserialize)]
pub struct CreateClusterRequest {
    pub cluster_id: ClusterId,
    #[serde(default)]
    pub blueprint_id: Option<BlueprintId>,
    /// Projection kind name; overrides any kind in `spec`.
    pub projection: String,
    #[serde(default)]
    pub spec: PlacementSpec,
    #[serde(default)]
    pub extra_properties: ExtraProperties,
}

/// POST /api/v1/clusters
pub async fn create_cluster(
    State(state): State<ApiState>,
    Json(req): Json<CreateClusterRequest>,
) -> impl IntoResponse {
    if req.projection.trim().is_empty() {
        return error_response("projection kind is required", StatusCode::BAD_REQUEST)
            .into_response();
    }
    let spec = PlacementSpec {
        kind: Some(ProjectionKind::from(req.projection.as_str())),
        ..req.spec
    };

    match state
        .controller
        .create_cluster(
            &req.cluster_id,
            req.blueprint_id.as_deref(),
            spec,
            req.extra_properties,
        )
        .await
    {
        Ok(snapshot) => (StatusCode::CREATED, ApiResponse::ok(snapshot)).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response(),
    }
}

/// Lifecycle action request body.
#[derive(Debug, Deserialize)]
pub struct ClusterActionRequest {
    pub action: String,
}

/// PUT /api/v1/clusters/{id}
pub async fn cluster_action(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ClusterActionRequest>,
) -> impl IntoResponse {
    if state.controller.get_cluster(&id).await.is_none() {
        return not_found(&id);
    }

    match req.action.to_ascii_lowercase().as_str() {
        "start" => state.controller.start_cluster(&id).await,
        "stop" => state.controller.stop_cluster(&id).await,
        other => {
            debug!(cluster = %id, action = %other, "unknown cluster action");
            return error_response(&format!("unknown action: {other}"), StatusCode::NOT_FOUND)
                .into_response();
        }
    }

    match state.controller.get_cluster(&id).await {
        Some(snapshot) => ApiResponse::ok(snapshot).into_response(),
        None => not_found(&id),
    }
}

/// PATCH /api/v1/clusters/{id}
pub async fn modify_cluster(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(spec): Json<PlacementSpec>,
) -> impl IntoResponse {
    if state.controller.get_cluster(&id).await.is_none() {
        return not_found(&id);
    }

    if let Err(e) = state.controller.modify_cluster(&id, spec).await {
        return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }

    match state.controller.get_cluster(&id).await {
        Some(snapshot) => ApiResponse::ok(snapshot).into_response(),
        None => not_found(&id),
    }
}

/// DELETE /api/v1/clusters/{id}
pub async fn destroy_cluster(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.controller.get_cluster(&id).await.is_none() {
        return not_found(&id);
    }

    state.controller.destroy_cluster(&id).await;

    match state.controller.get_cluster(&id).await {
        None => ApiResponse::ok("destroyed").into_response(),
        Some(snapshot) => error_response(
            &format!("cluster {id} is {} and must be stopped first", snapshot.state),
            StatusCode::CONFLICT,
        )
        .into_response(),
    }
}

/// GET /api/v1/clusters/{id}/satisfy
pub async fn satisfy_state(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.controller.satisfy_state(&id).await {
        Some(satisfy) => ApiResponse::ok(satisfy).into_response(),
        None => not_found(&id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use fleetgrid_controller::{ClusterController, LaunchContext, ResourceProvider};
    use fleetgrid_core::{ResourceUnit, UnitId};
    use fleetgrid_grid::AllocationRequest;

    struct NoopProvider;

    #[async_trait]
    impl ResourceProvider for NoopProvider {
        async fn allocate(&self, _: &ClusterId, _: &AllocationRequest) -> anyhow::Result<()> {
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

    fn test_state() -> ApiState {
        ApiState {
            controller: ClusterController::new(Arc::new(NoopProvider)),
        }
    }

    fn create_request(id: &str, projection: &str) -> CreateClusterRequest {
        CreateClusterRequest {
            cluster_id: id.to_string(),
            blueprint_id: None,
            projection: projection.to_string(),
            spec: PlacementSpec {
                any: Some(2),
                ..PlacementSpec::default()
            },
            extra_properties: ExtraProperties::new(),
        }
    }

    #[tokio::test]
    async fn list_clusters_empty() {
        let resp = list_clusters(State(test_state())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_and_get_cluster() {
        let state = test_state();
        let resp = create_cluster(State(state.clone()), Json(create_request("c1", "any")))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = get_cluster(State(state), Path("c1".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_with_unknown_kind_is_bad_request() {
        let resp = create_cluster(State(test_state()), Json(create_request("c1", "spread")))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = create_cluster(State(test_state()), Json(create_request("c1", " ")))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_nonexistent_cluster() {
        let resp = get_cluster(State(test_state()), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_action_is_not_found() {
        let state = test_state();
        create_cluster(State(state.clone()), Json(create_request("c1", "any"))).await;

        let resp = cluster_action(
            State(state),
            Path("c1".to_string()),
            Json(ClusterActionRequest {
                action: "restart".into(),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn destroy_running_cluster_conflicts() {
        let state = test_state();
        create_cluster(State(state.clone()), Json(create_request("c1", "any"))).await;
        state.controller.start_cluster("c1").await;

        let resp = destroy_cluster(State(state.clone()), Path("c1".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        state.controller.stop_cluster("c1").await;
        let resp = destroy_cluster(State(state), Path("c1".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
