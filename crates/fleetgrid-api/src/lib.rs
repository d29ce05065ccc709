//! fleetgrid-api — REST API for FleetGrid.
//!
//! Thin axum layer over the [`ClusterController`] administrative API.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/clusters` | List all clusters |
//! | POST | `/api/v1/clusters` | Create a cluster |
//! | GET | `/api/v1/clusters/{id}` | Get cluster details |
//! | PUT | `/api/v1/clusters/{id}` | Start or stop a cluster |
//! | PATCH | `/api/v1/clusters/{id}` | Modify the placement spec |
//! | DELETE | `/api/v1/clusters/{id}` | Destroy a stopped cluster |
//! | GET | `/api/v1/clusters/{id}/satisfy` | Current allocation/eviction diff |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use fleetgrid_controller::ClusterController;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub controller: ClusterController,
}

/// Build the complete API router.
pub fn build_router(controller: ClusterController) -> Router {
    let api_state = ApiState { controller };

    let api_routes = Router::new()
        .route(
            "/clusters",
            get(handlers::list_clusters).post(handlers::create_cluster),
        )
        .route(
            "/clusters/{id}",
            get(handlers::get_cluster)
                .put(handlers::cluster_action)
                .patch(handlers::modify_cluster)
                .delete(handlers::destroy_cluster),
        )
        .route("/clusters/{id}/satisfy", get(handlers::satisfy_state))
        .with_state(api_state);

    Router::new().nest("/api/v1", api_routes)
}
