//! Route definitions for the inventory costing API

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/inventory", inventory_routes())
}

/// FIFO costing routes
fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/receive", post(handlers::receive_inventory))
        .route("/allocate", post(handlers::allocate_inventory))
        .route("/transfer", post(handlers::transfer_inventory))
        .route("/estimate-cost", post(handlers::estimate_cost))
        .route(
            "/available/:item_id/:location_id",
            get(handlers::get_available_quantity),
        )
        .route(
            "/layers/:item_id/:location_id",
            get(handlers::get_layer_breakdown),
        )
        .route(
            "/valuation/:item_id/:location_id",
            get(handlers::get_valuation),
        )
        .route(
            "/pending-allocations",
            get(handlers::list_pending_allocations),
        )
        .route(
            "/pending-allocations/:pending_id/cancel",
            post(handlers::cancel_pending_allocation),
        )
        .route(
            "/reconcile/:item_id/:location_id",
            post(handlers::reconcile_pending),
        )
        .route("/movements", get(handlers::list_movements))
}
