//! Route definitions for the `/orders` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::orders;
use crate::state::AppState;

/// Routes mounted at `/orders`.
///
/// ```text
/// GET    /                  -> list_orders
/// POST   /report            -> report_order
/// GET    /{id}              -> get_order
/// DELETE /{id}              -> delete_order
/// GET    /{id}/children     -> list_children
/// GET    /{id}/attempts     -> list_attempts
/// POST   /{id}/resubmit     -> resubmit_order
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list_orders))
        .route("/report", post(orders::report_order))
        .route("/{id}", get(orders::get_order).delete(orders::delete_order))
        .route("/{id}/children", get(orders::list_children))
        .route("/{id}/attempts", get(orders::list_attempts))
        .route("/{id}/resubmit", post(orders::resubmit_order))
}
