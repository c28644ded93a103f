pub mod health;
pub mod jobs;
pub mod orders;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs      job definitions, tags, templates, root launch
/// /orders    order ledger, status reports, resubmit
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/orders", orders::router())
}
