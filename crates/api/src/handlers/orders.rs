//! Handlers for the `/orders` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use validator::Validate;

use cascade_core::error::CoreError;
use cascade_core::types::DbId;
use cascade_db::models::order::{Order, OrderListQuery, ReportOrder};
use cascade_db::repositories::{DispatchAttemptRepo, OrderRepo};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

async fn find_order(pool: &sqlx::PgPool, order_id: DbId) -> AppResult<Order> {
    OrderRepo::find_by_id(pool, order_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Order",
            id: order_id,
        }))
}

/// POST /api/v1/orders/report
///
/// Create or update an order by name. When the reported status is
/// complete, the job's children are launched at most once per order
/// unless `force` is set. Returns 201 when the order was created, 200
/// otherwise; the body carries the order and a `cascade` summary.
pub async fn report_order(
    State(state): State<AppState>,
    Json(input): Json<ReportOrder>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let outcome = state.ledger.report(&input).await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(DataResponse { data: outcome })))
}

/// GET /api/v1/orders
///
/// Supports optional `job_id`, `status_id`, `upstream_order_id`, `limit`
/// and `offset`.
pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<OrderListQuery>,
) -> AppResult<impl IntoResponse> {
    let orders = OrderRepo::list(&state.pool, &params).await?;
    Ok(Json(DataResponse { data: orders }))
}

/// GET /api/v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let order = find_order(&state.pool, order_id).await?;
    Ok(Json(DataResponse { data: order }))
}

/// DELETE /api/v1/orders/{id}
///
/// Soft delete. Returns 204.
pub async fn delete_order(
    State(state): State<AppState>,
    Path(order_id): Path<DbId>,
) -> AppResult<StatusCode> {
    if OrderRepo::soft_delete(&state.pool, order_id).await? {
        tracing::info!(order_id, "Order deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Core(CoreError::NotFound {
            entity: "Order",
            id: order_id,
        }))
    }
}

/// GET /api/v1/orders/{id}/children
///
/// Orders created by this order's fan-outs, by generation.
pub async fn list_children(
    State(state): State<AppState>,
    Path(order_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    find_order(&state.pool, order_id).await?;
    let children = OrderRepo::list_children(&state.pool, order_id).await?;
    Ok(Json(DataResponse { data: children }))
}

/// GET /api/v1/orders/{id}/attempts
pub async fn list_attempts(
    State(state): State<AppState>,
    Path(order_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    find_order(&state.pool, order_id).await?;
    let attempts = DispatchAttemptRepo::list_for_order(&state.pool, order_id).await?;
    Ok(Json(DataResponse { data: attempts }))
}

/// POST /api/v1/orders/{id}/resubmit
///
/// Submit a running or failed order again under a new attempt. Returns
/// 502 if the backend refused the run.
pub async fn resubmit_order(
    State(state): State<AppState>,
    Path(order_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let resubmitted = state.engine.resubmit(order_id).await?;
    Ok(Json(DataResponse { data: resubmitted }))
}
