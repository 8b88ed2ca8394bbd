use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::order::OrderStatus;
use crate::errors::{ApiError, ServiceError};
use crate::handlers::common::{map_service_error, success_response, PaginationParams};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_my_orders))
        .route("/:id", get(get_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/status", put(update_order_status))
        .route("/by-number/:order_number", get(get_order_by_number))
}

async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let list = state
        .services
        .orders
        .list_orders_for_customer(user.customer_id, pagination.page, pagination.per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(list))
}

async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .get_order(id)
        .await
        .map_err(map_service_error)?;
    ensure_owner(&order.customer_id, &user)?;
    Ok(success_response(order))
}

async fn get_order_by_number(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .get_order_by_number(&order_number)
        .await
        .map_err(map_service_error)?;
    ensure_owner(&order.customer_id, &user)?;
    Ok(success_response(order))
}

async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .get_order(id)
        .await
        .map_err(map_service_error)?;
    ensure_owner(&order.customer_id, &user)?;

    let order = state
        .services
        .orders
        .cancel_order(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: OrderStatus,
}

async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .get_order(id)
        .await
        .map_err(map_service_error)?;
    ensure_owner(&order.customer_id, &user)?;

    let order = state
        .services
        .orders
        .update_order_status(id, payload.status)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

/// Orders are visible only to the customer who placed them. Reported as
/// NotFound so the route does not leak order existence.
fn ensure_owner(owner: &Uuid, user: &AuthUser) -> Result<(), ApiError> {
    if *owner == user.customer_id {
        Ok(())
    } else {
        Err(ApiError::ServiceError(ServiceError::NotFound(
            "Order not found".to_string(),
        )))
    }
}
