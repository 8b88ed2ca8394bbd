use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::handlers::common::{map_service_error, success_response, validate_input};
use crate::errors::ApiError;
use crate::services::carts::AddCartItem;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/:item_id", delete(remove_item))
}

async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .carts
        .get_cart_with_items(user.customer_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

#[derive(Debug, Deserialize, Validate)]
struct AddItemRequest {
    pub product_id: Uuid,
    pub shop_id: Uuid,
    pub farmer_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub unit_label: String,
    pub unit_price: Decimal,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .carts
        .add_item(
            user.customer_id,
            AddCartItem {
                product_id: payload.product_id,
                shop_id: payload.shop_id,
                farmer_id: payload.farmer_id,
                name: payload.name,
                unit_label: payload.unit_label,
                unit_price: payload.unit_price,
                quantity: payload.quantity,
            },
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .carts
        .remove_item(user.customer_id, item_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .carts
        .clear_cart(user.customer_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}
