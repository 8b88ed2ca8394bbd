use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};

use crate::auth::AuthUser;
use crate::errors::ApiError;
use crate::handlers::common::{created_response, map_service_error};
use crate::services::checkout::PlaceOrderRequest;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(place_order))
}

async fn place_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .services
        .checkout
        .place_order(user.customer_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(result))
}
