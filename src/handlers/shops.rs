use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::entities::shop;
use crate::errors::{ApiError, ServiceError};
use crate::handlers::common::{map_service_error, success_response, validate_input};
use crate::services::geo::{
    self, format_distance, haversine_distance_km, GeoPoint, RawCoordinate,
};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/nearby", get(nearby_shops))
}

#[derive(Debug, Deserialize, Validate)]
struct NearbyQuery {
    #[validate(range(min = -90.0, max = 90.0))]
    latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    longitude: f64,
    #[serde(default = "default_radius_km")]
    #[validate(range(min = 0.1, max = 500.0))]
    radius_km: f64,
}

fn default_radius_km() -> f64 {
    10.0
}

#[derive(Debug, Serialize)]
struct NearbyShop {
    id: Uuid,
    name: String,
    address: String,
    phone: Option<String>,
    latitude: f64,
    longitude: f64,
    distance_km: f64,
    distance: String,
}

#[derive(Debug, Serialize)]
struct NearbyResponse {
    shops: Vec<NearbyShop>,
    total: usize,
}

/// Shops within the requested radius, nearest first. Shops whose stored
/// coordinates do not normalize to a valid point are left out rather than
/// failing the whole query.
async fn nearby_shops(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&query)?;

    let origin = GeoPoint::new(query.latitude, query.longitude).ok_or_else(|| {
        ApiError::ServiceError(ServiceError::ValidationError(
            "Invalid coordinates".to_string(),
        ))
    })?;

    let shops = shop::Entity::find()
        .all(&*state.db)
        .await
        .map_err(|e| map_service_error(ServiceError::DatabaseError(e)))?;

    let mut nearby: Vec<NearbyShop> = shops
        .into_iter()
        .filter_map(|s| {
            let lat = s.latitude.clone().map(RawCoordinate::Text);
            let lon = s.longitude.clone().map(RawCoordinate::Text);
            let point = geo::normalize_location(lat.as_ref(), lon.as_ref())?;
            let distance_km = haversine_distance_km(origin, point);
            if distance_km > query.radius_km {
                return None;
            }
            Some(NearbyShop {
                id: s.id,
                name: s.name,
                address: s.address,
                phone: s.phone,
                latitude: point.latitude,
                longitude: point.longitude,
                distance_km,
                distance: format_distance(distance_km),
            })
        })
        .collect();

    geo::sort_by_distance(&mut nearby, |s| Some(s.distance_km));

    let total = nearby.len();
    Ok(success_response(NearbyResponse {
        shops: nearby,
        total,
    }))
}
