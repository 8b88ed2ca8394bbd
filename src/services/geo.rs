use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Coordinate value as it arrives from upstream: sometimes a number,
/// sometimes a string. Normalized once at the service boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCoordinate {
    Number(f64),
    Text(String),
}

impl RawCoordinate {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawCoordinate::Number(n) => Some(*n),
            RawCoordinate::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

/// Validated point on the globe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if is_valid_location(latitude, longitude) {
            Some(Self {
                latitude,
                longitude,
            })
        } else {
            None
        }
    }
}

/// Range-checks a coordinate pair. NaN and infinities fail both bounds.
pub fn is_valid_location(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

/// Turns a raw (possibly string-typed, possibly absent) coordinate pair into
/// a validated point. Returns None for missing, unparseable, or out-of-range
/// values; callers treat such records as location-less rather than failing.
pub fn normalize_location(
    latitude: Option<&RawCoordinate>,
    longitude: Option<&RawCoordinate>,
) -> Option<GeoPoint> {
    let lat = latitude?.as_f64()?;
    let lon = longitude?.as_f64()?;
    GeoPoint::new(lat, lon)
}

/// Great-circle distance between two points via the haversine formula.
pub fn haversine_distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Human-readable distance: meters below 1 km, otherwise one decimal of km.
pub fn format_distance(km: f64) -> String {
    if km < 1.0 {
        format!("{}m", (km * 1000.0).round() as i64)
    } else {
        format!("{:.1}km", km)
    }
}

/// Sorts items nearest-first by an optional distance. Items without a
/// distance sort after items that have one; the sort is stable, so ties
/// and distance-less items keep their incoming order.
pub fn sort_by_distance<T, F>(items: &mut [T], distance_of: F)
where
    F: Fn(&T) -> Option<f64>,
{
    items.sort_by(|a, b| match (distance_of(a), distance_of(b)) {
        (Some(da), Some(db)) => da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn distance_to_self_is_zero() {
        let p = point(23.8103, 90.4125);
        assert!(haversine_distance_km(p, p).abs() < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let dhaka = point(23.8103, 90.4125);
        let chittagong = point(22.3569, 91.7832);
        let d1 = haversine_distance_km(dhaka, chittagong);
        let d2 = haversine_distance_km(chittagong, dhaka);
        assert!((d1 - d2).abs() < 1e-9);
    }

    #[test]
    fn dhaka_to_chittagong_is_about_214_km() {
        let dhaka = point(23.8103, 90.4125);
        let chittagong = point(22.3569, 91.7832);
        let d = haversine_distance_km(dhaka, chittagong);
        assert!((d - 214.0).abs() < 5.0, "got {}", d);
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        assert!(!is_valid_location(91.0, 0.0));
        assert!(!is_valid_location(-91.0, 0.0));
        assert!(!is_valid_location(0.0, 181.0));
        assert!(!is_valid_location(0.0, -181.0));
        assert!(!is_valid_location(f64::NAN, 0.0));
        assert!(!is_valid_location(0.0, f64::INFINITY));
        assert!(is_valid_location(90.0, 180.0));
        assert!(is_valid_location(-90.0, -180.0));
    }

    #[test]
    fn normalize_accepts_string_and_numeric_forms() {
        let lat = RawCoordinate::Text(" 23.8103 ".to_string());
        let lon = RawCoordinate::Number(90.4125);
        let p = normalize_location(Some(&lat), Some(&lon)).unwrap();
        assert!((p.latitude - 23.8103).abs() < 1e-9);
        assert!((p.longitude - 90.4125).abs() < 1e-9);
    }

    #[test]
    fn normalize_rejects_garbage_and_missing() {
        let bad = RawCoordinate::Text("not-a-number".to_string());
        let lon = RawCoordinate::Number(90.0);
        assert!(normalize_location(Some(&bad), Some(&lon)).is_none());
        assert!(normalize_location(None, Some(&lon)).is_none());
        let oob = RawCoordinate::Number(123.0);
        assert!(normalize_location(Some(&oob), Some(&lon)).is_none());
    }

    #[test]
    fn format_distance_switches_units_at_one_km() {
        assert_eq!(format_distance(0.25), "250m");
        assert_eq!(format_distance(0.5), "500m");
        assert_eq!(format_distance(0.9994), "999m");
        assert_eq!(format_distance(1.0), "1.0km");
        assert_eq!(format_distance(12.34), "12.3km");
    }

    #[test]
    fn sort_by_distance_is_stable_and_nearest_first() {
        let mut items = vec![
            ("far", Some(10.0)),
            ("near-a", Some(5.0)),
            ("near-b", Some(5.0)),
        ];
        sort_by_distance(&mut items, |i| i.1);
        let names: Vec<_> = items.iter().map(|i| i.0).collect();
        assert_eq!(names, vec!["near-a", "near-b", "far"]);
    }

    #[test]
    fn sort_by_distance_puts_unknown_distances_last_in_input_order() {
        let mut items = vec![
            ("unknown-a", None),
            ("far", Some(10.0)),
            ("unknown-b", None),
            ("near", Some(5.0)),
        ];
        sort_by_distance(&mut items, |i| i.1);
        let names: Vec<_> = items.iter().map(|i| i.0).collect();
        assert_eq!(names, vec!["near", "far", "unknown-a", "unknown-b"]);
    }
}
