// src/geo.rs
//
// Small geodesy helpers shared by reconstruction, the limit cache and clustering.

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Cache cells are coordinates rounded to 4 decimals (~11 m).
const CELL_SCALE: f64 = 10_000.0;

/// Great-circle distance between two WGS84 points, in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Planar distance in degrees. Only meaningful for short ranges.
pub fn degree_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    ((lat2 - lat1).powi(2) + (lon2 - lon1).powi(2)).sqrt()
}

/// Rejects non-finite, out-of-range and exact (0, 0) fixes. Trackers emit
/// (0, 0) when they have no satellite lock.
pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
        && !(lat == 0.0 && lon == 0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    lat_e4: i64,
    lon_e4: i64,
}

impl CellKey {
    pub fn from_coordinate(lat: f64, lon: f64) -> Self {
        Self {
            lat_e4: (lat * CELL_SCALE).round() as i64,
            lon_e4: (lon * CELL_SCALE).round() as i64,
        }
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.4},{:.4}",
            self.lat_e4 as f64 / CELL_SCALE,
            self.lon_e4 as f64 / CELL_SCALE
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_km(0.0, 10.0, 1.0, 10.0);
        assert!((d - 111.195).abs() < 0.01, "got {}", d);
    }

    #[test]
    fn test_haversine_same_point_is_zero() {
        assert_eq!(haversine_km(-12.05, -77.04, -12.05, -77.04), 0.0);
    }

    #[test]
    fn test_cell_key_rounds_to_four_decimals() {
        assert_eq!(
            CellKey::from_coordinate(-12.04641, -77.04279),
            CellKey::from_coordinate(-12.04639, -77.04281)
        );
        assert_ne!(
            CellKey::from_coordinate(-12.0464, -77.0428),
            CellKey::from_coordinate(-12.0466, -77.0428)
        );
        assert_eq!(
            CellKey::from_coordinate(-12.04641, -77.04279).to_string(),
            "-12.0464,-77.0428"
        );
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(is_valid_coordinate(-12.05, -77.04));
        assert!(!is_valid_coordinate(0.0, 0.0));
        assert!(!is_valid_coordinate(91.0, 0.5));
        assert!(!is_valid_coordinate(10.0, f64::NAN));
        assert!(!is_valid_coordinate(10.0, -180.5));
    }
}
