/// Great-circle distance between two WGS-84 points, in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Great-circle distance in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_m(lat1, lon1, lat2, lon2) / 1000.0
}

/// An inclusive latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl GeoBounds {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.lat_min..=self.lat_max).contains(&lat) && (self.lon_min..=self.lon_max).contains(&lon)
    }
}

/// Continental Europe plus the Nordics.
pub const EUROPEAN_BOUNDS: GeoBounds = GeoBounds {
    lat_min: 35.0,
    lat_max: 71.0,
    lon_min: -10.0,
    lon_max: 31.0,
};

/// The narrower Nordic region.
pub const NORDIC_BOUNDS: GeoBounds = GeoBounds {
    lat_min: 54.0,
    lat_max: 71.0,
    lon_min: 4.0,
    lon_max: 31.0,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_same_point_is_zero() {
        let d = haversine_m(55.618, 12.650, 55.618, 12.650);
        assert!(d < 0.001, "same point should be 0m, got {d}");
    }

    #[test]
    fn haversine_copenhagen_to_aalborg() {
        // Kastrup to Aalborg Airport is ~236km
        let d = haversine_km(55.6181, 12.6508, 57.0928, 9.8492);
        assert!((d - 236.0).abs() < 10.0, "CPH to AAL should be ~236km, got {d}");
    }

    #[test]
    fn haversine_short_distance() {
        // Two points ~280m apart on the Kastrup apron
        let d = haversine_m(55.6181, 12.6508, 55.6181, 12.6553);
        assert!((100.0..500.0).contains(&d), "expected a few hundred meters, got {d}");
    }

    #[test]
    fn haversine_is_symmetric() {
        let a = haversine_m(55.618, 12.650, 59.911, 10.757);
        let b = haversine_m(59.911, 10.757, 55.618, 12.650);
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn european_bounds_contain_nordics_and_iberia() {
        assert!(EUROPEAN_BOUNDS.contains(55.676, 12.568)); // Copenhagen
        assert!(EUROPEAN_BOUNDS.contains(40.416, -3.703)); // Madrid
        assert!(!EUROPEAN_BOUNDS.contains(40.712, -74.006)); // New York
        assert!(!EUROPEAN_BOUNDS.contains(30.044, 31.235)); // Cairo (lat too low)
    }

    #[test]
    fn nordic_bounds_exclude_central_europe() {
        assert!(NORDIC_BOUNDS.contains(59.911, 10.757)); // Oslo
        assert!(!NORDIC_BOUNDS.contains(52.520, 13.405)); // Berlin
    }
}
