// Location model representing WGS84 coordinates

use std::fmt;
use std::str::FromStr;

use geo::{HaversineBearing, HaversineDistance, Point};
use serde::{Deserialize, Serialize};

use crate::error::RouteError;

/// Represents a location with latitude/longitude in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    /// Creates a new location with the given coordinates
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// geo point with x = longitude, y = latitude
    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    /// Great-circle distance in meters
    pub fn haversine_distance_to(&self, other: &Location) -> f64 {
        self.to_point().haversine_distance(&other.to_point())
    }

    /// Initial bearing towards `other`, degrees clockwise from north in `[0, 360)`
    pub fn bearing_to(&self, other: &Location) -> f64 {
        self.to_point().haversine_bearing(other.to_point()).rem_euclid(360.0)
    }

    /// Location displaced by the given meters north and east.
    /// Only meant for short offsets (synthetic networks, fixtures).
    pub fn offset_m(&self, north_m: f64, east_m: f64) -> Location {
        let lat = self.lat + north_m / METERS_PER_DEGREE;
        let lon = self.lon + east_m / (METERS_PER_DEGREE * self.lat.to_radians().cos());
        Location::new(lat, lon)
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

const METERS_PER_DEGREE: f64 = 111_320.0;

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

/// Parses `"lat,lon"`
impl FromStr for Location {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| RouteError::InvalidCoordinate(s.to_string()))?;
        let lat = lat
            .trim()
            .parse::<f64>()
            .map_err(|_| RouteError::InvalidCoordinate(s.to_string()))?;
        let lon = lon
            .trim()
            .parse::<f64>()
            .map_err(|_| RouteError::InvalidCoordinate(s.to_string()))?;

        let location = Location::new(lat, lon);
        if !location.is_valid() {
            return Err(RouteError::InvalidCoordinate(s.to_string()));
        }
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BENGALURU: Location = Location {
        lat: 12.9716,
        lon: 77.5946,
    };

    #[test]
    fn test_haversine_distance() {
        let north = Location::new(BENGALURU.lat + 0.01, BENGALURU.lon);
        let d = BENGALURU.haversine_distance_to(&north);

        assert!((d - 1112.0).abs() < 5.0, "got {}", d);
    }

    #[test]
    fn test_bearing() {
        let north = BENGALURU.offset_m(100.0, 0.0);
        let east = BENGALURU.offset_m(0.0, 100.0);
        let west = BENGALURU.offset_m(0.0, -100.0);

        let b = BENGALURU.bearing_to(&north);
        assert!(b < 0.5 || b > 359.5, "north bearing {}", b);
        assert!((BENGALURU.bearing_to(&east) - 90.0).abs() < 0.5);
        assert!((BENGALURU.bearing_to(&west) - 270.0).abs() < 0.5);
    }

    #[test]
    fn test_offset_distance() {
        let moved = BENGALURU.offset_m(300.0, 400.0);
        let d = BENGALURU.haversine_distance_to(&moved);

        assert!((d - 500.0).abs() < 2.0, "got {}", d);
    }

    #[test]
    fn test_parse() {
        let loc: Location = "12.9716, 77.5946".parse().unwrap();
        assert_eq!(loc, BENGALURU);

        assert!("12.9716".parse::<Location>().is_err());
        assert!("abc,77.5".parse::<Location>().is_err());
        assert!("95.0,77.5".parse::<Location>().is_err());
    }
}
