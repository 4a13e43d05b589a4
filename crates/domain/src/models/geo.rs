//! Geographic primitives and viewport room keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use shared::geo::{from_e4, haversine_meters, to_e4};
use shared::validation::{validate_latitude, validate_longitude, validate_radius_meters};

use crate::error::ValidationError;

/// A `(lat, lng)` pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Checks that both coordinates are finite and within range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_latitude(self.lat).map_err(|e| ValidationError::from_field("lat", e))?;
        validate_longitude(self.lng).map_err(|e| ValidationError::from_field("lng", e))?;
        Ok(())
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        haversine_meters(self.lat, self.lng, other.lat, other.lng)
    }
}

/// Identity of a viewport room.
///
/// Latitude and longitude are rounded to 4 decimal places and the radius to
/// whole meters, so subscriptions that differ only by floating-point drift
/// land in the same room. Renders as `location:<lat>:<lng>:<radius>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomKey {
    lat_e4: i64,
    lng_e4: i64,
    radius_m: i64,
}

const ROOM_PREFIX: &str = "location";

impl RoomKey {
    /// Derives the room key for a circular region.
    pub fn new(center: GeoPoint, radius_meters: f64) -> Result<Self, ValidationError> {
        center.validate()?;
        validate_radius_meters(radius_meters)
            .map_err(|e| ValidationError::from_field("radius", e))?;

        Ok(Self {
            lat_e4: to_e4(center.lat),
            lng_e4: to_e4(center.lng),
            radius_m: radius_meters.round() as i64,
        })
    }

    /// Room center after rounding.
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(from_e4(self.lat_e4), from_e4(self.lng_e4))
    }

    /// Room radius in whole meters.
    pub fn radius_meters(&self) -> f64 {
        self.radius_m as f64
    }

    /// Whether `point` lies inside the room's circle. The boundary counts as inside.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.center().distance_meters(point) <= self.radius_meters()
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:.4}:{:.4}:{}",
            ROOM_PREFIX,
            from_e4(self.lat_e4),
            from_e4(self.lng_e4),
            self.radius_m
        )
    }
}

impl FromStr for RoomKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::new("room", format!("Malformed room key '{}'", s));

        let mut parts = s.split(':');
        if parts.next() != Some(ROOM_PREFIX) {
            return Err(invalid());
        }
        let lat: f64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let lng: f64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let radius: f64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Self::new(GeoPoint::new(lat, lng), radius)
    }
}

impl Serialize for RoomKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoomKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(lat: f64, lng: f64, radius: f64) -> RoomKey {
        RoomKey::new(GeoPoint::new(lat, lng), radius).unwrap()
    }

    #[test]
    fn test_room_key_format() {
        assert_eq!(
            key(13.0827, 80.2707, 1000.0).to_string(),
            "location:13.0827:80.2707:1000"
        );
        assert_eq!(
            key(-33.8688, 151.2093, 499.6).to_string(),
            "location:-33.8688:151.2093:500"
        );
    }

    #[test]
    fn test_room_key_stable_under_small_drift() {
        let base = key(13.0827, 80.2707, 1000.0);
        assert_eq!(base, key(13.082_701, 80.270_702, 1000.0));
        assert_eq!(base, key(13.082_74, 80.270_74, 1000.4));
    }

    #[test]
    fn test_room_key_changes_once_rounding_changes() {
        let base = key(13.0827, 80.2707, 1000.0);
        assert_ne!(base, key(13.082_76, 80.2707, 1000.0));
        assert_ne!(base, key(13.0827, 80.270_76, 1000.0));
        assert_ne!(base, key(13.0827, 80.2707, 1000.6));
    }

    #[test]
    fn test_room_key_rejects_invalid_input() {
        let center = GeoPoint::new(13.0827, 80.2707);
        assert!(RoomKey::new(center, 0.0).is_err());
        assert!(RoomKey::new(center, -5.0).is_err());
        assert!(RoomKey::new(center, f64::NAN).is_err());
        assert!(RoomKey::new(GeoPoint::new(f64::NAN, 80.0), 100.0).is_err());
        assert!(RoomKey::new(GeoPoint::new(95.0, 80.0), 100.0).is_err());

        let err = RoomKey::new(GeoPoint::new(13.0, 181.0), 100.0).unwrap_err();
        assert_eq!(err.field, "lng");
    }

    #[test]
    fn test_room_key_parses_its_own_rendering() {
        let original = key(13.5, 80.5, 500.0);
        let parsed: RoomKey = original.to_string().parse().unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.center(), GeoPoint::new(13.5, 80.5));
        assert_eq!(parsed.radius_meters(), 500.0);
    }

    #[test]
    fn test_room_key_parse_rejects_garbage() {
        assert!("incidents:all".parse::<RoomKey>().is_err());
        assert!("location:13.0:80.0".parse::<RoomKey>().is_err());
        assert!("location:13.0:80.0:100:extra".parse::<RoomKey>().is_err());
        assert!("location:abc:80.0:100".parse::<RoomKey>().is_err());
    }

    #[test]
    fn test_room_key_serializes_as_string() {
        let json = serde_json::to_string(&key(13.08, 80.27, 1000.0)).unwrap();
        assert_eq!(json, "\"location:13.0800:80.2700:1000\"");
    }

    #[test]
    fn test_contains_includes_boundary() {
        let room = key(13.0827, 80.2707, 1000.0);
        assert!(room.contains(&GeoPoint::new(13.0827, 80.2707)));
        assert!(room.contains(&GeoPoint::new(13.081, 80.271)));
        assert!(!room.contains(&GeoPoint::new(13.5, 80.5)));
    }
}
