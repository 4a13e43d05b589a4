//! Common validation utilities.

use validator::ValidationError;

/// Validates that a latitude value is within valid range (-90 to 90).
///
/// Non-finite values fail the range check.
pub fn validate_latitude(lat: f64) -> Result<(), ValidationError> {
    if (-90.0..=90.0).contains(&lat) {
        Ok(())
    } else {
        let mut err = ValidationError::new("latitude_range");
        err.message = Some("Latitude must be between -90 and 90".into());
        Err(err)
    }
}

/// Validates that a longitude value is within valid range (-180 to 180).
pub fn validate_longitude(lon: f64) -> Result<(), ValidationError> {
    if (-180.0..=180.0).contains(&lon) {
        Ok(())
    } else {
        let mut err = ValidationError::new("longitude_range");
        err.message = Some("Longitude must be between -180 and 180".into());
        Err(err)
    }
}

/// Validates a subscription radius: finite and large enough to survive
/// integer rounding (a radius that rounds to 0 m would describe no area).
pub fn validate_radius_meters(radius: f64) -> Result<(), ValidationError> {
    if radius.is_finite() && radius >= 0.5 {
        Ok(())
    } else {
        let mut err = ValidationError::new("radius_range");
        err.message = Some("Radius must be a positive number of meters".into());
        Err(err)
    }
}

/// Validates that accuracy is non-negative.
pub fn validate_accuracy(accuracy: f64) -> Result<(), ValidationError> {
    if accuracy >= 0.0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("accuracy_range");
        err.message = Some("Accuracy must be non-negative".into());
        Err(err)
    }
}

/// Validates that an incident severity is within 1 to 5.
pub fn validate_severity(severity: u8) -> Result<(), ValidationError> {
    if (1..=5).contains(&severity) {
        Ok(())
    } else {
        let mut err = ValidationError::new("severity_range");
        err.message = Some("Severity must be between 1 and 5".into());
        Err(err)
    }
}

/// Validates a local hour of day (0 to 23).
pub fn validate_local_hour(hour: u32) -> Result<(), ValidationError> {
    if hour <= 23 {
        Ok(())
    } else {
        let mut err = ValidationError::new("local_hour_range");
        err.message = Some("Invalid local_hour. Must be between 0-23.".into());
        Err(err)
    }
}
