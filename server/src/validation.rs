//! Field-level validation shared by C1's `Create`/`Update` entry points
//! (spec §9: ORM "virtual property" validation hooks move here).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::FieldError;

static ZIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}(-\d{4})?$").unwrap());

pub fn validate_title(title: &str, errors: &mut Vec<FieldError>) {
    let len = title.chars().count();
    if !(5..=100).contains(&len) {
        errors.push(FieldError::new(
            "title",
            "must be between 5 and 100 characters",
        ));
    }
}

pub fn validate_description(description: &str, errors: &mut Vec<FieldError>) {
    let len = description.chars().count();
    if !(10..=1000).contains(&len) {
        errors.push(FieldError::new(
            "description",
            "must be between 10 and 1000 characters",
        ));
    }
}

pub fn validate_zip(zip_code: &str, errors: &mut Vec<FieldError>) {
    if !ZIP_RE.is_match(zip_code) {
        errors.push(FieldError::new("zip_code", "must match ddddd or ddddd-dddd"));
    }
}

pub fn validate_lat_lon(lat: Option<f64>, lon: Option<f64>, errors: &mut Vec<FieldError>) {
    match (lat, lon) {
        (Some(lat), Some(lon)) => {
            if !(-90.0..=90.0).contains(&lat) {
                errors.push(FieldError::new("lat", "must be between -90 and 90"));
            }
            if !(-180.0..=180.0).contains(&lon) {
                errors.push(FieldError::new("lon", "must be between -180 and 180"));
            }
        }
        (Some(_), None) | (None, Some(_)) => {
            errors.push(FieldError::new(
                "location",
                "lat and lon must be provided together",
            ));
        }
        (None, None) => {}
    }
}

pub fn clamp_radius_miles(radius_miles: f64) -> f64 {
    radius_miles.clamp(1.0, 100.0)
}

pub fn validate_pickup_date(
    preferred_pickup_date: Option<chrono::DateTime<chrono::Utc>>,
    now: chrono::DateTime<chrono::Utc>,
    errors: &mut Vec<FieldError>,
) {
    if let Some(date) = preferred_pickup_date {
        if date <= now {
            errors.push(FieldError::new(
                "preferred_pickup_date",
                "must be in the future",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn title_length_bounds() {
        let mut errors = Vec::new();
        validate_title("tiny", &mut errors);
        assert_eq!(errors.len(), 1);

        let mut errors = Vec::new();
        validate_title("a".repeat(101).as_str(), &mut errors);
        assert_eq!(errors.len(), 1);

        let mut errors = Vec::new();
        validate_title("a perfectly fine title", &mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn description_length_bounds() {
        let mut errors = Vec::new();
        validate_description("too short", &mut errors);
        assert_eq!(errors.len(), 1);

        let mut errors = Vec::new();
        validate_description("long enough description text", &mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn zip_accepts_five_and_nine_digit_forms() {
        let mut errors = Vec::new();
        validate_zip("94107", &mut errors);
        validate_zip("94107-1234", &mut errors);
        assert!(errors.is_empty());

        let mut errors = Vec::new();
        validate_zip("not-a-zip", &mut errors);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn lat_lon_must_be_in_range_and_paired() {
        let mut errors = Vec::new();
        validate_lat_lon(Some(91.0), Some(0.0), &mut errors);
        assert_eq!(errors.len(), 1);

        let mut errors = Vec::new();
        validate_lat_lon(Some(0.0), Some(-181.0), &mut errors);
        assert_eq!(errors.len(), 1);

        let mut errors = Vec::new();
        validate_lat_lon(Some(10.0), None, &mut errors);
        assert_eq!(errors.len(), 1);

        let mut errors = Vec::new();
        validate_lat_lon(None, None, &mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn radius_clamped_to_one_through_one_hundred_miles() {
        assert_eq!(clamp_radius_miles(0.0), 1.0);
        assert_eq!(clamp_radius_miles(50.0), 50.0);
        assert_eq!(clamp_radius_miles(500.0), 100.0);
    }

    #[test]
    fn pickup_date_must_be_strictly_future() {
        let now = chrono::Utc::now();
        let mut errors = Vec::new();
        validate_pickup_date(Some(now - Duration::days(1)), now, &mut errors);
        assert_eq!(errors.len(), 1);

        let mut errors = Vec::new();
        validate_pickup_date(Some(now + Duration::days(1)), now, &mut errors);
        assert!(errors.is_empty());
    }
}
