/// Utility functions
use crate::domain::{LatLng, StationProperties};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Join the non-empty address parts of a station
pub fn format_address(properties: &StationProperties) -> String {
    let address = &properties.address_info;
    [
        &address.title,
        &address.address_line1,
        &address.town,
        &address.state_or_province,
        &address.postcode,
    ]
    .into_iter()
    .filter_map(|part| part.as_deref())
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(", ")
}

/// Known connection powers of a station in kW
pub fn power_values(properties: &StationProperties) -> Vec<f64> {
    properties
        .connections
        .iter()
        .filter_map(|c| c.power_kw)
        .filter(|v| !v.is_nan())
        .collect()
}

/// Min and max connection power, `None` when no power is known
pub fn power_range(properties: &StationProperties) -> Option<(f64, f64)> {
    let values = power_values(properties);
    if values.is_empty() {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((min, max))
}

/// Human-readable power range such as `22–50 kW`
pub fn format_power_range(properties: &StationProperties) -> Option<String> {
    let (min, max) = power_range(properties)?;
    if min == max {
        return Some(format!("{} kW", min.round()));
    }
    Some(format!("{}–{} kW", min.round(), max.round()))
}

/// Parse a comma-joined id list, skipping anything that is not an integer
pub fn parse_ids(value: &str) -> Vec<i64> {
    value
        .split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

pub fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse an upstream timestamp in RFC 3339 or `YYYY-MM-DDTHH:MM:SS` form
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = value.parse::<DateTime<Utc>>() {
        return Some(dt);
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }
    None
}

pub fn google_directions_url(point: LatLng) -> String {
    format!(
        "https://www.google.com/maps/dir/?api=1&destination={},{}",
        point.lat, point.lng
    )
}

pub fn apple_directions_url(point: LatLng) -> String {
    format!("http://maps.apple.com/?daddr={},{}", point.lat, point.lng)
}
