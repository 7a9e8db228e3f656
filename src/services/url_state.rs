/// Shareable URL state: filters, viewport, mode and selection as query parameters
use crate::config::MapDefaults;
use crate::domain::{FilterState, LatLng, MapViewport, StationFeature};
use crate::utils::{join_ids, parse_ids};
use url::form_urlencoded;

/// Public path of the charging-station map
pub const MAP_PATH: &str = "/albania-charging-stations";

/// Zoom used for links that point at one station
pub const SHARE_ZOOM: u8 = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct UrlState {
    pub viewport: MapViewport,
    pub filters: FilterState,
    pub auto_update: bool,
    pub selected: Option<i64>,
}

impl UrlState {
    /// Seed state from a query string; malformed values fall back to defaults
    pub fn parse(query: &str, defaults: &MapDefaults) -> Self {
        let mut lat = None;
        let mut lng = None;
        let mut zoom = None;
        let mut filters = FilterState::default();
        let mut auto_update = true;
        let mut selected = None;

        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "lat" => lat = parse_finite(&value),
                "lng" => lng = parse_finite(&value),
                "z" => zoom = value.trim().parse::<i64>().ok(),
                "q" => filters.search = value.into_owned(),
                "operators" => filters.operator_ids = parse_ids(&value),
                "connections" => filters.connection_type_ids = parse_ids(&value),
                "levels" => filters.level_ids = parse_ids(&value),
                "usage" => filters.usage_type_ids = parse_ids(&value),
                "status" => filters.status_type_ids = parse_ids(&value),
                "open" => filters.operational_only = value == "1",
                "minkw" => filters.power_min = parse_finite(&value),
                "maxkw" => filters.power_max = parse_finite(&value),
                "auto" => auto_update = value != "false",
                "poi" => selected = value.trim().parse::<i64>().ok(),
                _ => {}
            }
        }

        let zoom = zoom
            .map(|z| z.clamp(defaults.min_zoom as i64, defaults.max_zoom as i64) as u8)
            .unwrap_or(defaults.zoom);

        Self {
            viewport: MapViewport {
                center: LatLng::new(
                    lat.unwrap_or(defaults.center.lat),
                    lng.unwrap_or(defaults.center.lng),
                ),
                zoom,
            },
            filters,
            auto_update,
            selected,
        }
    }

    /// Serialize in a fixed key order so equal states give equal strings
    pub fn to_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("lat", &format!("{:.5}", self.viewport.center.lat));
        query.append_pair("lng", &format!("{:.5}", self.viewport.center.lng));
        query.append_pair("z", &self.viewport.zoom.to_string());
        append_filters(&mut query, &self.filters);
        if !self.auto_update {
            query.append_pair("auto", "false");
        }
        if let Some(id) = self.selected {
            query.append_pair("poi", &id.to_string());
        }
        query.finish()
    }
}

fn append_filters(query: &mut form_urlencoded::Serializer<'_, String>, filters: &FilterState) {
    if !filters.search.is_empty() {
        query.append_pair("q", &filters.search);
    }
    let facets = [
        ("operators", &filters.operator_ids),
        ("connections", &filters.connection_type_ids),
        ("levels", &filters.level_ids),
        ("usage", &filters.usage_type_ids),
        ("status", &filters.status_type_ids),
    ];
    for (key, ids) in facets {
        if !ids.is_empty() {
            query.append_pair(key, &join_ids(ids));
        }
    }
    if filters.operational_only {
        query.append_pair("open", "1");
    }
    if let Some(min) = filters.power_min {
        query.append_pair("minkw", &min.to_string());
    }
    if let Some(max) = filters.power_max {
        query.append_pair("maxkw", &max.to_string());
    }
}

fn parse_finite(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Absolute link centred on one station with the current filters applied
pub fn share_url(
    origin: &str,
    station: &StationFeature,
    filters: &FilterState,
    auto_update: bool,
) -> Option<String> {
    let position = station.position()?;
    let state = UrlState {
        viewport: MapViewport {
            center: position,
            zoom: SHARE_ZOOM,
        },
        filters: filters.clone(),
        auto_update,
        selected: Some(station.id()),
    };
    Some(format!("{}{}?{}", origin, MAP_PATH, state.to_query()))
}

/// Mirrors state into the address bar, skipping writes that change nothing
pub struct UrlSync {
    current: String,
    writes: u64,
}

impl UrlSync {
    pub fn new(initial_query: &str) -> Self {
        Self {
            current: initial_query.trim_start_matches('?').to_string(),
            writes: 0,
        }
    }

    /// New query when it differs from the current one
    pub fn update(&mut self, state: &UrlState) -> Option<&str> {
        let next = state.to_query();
        if next == self.current {
            return None;
        }
        self.current = next;
        self.writes += 1;
        Some(&self.current)
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Number of history replacements performed
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::StationBuilder;

    fn defaults() -> MapDefaults {
        MapDefaults::default()
    }

    #[test]
    fn test_empty_query_uses_defaults() {
        let state = UrlState::parse("", &defaults());
        assert_eq!(state.viewport.center, LatLng::new(41.3275, 19.8187));
        assert_eq!(state.viewport.zoom, 8);
        assert!(state.auto_update);
        assert_eq!(state.filters, FilterState::default());
        assert_eq!(state.selected, None);
    }

    #[test]
    fn test_search_and_operator_round_trip() {
        let filters = FilterState {
            search: "tirana".to_string(),
            operator_ids: vec![3, 7],
            ..FilterState::default()
        };
        let state = UrlState {
            viewport: MapViewport {
                center: LatLng::new(41.3275, 19.8187),
                zoom: 8,
            },
            filters: filters.clone(),
            auto_update: true,
            selected: None,
        };

        let query = state.to_query();
        let parsed = UrlState::parse(&query, &defaults());
        assert_eq!(parsed.filters, filters);
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_full_query_parse() {
        let state = UrlState::parse(
            "?lat=40.1&lng=20.2&z=12&q=Port%20Durr%C3%ABs&connections=33,25&levels=3&usage=1&status=50&open=1&minkw=22&maxkw=150.5&auto=false&poi=42",
            &defaults(),
        );
        assert_eq!(state.viewport.center, LatLng::new(40.1, 20.2));
        assert_eq!(state.viewport.zoom, 12);
        assert_eq!(state.filters.search, "Port Durrës");
        assert_eq!(state.filters.connection_type_ids, vec![33, 25]);
        assert_eq!(state.filters.level_ids, vec![3]);
        assert_eq!(state.filters.usage_type_ids, vec![1]);
        assert_eq!(state.filters.status_type_ids, vec![50]);
        assert!(state.filters.operational_only);
        assert_eq!(state.filters.power_min, Some(22.0));
        assert_eq!(state.filters.power_max, Some(150.5));
        assert!(!state.auto_update);
        assert_eq!(state.selected, Some(42));
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let state = UrlState::parse("lat=abc&lng=NaN&z=99&minkw=lots&poi=x&auto=yes", &defaults());
        assert_eq!(state.viewport.center, LatLng::new(41.3275, 19.8187));
        assert_eq!(state.viewport.zoom, 18);
        assert_eq!(state.filters.power_min, None);
        assert_eq!(state.selected, None);
        assert!(state.auto_update);
    }

    #[test]
    fn test_to_query_omits_defaults() {
        let state = UrlState::parse("", &defaults());
        assert_eq!(state.to_query(), "lat=41.32750&lng=19.81870&z=8");
    }

    #[test]
    fn test_url_sync_skips_redundant_writes() {
        let state = UrlState::parse("", &defaults());
        let mut sync = UrlSync::new("");

        assert!(sync.update(&state).is_some());
        assert!(sync.update(&state).is_none());
        assert_eq!(sync.writes(), 1);

        let mut moved = state.clone();
        moved.viewport.zoom = 11;
        assert_eq!(sync.update(&moved), Some("lat=41.32750&lng=19.81870&z=11"));
        assert_eq!(sync.writes(), 2);
    }

    #[test]
    fn test_url_sync_initial_query_matches_state() {
        let state = UrlState::parse("lat=41.32750&lng=19.81870&z=8", &defaults());
        let mut sync = UrlSync::new("?lat=41.32750&lng=19.81870&z=8");
        assert!(sync.update(&state).is_none());
        assert_eq!(sync.writes(), 0);
    }

    #[test]
    fn test_share_url_targets_station() {
        let station = StationBuilder::new(42, "Elbasan").at(41.1125, 20.0822).build();
        let filters = FilterState {
            operational_only: true,
            ..FilterState::default()
        };
        let url = share_url("https://makinaelektrike.com", &station, &filters, false).unwrap();
        assert_eq!(
            url,
            "https://makinaelektrike.com/albania-charging-stations?lat=41.11250&lng=20.08220&z=15&open=1&auto=false&poi=42"
        );
    }
}
