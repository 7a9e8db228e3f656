/// Domain models for the application
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Geographic coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Map viewport rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl Bounds {
    pub fn new(south: f64, north: f64, west: f64, east: f64) -> Self {
        Self {
            south,
            north,
            west,
            east,
        }
    }

    /// Value of the upstream `boundingbox` query parameter
    pub fn bounding_box_param(&self) -> String {
        format!("{},{},{},{}", self.south, self.north, self.west, self.east)
    }

    /// Bounds rounded to six decimals, as kept in the fetch context
    pub fn rounded(&self) -> Self {
        let r = |v: f64| (v * 1e6).round() / 1e6;
        Self::new(r(self.south), r(self.north), r(self.west), r(self.east))
    }

    pub fn is_valid(&self) -> bool {
        [self.south, self.north, self.west, self.east]
            .iter()
            .all(|v| v.is_finite())
            && self.south <= self.north
            && self.west <= self.east
    }
}

/// Center and zoom of the map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapViewport {
    pub center: LatLng,
    pub zoom: u8,
}

/// One `{id, title}` vocabulary entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceItem {
    pub id: i64,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTypeItem {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub is_operational: Option<bool>,
}

/// Facet vocabularies served by the reference-data endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    #[serde(rename = "Operators", default, deserialize_with = "nullable_vec")]
    pub operators: Vec<ReferenceItem>,
    #[serde(rename = "ConnectionTypes", default, deserialize_with = "nullable_vec")]
    pub connection_types: Vec<ReferenceItem>,
    #[serde(rename = "Levels", default, deserialize_with = "nullable_vec")]
    pub levels: Vec<ReferenceItem>,
    #[serde(rename = "UsageTypes", default, deserialize_with = "nullable_vec")]
    pub usage_types: Vec<ReferenceItem>,
    #[serde(rename = "StatusTypes", default, deserialize_with = "nullable_vec")]
    pub status_types: Vec<StatusTypeItem>,
}

/// Filter option shown in a facet picker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionItem {
    pub id: i64,
    pub label: String,
}

/// Sorted facet options, empty when reference data is unavailable
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub operators: Vec<OptionItem>,
    pub connection_types: Vec<OptionItem>,
    pub levels: Vec<OptionItem>,
    pub usage_types: Vec<OptionItem>,
    pub status_types: Vec<OptionItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationFeatureCollection {
    #[serde(default, deserialize_with = "nullable_vec")]
    pub features: Vec<StationFeature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationFeature {
    #[serde(default)]
    pub geometry: Option<PointGeometry>,
    pub properties: StationProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationProperties {
    pub id: i64,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub address_info: AddressInfo,
    #[serde(default)]
    pub operator_info: Option<OperatorInfo>,
    #[serde(default)]
    pub status_type: Option<StatusRef>,
    #[serde(default)]
    pub usage_type: Option<TitledRef>,
    #[serde(default)]
    pub usage_cost: Option<String>,
    #[serde(default)]
    pub date_last_verified: Option<String>,
    #[serde(default)]
    pub data_provider: Option<TitledRef>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub connections: Vec<Connection>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub media_items: Vec<MediaItem>,
    #[serde(default)]
    pub general_comments: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInfo {
    pub title: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub town: Option<String>,
    pub state_or_province: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<Country>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub contact_telephone1: Option<String>,
    pub contact_telephone2: Option<String>,
    #[serde(rename = "relatedURL")]
    pub related_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Country {
    pub iso_code: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorInfo {
    pub id: Option<i64>,
    pub title: Option<String>,
    #[serde(rename = "websiteURL")]
    pub website_url: Option<String>,
    pub phone_primary_contact: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRef {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub is_operational: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TitledRef {
    pub id: Option<i64>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTypeRef {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub formal_name: Option<String>,
}

/// One physical connector slot on a station
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub connection_type: Option<ConnectionTypeRef>,
    #[serde(default)]
    pub level: Option<TitledRef>,
    #[serde(rename = "powerKW", default)]
    pub power_kw: Option<f64>,
    #[serde(default)]
    pub amps: Option<f64>,
    #[serde(default)]
    pub voltage: Option<f64>,
    #[serde(default)]
    pub quantity: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "itemURL")]
    pub item_url: String,
    #[serde(default)]
    pub is_enabled: Option<bool>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl StationFeature {
    /// Point geometry first, falling back to the address coordinates
    pub fn position(&self) -> Option<LatLng> {
        if let Some(geometry) = &self.geometry {
            if geometry.kind == "Point" && geometry.coordinates.len() >= 2 {
                let point = LatLng::new(geometry.coordinates[1], geometry.coordinates[0]);
                if point.is_finite() {
                    return Some(point);
                }
            }
        }
        let address = &self.properties.address_info;
        match (address.latitude, address.longitude) {
            (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)),
            _ => None,
        }
    }

    pub fn id(&self) -> i64 {
        self.properties.id
    }
}

/// User-held filter state, mirrored into the URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterState {
    pub search: String,
    pub operator_ids: Vec<i64>,
    pub connection_type_ids: Vec<i64>,
    pub level_ids: Vec<i64>,
    pub usage_type_ids: Vec<i64>,
    pub status_type_ids: Vec<i64>,
    pub operational_only: bool,
    pub power_min: Option<f64>,
    pub power_max: Option<f64>,
}

impl FilterState {
    /// The part of the filter the upstream API can apply
    pub fn facet_query(&self) -> FacetQuery {
        FacetQuery {
            operators: self.operator_ids.clone(),
            connection_types: self.connection_type_ids.clone(),
            levels: self.level_ids.clone(),
            usage_types: self.usage_type_ids.clone(),
            status_types: self.status_type_ids.clone(),
        }
    }
}

/// Server-side facet subset of the filter state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetQuery {
    pub operators: Vec<i64>,
    pub connection_types: Vec<i64>,
    pub levels: Vec<i64>,
    pub usage_types: Vec<i64>,
    pub status_types: Vec<i64>,
}

/// Scope of a station fetch; the last committed one is the fetch context
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum FetchScope {
    Country,
    Bounds { bounds: Bounds },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

/// Short user-facing notice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Info,
            message: message.into(),
        }
    }
}

/// Upstream sends `null` for absent lists
fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Health check response
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub now: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_position_prefers_geometry() {
        let feature: StationFeature = serde_json::from_value(serde_json::json!({
            "geometry": {"type": "Point", "coordinates": [19.81, 41.33]},
            "properties": {"id": 1, "addressInfo": {"latitude": 40.0, "longitude": 20.0}}
        }))
        .unwrap();
        assert_eq!(feature.position(), Some(LatLng::new(41.33, 19.81)));
    }

    #[test]
    fn test_feature_position_falls_back_to_address() {
        let feature: StationFeature = serde_json::from_value(serde_json::json!({
            "properties": {"id": 1, "addressInfo": {"latitude": 40.0, "longitude": 20.0}}
        }))
        .unwrap();
        assert_eq!(feature.position(), Some(LatLng::new(40.0, 20.0)));
    }

    #[test]
    fn test_reference_data_tolerates_missing_lists() {
        let data: ReferenceData = serde_json::from_value(serde_json::json!({
            "Operators": [{"id": 3, "title": "Eco Charge"}],
            "StatusTypes": [{"id": 50, "title": "Operational", "isOperational": true}]
        }))
        .unwrap();
        assert_eq!(data.operators.len(), 1);
        assert!(data.levels.is_empty());
        assert_eq!(data.status_types[0].is_operational, Some(true));
    }

    #[test]
    fn test_bounds_rounding_and_param() {
        let bounds = Bounds::new(41.1234567, 41.7654321, 19.1111119, 20.0);
        let rounded = bounds.rounded();
        assert_eq!(rounded.south, 41.123457);
        assert_eq!(rounded.west, 19.111112);
        assert_eq!(
            Bounds::new(41.0, 42.5, 19.0, 20.25).bounding_box_param(),
            "41,42.5,19,20.25"
        );
    }
}
