/// Marker reconciliation against a map surface, plus the in-memory clustering layer
use crate::domain::{Bounds, LatLng, MapViewport, StationFeature};
use crate::utils::{
    apple_directions_url, format_address, format_power_range, google_directions_url,
    parse_timestamp,
};
use serde::Serialize;
use std::collections::HashMap;
use std::f64::consts::PI;

/// Zoom used when focusing a station from the list
pub const FOCUS_ZOOM: u8 = 14;

const TILE_SIZE: f64 = 256.0;
const MAX_MERCATOR_LAT: f64 = 85.05112878;

/// Capabilities the synchronizer needs from a map implementation
pub trait MapSurface {
    fn add_marker(&mut self, marker: MarkerSpec);
    fn remove_all(&mut self);
    fn fly_to(&mut self, center: LatLng, zoom: u8);
    /// Returns `false` when no marker exists for the station
    fn open_popup(&mut self, station_id: i64) -> bool;
    fn zoom(&self) -> u8;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerSpec {
    pub station_id: i64,
    pub position: LatLng,
    pub title: String,
    pub popup: Popup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PopupAction {
    CopyAddress,
    Share,
}

#[derive(Debug, Clone, Serialize)]
pub struct PopupDetail {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PopupLink {
    pub label: &'static str,
    pub href: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionRow {
    pub connector: String,
    pub level: String,
    pub power_kw: String,
    pub quantity: String,
}

/// Popup content bound to a marker
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Popup {
    pub title: String,
    pub address: String,
    pub thumbnail: Option<String>,
    pub details: Vec<PopupDetail>,
    pub connections: Vec<ConnectionRow>,
    pub links: Vec<PopupLink>,
    pub actions: Vec<PopupAction>,
    pub attribution: &'static str,
}

impl Popup {
    pub fn for_station(feature: &StationFeature, position: LatLng) -> Self {
        let properties = &feature.properties;
        let address = format_address(properties);

        let mut details = vec![
            PopupDetail {
                label: "Operator",
                value: properties
                    .operator_info
                    .as_ref()
                    .and_then(|o| o.title.clone())
                    .unwrap_or_else(|| "Unknown operator".to_string()),
            },
            PopupDetail {
                label: "Status",
                value: properties
                    .status_type
                    .as_ref()
                    .and_then(|s| s.title.clone())
                    .unwrap_or_else(|| "Status unknown".to_string()),
            },
            PopupDetail {
                label: "Usage",
                value: properties
                    .usage_type
                    .as_ref()
                    .and_then(|u| u.title.clone())
                    .unwrap_or_else(|| "Usage unknown".to_string()),
            },
            PopupDetail {
                label: "Power",
                value: format_power_range(properties)
                    .unwrap_or_else(|| "Unspecified power".to_string()),
            },
            PopupDetail {
                label: "Last verified",
                value: properties
                    .date_last_verified
                    .as_deref()
                    .and_then(parse_timestamp)
                    .map(|dt| dt.format("%d/%m/%Y").to_string())
                    .unwrap_or_else(|| "Not provided".to_string()),
            },
        ];
        if let Some(cost) = properties.usage_cost.as_ref().filter(|c| !c.is_empty()) {
            details.push(PopupDetail {
                label: "Cost",
                value: cost.clone(),
            });
        }

        let dash = || "—".to_string();
        let connections = properties
            .connections
            .iter()
            .map(|c| ConnectionRow {
                connector: c
                    .connection_type
                    .as_ref()
                    .and_then(|t| t.title.clone())
                    .unwrap_or_else(dash),
                level: c
                    .level
                    .as_ref()
                    .and_then(|l| l.title.clone())
                    .unwrap_or_else(dash),
                power_kw: c.power_kw.map(|p| p.to_string()).unwrap_or_else(dash),
                quantity: c.quantity.map(|q| q.to_string()).unwrap_or_else(dash),
            })
            .collect();

        Self {
            title: properties
                .title
                .clone()
                .unwrap_or_else(|| "Charging location".to_string()),
            address: if address.is_empty() {
                "Address unavailable".to_string()
            } else {
                address
            },
            thumbnail: thumbnail_url(feature),
            details,
            connections,
            links: vec![
                PopupLink {
                    label: "Directions",
                    href: google_directions_url(position),
                },
                PopupLink {
                    label: "Apple Maps",
                    href: apple_directions_url(position),
                },
            ],
            actions: vec![PopupAction::CopyAddress, PopupAction::Share],
            attribution: "Data © Open Charge Map contributors – OpenChargeMap.org",
        }
    }
}

/// First enabled media item with an http(s) URL
fn thumbnail_url(feature: &StationFeature) -> Option<String> {
    let item = feature
        .properties
        .media_items
        .iter()
        .find(|m| m.is_enabled == Some(true))?;
    let parsed = url::Url::parse(&item.item_url).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}

/// Rebuilds markers from the visible set and keeps an id → position side table
#[derive(Default)]
pub struct MarkerSync {
    index: HashMap<i64, LatLng>,
}

impl MarkerSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the layer and add one marker per visible station with finite coordinates
    pub fn rebuild<M: MapSurface>(&mut self, map: &mut M, visible: &[StationFeature]) {
        map.remove_all();
        self.index.clear();

        for feature in visible {
            let Some(position) = feature.position().filter(LatLng::is_finite) else {
                continue;
            };
            map.add_marker(MarkerSpec {
                station_id: feature.id(),
                position,
                title: feature
                    .properties
                    .title
                    .clone()
                    .unwrap_or_else(|| "Charging station".to_string()),
                popup: Popup::for_station(feature, position),
            });
            self.index.insert(feature.id(), position);
        }
    }

    /// Open the station's popup and fly to it at `FOCUS_ZOOM` or closer
    pub fn focus<M: MapSurface>(&self, map: &mut M, station_id: i64) -> bool {
        let Some(position) = self.index.get(&station_id).copied() else {
            return false;
        };
        map.open_popup(station_id);
        let zoom = map.zoom().max(FOCUS_ZOOM);
        map.fly_to(position, zoom);
        true
    }

    /// Selection after a rebuild: kept while the station is still visible
    pub fn reconcile_selection<M: MapSurface>(
        &self,
        map: &mut M,
        selected: Option<i64>,
        visible: &[StationFeature],
    ) -> Option<i64> {
        let id = selected?;
        if map.open_popup(id) {
            return Some(id);
        }
        visible.iter().any(|s| s.id() == id).then_some(id)
    }
}

/// Group of nearby markers at the current zoom
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub center: LatLng,
    pub count: usize,
    pub station_ids: Vec<i64>,
    pub bounds: Bounds,
}

/// In-memory map surface with greedy radius clustering in Web Mercator pixels
pub struct ClusterLayer {
    markers: Vec<MarkerSpec>,
    viewport: MapViewport,
    open_popup: Option<i64>,
    radius_px: f64,
    min_zoom: u8,
    max_zoom: u8,
}

impl ClusterLayer {
    pub fn new(viewport: MapViewport, radius_px: f64, min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            markers: Vec::new(),
            viewport,
            open_popup: None,
            radius_px,
            min_zoom,
            max_zoom,
        }
    }

    /// User-driven view change reported by the client map
    pub fn set_view(&mut self, viewport: MapViewport) {
        self.viewport = MapViewport {
            center: viewport.center,
            zoom: viewport.zoom.clamp(self.min_zoom, self.max_zoom),
        };
    }

    pub fn viewport(&self) -> MapViewport {
        self.viewport
    }

    pub fn open_popup_marker(&self) -> Option<&MarkerSpec> {
        let id = self.open_popup?;
        self.markers.iter().find(|m| m.station_id == id)
    }

    /// Clusters at the current zoom; each marker stands alone at max zoom
    pub fn clusters(&self) -> Vec<Cluster> {
        let zoom = self.viewport.zoom;
        let mut groups: Vec<((f64, f64), Vec<&MarkerSpec>)> = Vec::new();

        for marker in &self.markers {
            let px = project(marker.position, zoom);
            let existing = if zoom >= self.max_zoom {
                None
            } else {
                groups.iter().position(|(anchor, _)| {
                    let dx = anchor.0 - px.0;
                    let dy = anchor.1 - px.1;
                    (dx * dx + dy * dy).sqrt() <= self.radius_px
                })
            };
            match existing {
                Some(i) => groups[i].1.push(marker),
                None => groups.push((px, vec![marker])),
            }
        }

        groups
            .into_iter()
            .map(|(_, members)| {
                let count = members.len();
                let lat = members.iter().map(|m| m.position.lat).sum::<f64>() / count as f64;
                let lng = members.iter().map(|m| m.position.lng).sum::<f64>() / count as f64;
                let bounds = members.iter().fold(
                    Bounds::new(f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
                    |b, m| {
                        Bounds::new(
                            b.south.min(m.position.lat),
                            b.north.max(m.position.lat),
                            b.west.min(m.position.lng),
                            b.east.max(m.position.lng),
                        )
                    },
                );
                Cluster {
                    center: LatLng::new(lat, lng),
                    count,
                    station_ids: members.iter().map(|m| m.station_id).collect(),
                    bounds,
                }
            })
            .collect()
    }
}

impl MapSurface for ClusterLayer {
    fn add_marker(&mut self, marker: MarkerSpec) {
        self.markers.push(marker);
    }

    fn remove_all(&mut self) {
        self.markers.clear();
        self.open_popup = None;
    }

    fn fly_to(&mut self, center: LatLng, zoom: u8) {
        self.set_view(MapViewport { center, zoom });
    }

    fn open_popup(&mut self, station_id: i64) -> bool {
        if self.markers.iter().any(|m| m.station_id == station_id) {
            self.open_popup = Some(station_id);
            true
        } else {
            false
        }
    }

    fn zoom(&self) -> u8 {
        self.viewport.zoom
    }
}

/// Web Mercator world pixel coordinates at `zoom`
pub fn project(point: LatLng, zoom: u8) -> (f64, f64) {
    let scale = TILE_SIZE * 2f64.powi(zoom as i32);
    let lat = point.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let x = (point.lng + 180.0) / 360.0 * scale;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * scale;
    (x, y)
}
