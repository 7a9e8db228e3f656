/// Builders and an in-memory data source shared by service tests
use crate::clients::ChargingDataSource;
use crate::domain::{
    Bounds, Connection, ConnectionTypeRef, FacetQuery, FetchScope, LatLng, OperatorInfo,
    PointGeometry, ReferenceData, StationFeature, StationFeatureCollection, StationProperties,
    StatusRef, TitledRef,
};
use crate::errors::{ApiError, ApiResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn connection(type_id: i64, level_id: i64, power_kw: Option<f64>) -> Connection {
    Connection {
        id: type_id * 100 + level_id,
        connection_type: Some(ConnectionTypeRef {
            id: Some(type_id),
            title: Some(format!("Type {type_id}")),
            formal_name: None,
        }),
        level: Some(TitledRef {
            id: Some(level_id),
            title: Some(format!("Level {level_id}")),
        }),
        power_kw,
        quantity: Some(1),
        ..Default::default()
    }
}

/// A station at Tirana with one connection of the given power
pub fn station(id: i64, title: &str, power_kw: Option<f64>) -> StationFeature {
    StationBuilder::new(id, title)
        .connection(connection(33, 3, power_kw))
        .build()
}

pub struct StationBuilder {
    properties: StationProperties,
    position: LatLng,
}

impl StationBuilder {
    pub fn new(id: i64, title: &str) -> Self {
        Self {
            properties: StationProperties {
                id,
                title: Some(title.to_string()),
                ..Default::default()
            },
            position: LatLng::new(41.3275, 19.8187),
        }
    }

    pub fn at(mut self, lat: f64, lng: f64) -> Self {
        self.position = LatLng::new(lat, lng);
        self
    }

    pub fn operator(mut self, id: i64, title: &str) -> Self {
        self.properties.operator_info = Some(OperatorInfo {
            id: Some(id),
            title: Some(title.to_string()),
            ..Default::default()
        });
        self
    }

    pub fn status(mut self, id: i64, operational: bool) -> Self {
        self.properties.status_type = Some(StatusRef {
            id: Some(id),
            title: Some(if operational { "Operational" } else { "Not Operational" }.to_string()),
            is_operational: Some(operational),
        });
        self
    }

    pub fn usage(mut self, id: i64) -> Self {
        self.properties.usage_type = Some(TitledRef {
            id: Some(id),
            title: Some(format!("Usage {id}")),
        });
        self
    }

    pub fn town(mut self, town: &str) -> Self {
        self.properties.address_info.town = Some(town.to_string());
        self
    }

    pub fn connection(mut self, connection: Connection) -> Self {
        self.properties.connections.push(connection);
        self
    }

    pub fn build(self) -> StationFeature {
        StationFeature {
            geometry: Some(PointGeometry {
                kind: "Point".to_string(),
                coordinates: vec![self.position.lng, self.position.lat],
            }),
            properties: self.properties,
        }
    }
}

pub fn tirana_bounds() -> Bounds {
    Bounds::new(41.25, 41.40, 19.70, 19.95)
}

/// Scripted data source recording every request it receives
#[derive(Default)]
pub struct FakeSource {
    pub stations: Mutex<Vec<StationFeature>>,
    pub reference: Mutex<Option<ReferenceData>>,
    pub fail_stations: AtomicBool,
    pub delay: Mutex<Duration>,
    pub station_calls: Mutex<Vec<(FetchScope, FacetQuery)>>,
    pub reference_calls: AtomicUsize,
}

impl FakeSource {
    pub fn with_stations(stations: Vec<StationFeature>) -> Self {
        Self {
            stations: Mutex::new(stations),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<(FetchScope, FacetQuery)> {
        self.station_calls.lock().unwrap().clone()
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

impl ChargingDataSource for FakeSource {
    async fn fetch_reference_data(&self) -> ApiResult<ReferenceData> {
        self.reference_calls.fetch_add(1, Ordering::SeqCst);
        let reference = self.reference.lock().unwrap().clone();
        reference.ok_or(ApiError::UpstreamStatus {
            what: "reference data",
            status: 500,
        })
    }

    async fn fetch_stations(
        &self,
        scope: FetchScope,
        facets: &FacetQuery,
    ) -> ApiResult<StationFeatureCollection> {
        self.station_calls
            .lock()
            .unwrap()
            .push((scope, facets.clone()));
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_stations.load(Ordering::SeqCst) {
            return Err(ApiError::UpstreamStatus {
                what: "charging locations",
                status: 502,
            });
        }
        let features = self.stations.lock().unwrap().clone();
        Ok(StationFeatureCollection { features })
    }
}
