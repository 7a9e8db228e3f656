/// External API clients module
use crate::config::OcmConfig;
use crate::domain::{FacetQuery, FetchScope, ReferenceData, StationFeatureCollection};
use crate::errors::{ApiError, ApiResult};
use crate::utils::join_ids;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// HTTP client wrapper with common configuration
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> ApiResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .user_agent("charging-explorer/0.1")
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}

/// Source of charging reference data and station features
pub trait ChargingDataSource: Send + Sync + 'static {
    fn fetch_reference_data(&self) -> impl Future<Output = ApiResult<ReferenceData>> + Send;

    /// Facets are the server-side subset only; text and power filtering stay local
    fn fetch_stations(
        &self,
        scope: FetchScope,
        facets: &FacetQuery,
    ) -> impl Future<Output = ApiResult<StationFeatureCollection>> + Send;
}

/// Open Charge Map client
pub struct OcmClient {
    http_client: HttpClient,
    config: OcmConfig,
}

impl OcmClient {
    pub fn new(config: OcmConfig) -> ApiResult<Self> {
        Ok(Self {
            http_client: HttpClient::new(config.timeout)?,
            config,
        })
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.config.base_url, path);
        let mut req = self.http_client.get_client().get(url);
        if !self.config.api_key.is_empty() {
            req = req.header("X-API-Key", &self.config.api_key);
        }
        req
    }

    /// Query parameters of a `poi` request, empty facets omitted
    pub fn station_query(
        &self,
        scope: FetchScope,
        facets: &FacetQuery,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("output", "geojson".to_string()),
            ("countrycode", self.config.country_code.clone()),
            ("maxresults", self.config.max_results.to_string()),
            ("camelcase", "true".to_string()),
            ("client", self.config.client_name.clone()),
        ];

        if let FetchScope::Bounds { bounds } = scope {
            params.push(("boundingbox", bounds.bounding_box_param()));
        }

        let facet_params = [
            ("operatorid", &facets.operators),
            ("connectiontypeid", &facets.connection_types),
            ("levelid", &facets.levels),
            ("usagetypeid", &facets.usage_types),
            ("statustypeid", &facets.status_types),
        ];
        for (key, ids) in facet_params {
            if !ids.is_empty() {
                params.push((key, join_ids(ids)));
            }
        }

        params
    }
}

impl ChargingDataSource for OcmClient {
    /// Fetch facet vocabularies
    async fn fetch_reference_data(&self) -> ApiResult<ReferenceData> {
        let resp = self
            .get("referencedata")
            .query(&[
                ("client", self.config.client_name.as_str()),
                ("camelcase", "true"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ApiError::UpstreamStatus {
                what: "reference data",
                status: resp.status().as_u16(),
            });
        }

        Ok(resp.json().await?)
    }

    /// Fetch charging locations as a GeoJSON feature collection
    async fn fetch_stations(
        &self,
        scope: FetchScope,
        facets: &FacetQuery,
    ) -> ApiResult<StationFeatureCollection> {
        let params = self.station_query(scope, facets);
        debug!(?scope, "requesting charging locations");

        let resp = self.get("poi").query(&params).send().await?;

        if !resp.status().is_success() {
            return Err(ApiError::UpstreamStatus {
                what: "charging locations",
                status: resp.status().as_u16(),
            });
        }

        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bounds;
    use axum::extract::Query;
    use axum::http::HeaderMap as AxumHeaders;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    async fn spawn_upstream(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(base_url: String, api_key: &str) -> OcmClient {
        OcmClient::new(OcmConfig {
            base_url,
            api_key: api_key.to_string(),
            ..OcmConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_station_query_country_scope() {
        let client = client_for("http://localhost".to_string(), "");
        let params = client.station_query(FetchScope::Country, &FacetQuery::default());
        let keys: Vec<_> = params.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec!["output", "countrycode", "maxresults", "camelcase", "client"]
        );
        assert!(params.contains(&("countrycode", "AL".to_string())));
        assert!(params.contains(&("maxresults", "200".to_string())));
    }

    #[test]
    fn test_station_query_bounds_and_facets() {
        let client = client_for("http://localhost".to_string(), "");
        let facets = FacetQuery {
            operators: vec![3, 7],
            levels: vec![3],
            ..FacetQuery::default()
        };
        let scope = FetchScope::Bounds {
            bounds: Bounds::new(41.0, 41.5, 19.5, 20.0),
        };
        let params = client.station_query(scope, &facets);
        assert!(params.contains(&("boundingbox", "41,41.5,19.5,20".to_string())));
        assert!(params.contains(&("operatorid", "3,7".to_string())));
        assert!(params.contains(&("levelid", "3".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "connectiontypeid"));
    }

    #[tokio::test]
    async fn test_fetch_stations_parses_geojson_and_sends_key() {
        let router = Router::new().route(
            "/poi",
            get(
                |headers: AxumHeaders, Query(q): Query<HashMap<String, String>>| async move {
                    assert_eq!(headers.get("x-api-key").unwrap(), "secret");
                    assert_eq!(q.get("output").map(String::as_str), Some("geojson"));
                    Json(serde_json::json!({
                        "type": "FeatureCollection",
                        "features": [{
                            "type": "Feature",
                            "geometry": {"type": "Point", "coordinates": [19.8, 41.3]},
                            "properties": {
                                "id": 42,
                                "title": "Tirana East Gate",
                                "addressInfo": {"town": "Tirana", "latitude": 41.3, "longitude": 19.8},
                                "connections": [{"id": 1, "powerKW": 50}],
                                "mediaItems": null
                            }
                        }]
                    }))
                },
            ),
        );
        let base = spawn_upstream(router).await;
        let client = client_for(base, "secret");

        let collection = client
            .fetch_stations(FetchScope::Country, &FacetQuery::default())
            .await
            .unwrap();
        assert_eq!(collection.features.len(), 1);
        assert_eq!(collection.features[0].id(), 42);
        assert_eq!(collection.features[0].properties.connections[0].power_kw, Some(50.0));
    }

    #[tokio::test]
    async fn test_fetch_stations_non_success_status() {
        let router = Router::new().route(
            "/poi",
            get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let base = spawn_upstream(router).await;
        let client = client_for(base, "");

        let err = client
            .fetch_stations(FetchScope::Country, &FacetQuery::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UPSTREAM_5XX");
        assert_eq!(err.to_string(), "Failed to load charging locations: 503");
    }

    #[tokio::test]
    async fn test_fetch_reference_data() {
        let router = Router::new().route(
            "/referencedata",
            get(|| async {
                Json(serde_json::json!({
                    "Operators": [{"id": 3, "title": "Eco Charge"}],
                    "ConnectionTypes": [{"id": 33, "title": "CCS (Type 2)"}],
                    "Levels": [],
                    "UsageTypes": null,
                    "StatusTypes": [{"id": 50, "title": "Operational", "isOperational": true}]
                }))
            }),
        );
        let base = spawn_upstream(router).await;
        let client = client_for(base, "");

        let data = client.fetch_reference_data().await.unwrap();
        assert_eq!(data.operators[0].title, "Eco Charge");
        assert!(data.usage_types.is_empty());
    }
}
