/// Application configuration module
use crate::domain::LatLng;
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub public_origin: String,
    pub ocm: OcmConfig,
    pub map: MapDefaults,
    pub move_debounce: Duration,
    pub sessions: SessionLifetime,
}

/// How long an unvisited session lives and how often the sweep runs
#[derive(Clone, Debug)]
pub struct SessionLifetime {
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

/// Open Charge Map access settings
#[derive(Clone, Debug)]
pub struct OcmConfig {
    pub base_url: String,
    pub api_key: String,
    pub client_name: String,
    pub country_code: String,
    pub max_results: u32,
    pub timeout: Duration,
}

/// Initial map state used when the mount URL carries no viewport
#[derive(Clone, Debug)]
pub struct MapDefaults {
    pub center: LatLng,
    pub zoom: u8,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub cluster_radius_px: f64,
}

impl Default for MapDefaults {
    fn default() -> Self {
        Self {
            center: LatLng::new(41.3275, 19.8187),
            zoom: 8,
            min_zoom: 5,
            max_zoom: 18,
            cluster_radius_px: 60.0,
        }
    }
}

impl Default for OcmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openchargemap.io/v3".to_string(),
            api_key: String::new(),
            client_name: "MakinaElektrike".to_string(),
            country_code: "AL".to_string(),
            max_results: 200,
            timeout: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = OcmConfig::default();

        let ocm = OcmConfig {
            base_url: env::var("OCM_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_key: env::var("OCM_API_KEY")
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            client_name: env::var("OCM_CLIENT_NAME").unwrap_or(defaults.client_name),
            country_code: env::var("COUNTRY_CODE").unwrap_or(defaults.country_code),
            max_results: env_parse("MAX_RESULTS", defaults.max_results),
            timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECONDS", 30)),
        };

        if ocm.max_results == 0 {
            anyhow::bail!("MAX_RESULTS must be greater than zero");
        }

        let sessions = SessionLifetime {
            idle_timeout: Duration::from_secs(env_parse("SESSION_IDLE_SECONDS", 1800)),
            sweep_interval: Duration::from_secs(env_parse("SESSION_SWEEP_SECONDS", 60)),
        };

        if sessions.idle_timeout.is_zero() {
            anyhow::bail!("SESSION_IDLE_SECONDS must be greater than zero");
        }
        if sessions.sweep_interval.is_zero() {
            anyhow::bail!("SESSION_SWEEP_SECONDS must be greater than zero");
        }

        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            public_origin: env::var("PUBLIC_ORIGIN")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            ocm,
            map: MapDefaults::default(),
            move_debounce: Duration::from_millis(env_parse("MOVE_DEBOUNCE_MS", 450)),
            sessions,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
