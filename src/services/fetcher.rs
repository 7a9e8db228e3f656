/// Station fetcher with a single last-request-wins slot
use crate::clients::ChargingDataSource;
use crate::domain::{FacetQuery, FetchScope, StationFeature, StationFeatureCollection};
use crate::errors::ApiResult;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of one fetch, tagged with the request it answers
#[derive(Debug)]
pub struct FetchCompletion {
    pub seq: u64,
    pub scope: FetchScope,
    pub result: ApiResult<StationFeatureCollection>,
}

pub struct StationFetcher<S> {
    source: Arc<S>,
    seq: u64,
    in_flight: Option<JoinHandle<()>>,
    stations: Vec<StationFeature>,
    last_updated: Option<DateTime<Utc>>,
    last_context: Option<FetchScope>,
    loading: bool,
    error: Option<String>,
}

impl<S: ChargingDataSource> StationFetcher<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            seq: 0,
            in_flight: None,
            stations: Vec::new(),
            last_updated: None,
            last_context: None,
            loading: false,
            error: None,
        }
    }

    /// Issue a request, aborting whatever was still in flight
    pub fn start(
        &mut self,
        scope: FetchScope,
        facets: FacetQuery,
        completions: &UnboundedSender<FetchCompletion>,
    ) -> u64 {
        if let Some(previous) = self.in_flight.take() {
            if !previous.is_finished() {
                debug!(superseded = self.seq, "aborting in-flight station fetch");
            }
            previous.abort();
        }

        self.seq += 1;
        self.loading = true;
        self.error = None;

        let seq = self.seq;
        let source = self.source.clone();
        let tx = completions.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let result = source.fetch_stations(scope, &facets).await;
            let _ = tx.send(FetchCompletion { seq, scope, result });
        }));

        seq
    }

    /// Apply a completion; superseded ones are dropped and `false` is returned
    pub fn commit(&mut self, completion: FetchCompletion) -> bool {
        if completion.seq != self.seq {
            debug!(
                seq = completion.seq,
                latest = self.seq,
                "ignoring superseded station fetch"
            );
            return false;
        }

        self.loading = false;
        self.in_flight = None;

        match completion.result {
            Ok(collection) => {
                info!(
                    count = collection.features.len(),
                    scope = ?completion.scope,
                    "Charging locations loaded"
                );
                self.stations = collection.features;
                self.last_updated = Some(Utc::now());
                self.last_context = Some(match completion.scope {
                    FetchScope::Bounds { bounds } => FetchScope::Bounds {
                        bounds: bounds.rounded(),
                    },
                    FetchScope::Country => FetchScope::Country,
                });
                self.error = None;
            }
            Err(e) => {
                warn!("Station fetch error: {:?}", e);
                self.error = Some(e.to_string());
            }
        }
        true
    }

    /// Scope a retry replays: the last successful context, else the whole country
    pub fn retry_scope(&self) -> FetchScope {
        self.last_context.unwrap_or(FetchScope::Country)
    }

    /// Abort the slot; any late completion is ignored
    pub fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        self.seq += 1;
        self.loading = false;
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn stations(&self) -> &[StationFeature] {
        &self.stations
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn last_context(&self) -> Option<FetchScope> {
        self.last_context
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
