/// Explorer session: one task owns the whole view state and serializes every event
use crate::clients::ChargingDataSource;
use crate::config::{AppConfig, MapDefaults};
use crate::domain::{Bounds, FetchScope, FilterState, LatLng, MapViewport, StationFeature, Toast};
use crate::errors::{ApiError, ApiResult};
use crate::services::export::{export, ExportFile, ExportFormat, ExportRow};
use crate::services::fetcher::{FetchCompletion, StationFetcher};
use crate::services::filter::visible_stations;
use crate::services::markers::{Cluster, ClusterLayer, MapSurface, MarkerSpec, MarkerSync};
use crate::services::url_state::{share_url, UrlState, UrlSync};
use crate::services::viewport::{Effect, ViewportTracker};
use crate::utils::format_address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Zoom used after a successful locate
pub const LOCATE_ZOOM: u8 = 14;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClipboardError {
    #[error("nothing to copy")]
    Empty,
}

/// Write target for copy and share actions
pub trait Clipboard: Send + 'static {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError>;
    fn contents(&self) -> Option<&str>;
}

/// Per-session clipboard handed back to the client in snapshots
#[derive(Debug, Default)]
pub struct ClipboardBuffer {
    contents: Option<String>,
}

impl Clipboard for ClipboardBuffer {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        if text.trim().is_empty() {
            return Err(ClipboardError::Empty);
        }
        self.contents = Some(text.to_string());
        Ok(())
    }

    fn contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocateFailure {
    Unsupported,
    Unavailable,
}

impl LocateFailure {
    fn message(&self) -> &'static str {
        match self {
            LocateFailure::Unsupported => "Geolocation is not supported by your browser.",
            LocateFailure::Unavailable => "Unable to retrieve your location.",
        }
    }
}

/// User interactions that answer with a snapshot
#[derive(Debug, Clone)]
pub enum Action {
    Snapshot,
    Moved {
        viewport: MapViewport,
        bounds: Bounds,
    },
    SetFilters(FilterState),
    ResetFilters,
    SetAutoUpdate(bool),
    SearchArea,
    Retry,
    DismissError,
    Select(i64),
    Locate(Result<LatLng, LocateFailure>),
    CopyAddress(i64),
    Share(i64),
}

pub enum Command {
    Apply(Action, oneshot::Sender<ApiResult<SessionSnapshot>>),
    Export(ExportFormat, oneshot::Sender<ApiResult<ExportFile>>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub debounce: Duration,
    pub map: MapDefaults,
    pub public_origin: String,
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            debounce: config.move_debounce,
            map: config.map.clone(),
            public_origin: config.public_origin.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StationCard {
    #[serde(flatten)]
    pub row: ExportRow,
    pub selected: bool,
}

/// Everything a client needs to render the view
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: u64,
    pub url_query: String,
    pub history_writes: u64,
    pub viewport: MapViewport,
    pub filters: FilterState,
    pub auto_update: bool,
    pub pending_search: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub fetch_context: Option<FetchScope>,
    pub fetched_count: usize,
    pub heading: String,
    pub stations: Vec<StationCard>,
    pub clusters: Vec<Cluster>,
    pub open_popup: Option<MarkerSpec>,
    pub selected: Option<i64>,
    pub clipboard: Option<String>,
    pub toasts: Vec<Toast>,
}

pub struct ExplorerSession<S> {
    id: u64,
    options: SessionOptions,
    fetcher: StationFetcher<S>,
    completions: mpsc::UnboundedSender<FetchCompletion>,
    tracker: ViewportTracker,
    filters: FilterState,
    visible: Vec<StationFeature>,
    layer: ClusterLayer,
    markers: MarkerSync,
    selected: Option<i64>,
    url: UrlSync,
    clipboard: Box<dyn Clipboard>,
    toasts: Vec<Toast>,
}

impl<S: ChargingDataSource> ExplorerSession<S> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<FetchCompletion>,
    ) {
        info!(session = self.id, "Explorer session started");
        self.start_fetch(FetchScope::Country);
        self.sync_url();

        loop {
            let deadline = self.tracker.deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command) {
                            break;
                        }
                    }
                    None => {
                        self.teardown();
                        break;
                    }
                },
                Some(completion) = completions.recv() => self.on_completion(completion),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let effect = self.tracker.on_deadline(Instant::now());
                    self.apply_effect(effect);
                }
            }
            self.sync_url();
        }

        info!(session = self.id, "Explorer session stopped");
    }

    /// Returns `false` once the session has shut down
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Apply(action, reply) => {
                let result = self.apply(action).map(|()| self.snapshot());
                let _ = reply.send(result);
            }
            Command::Export(format, reply) => {
                let _ = reply.send(self.export(format));
            }
            Command::Shutdown(reply) => {
                self.teardown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn apply(&mut self, action: Action) -> ApiResult<()> {
        match action {
            Action::Snapshot => {}
            Action::Moved { viewport, bounds } => {
                if !bounds.is_valid() || !viewport.center.is_finite() {
                    return Err(ApiError::InvalidInput(
                        "viewport must be finite with south <= north and west <= east".to_string(),
                    ));
                }
                self.layer.set_view(viewport);
                let effect = self
                    .tracker
                    .on_move(self.layer.viewport(), bounds, Instant::now());
                self.apply_effect(effect);
            }
            Action::SetFilters(filters) => self.set_filters(filters),
            Action::ResetFilters => self.set_filters(FilterState::default()),
            Action::SetAutoUpdate(enabled) => {
                let effect = self.tracker.set_auto_update(enabled);
                self.apply_effect(effect);
            }
            Action::SearchArea => {
                let effect = self.tracker.search_area();
                self.apply_effect(effect);
            }
            Action::Retry => self.start_fetch(self.fetcher.retry_scope()),
            Action::DismissError => self.fetcher.dismiss_error(),
            Action::Select(station_id) => {
                self.selected = Some(station_id);
                if self.markers.focus(&mut self.layer, station_id) {
                    self.tracker.set_viewport(self.layer.viewport());
                } else if !self.visible.iter().any(|s| s.id() == station_id) {
                    self.selected = None;
                }
            }
            Action::Locate(Ok(position)) => {
                if !position.is_finite() {
                    return Err(ApiError::InvalidInput("position must be finite".to_string()));
                }
                self.layer.fly_to(position, LOCATE_ZOOM);
                self.tracker.set_viewport(self.layer.viewport());
            }
            Action::Locate(Err(failure)) => {
                warn!(session = self.id, ?failure, "Locate failed");
                self.toasts.push(Toast::error(failure.message()));
            }
            Action::CopyAddress(station_id) => {
                let address = format_address(&self.visible_station(station_id)?.properties);
                match self.clipboard.write_text(&address) {
                    Ok(()) => self.toasts.push(Toast::success("Address copied to clipboard")),
                    Err(e) => {
                        debug!(session = self.id, "Copy address failed: {}", e);
                        self.toasts.push(Toast::error("Unable to copy address"));
                    }
                }
            }
            Action::Share(station_id) => {
                let link = share_url(
                    &self.options.public_origin,
                    self.visible_station(station_id)?,
                    &self.filters,
                    self.tracker.auto_update(),
                );
                let written = link
                    .ok_or(ClipboardError::Empty)
                    .and_then(|link| self.clipboard.write_text(&link));
                match written {
                    Ok(()) => self
                        .toasts
                        .push(Toast::success("Shareable link copied to clipboard")),
                    Err(e) => {
                        debug!(session = self.id, "Share failed: {}", e);
                        self.toasts.push(Toast::error("Unable to copy link"));
                    }
                }
            }
        }
        Ok(())
    }

    fn visible_station(&self, station_id: i64) -> ApiResult<&StationFeature> {
        self.visible
            .iter()
            .find(|s| s.id() == station_id)
            .ok_or_else(|| {
                ApiError::NotFound(format!("Station {} is not in the current results", station_id))
            })
    }

    /// Facet changes refetch in the last context; other filter changes only recompute
    fn set_filters(&mut self, filters: FilterState) {
        let refetch = filters.facet_query() != self.filters.facet_query();
        self.filters = filters;
        self.refresh_visible();
        if refetch {
            self.start_fetch(self.fetcher.retry_scope());
        }
    }

    fn apply_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Fetch(bounds) => self.start_fetch(FetchScope::Bounds { bounds }),
            Effect::Schedule(deadline) => {
                debug!(session = self.id, ?deadline, "Bounds fetch scheduled");
            }
            Effect::None => {}
        }
    }

    fn start_fetch(&mut self, scope: FetchScope) {
        let seq = self
            .fetcher
            .start(scope, self.filters.facet_query(), &self.completions);
        debug!(session = self.id, seq, ?scope, "Station fetch started");
    }

    fn on_completion(&mut self, completion: FetchCompletion) {
        if self.fetcher.commit(completion) {
            self.tracker.fetch_settled();
            self.refresh_visible();
        }
    }

    /// Visible markers are always rebuilt from the last fetch and the current filters
    fn refresh_visible(&mut self) {
        self.visible = visible_stations(self.fetcher.stations(), &self.filters);
        self.markers.rebuild(&mut self.layer, &self.visible);
        // a selection seeded from the URL waits for the first result set
        if self.fetcher.last_updated().is_some() {
            self.selected =
                self.markers
                    .reconcile_selection(&mut self.layer, self.selected, &self.visible);
        }
    }

    fn export(&mut self, format: ExportFormat) -> ApiResult<ExportFile> {
        match export(&self.visible, format) {
            Ok(file) => {
                info!(
                    session = self.id,
                    rows = self.visible.len(),
                    format = format.label(),
                    "Visible results exported"
                );
                self.toasts.push(Toast::success(format!(
                    "Exported visible results to {}.",
                    format.label()
                )));
                Ok(file)
            }
            Err(e) => {
                self.toasts.push(Toast::info(e.to_string()));
                Err(e)
            }
        }
    }

    fn url_state(&self) -> UrlState {
        UrlState {
            viewport: self.tracker.viewport(),
            filters: self.filters.clone(),
            auto_update: self.tracker.auto_update(),
            selected: self.selected,
        }
    }

    fn sync_url(&mut self) {
        let state = self.url_state();
        if let Some(query) = self.url.update(&state) {
            debug!(session = self.id, query, "URL state replaced");
        }
    }

    fn snapshot(&mut self) -> SessionSnapshot {
        self.sync_url();
        let count = self.visible.len();
        SessionSnapshot {
            session_id: self.id,
            url_query: self.url.current().to_string(),
            history_writes: self.url.writes(),
            viewport: self.tracker.viewport(),
            filters: self.filters.clone(),
            auto_update: self.tracker.auto_update(),
            pending_search: self.tracker.pending_search(),
            loading: self.fetcher.is_loading(),
            error: self.fetcher.error().map(str::to_string),
            last_updated: self.fetcher.last_updated(),
            fetch_context: self.fetcher.last_context(),
            fetched_count: self.fetcher.stations().len(),
            heading: if count > 0 {
                format!("{} stations match your filters", count)
            } else {
                "No stations match your filters yet".to_string()
            },
            stations: self
                .visible
                .iter()
                .map(|s| StationCard {
                    row: ExportRow::from_feature(s),
                    selected: self.selected == Some(s.id()),
                })
                .collect(),
            clusters: self.layer.clusters(),
            open_popup: self.layer.open_popup_marker().cloned(),
            selected: self.selected,
            clipboard: self.clipboard.contents().map(str::to_string),
            toasts: std::mem::take(&mut self.toasts),
        }
    }

    fn teardown(&mut self) {
        self.fetcher.cancel();
        self.layer.remove_all();
    }
}

/// Cloneable sender side of a running session
#[derive(Clone)]
pub struct ExplorerHandle {
    tx: mpsc::Sender<Command>,
}

impl ExplorerHandle {
    pub async fn apply(&self, action: Action) -> ApiResult<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Apply(action, reply)).await?;
        rx.await.map_err(|_| ApiError::SessionClosed)?
    }

    pub async fn snapshot(&self) -> ApiResult<SessionSnapshot> {
        self.apply(Action::Snapshot).await
    }

    pub async fn export(&self, format: ExportFormat) -> ApiResult<ExportFile> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Export(format, reply)).await?;
        rx.await.map_err(|_| ApiError::SessionClosed)?
    }

    pub async fn shutdown(&self) -> ApiResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown(reply)).await?;
        rx.await.map_err(|_| ApiError::SessionClosed)
    }

    async fn send(&self, command: Command) -> ApiResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ApiError::SessionClosed)
    }
}

/// Mount a session seeded from a URL query and start its country fetch
pub fn spawn_session<S: ChargingDataSource>(
    id: u64,
    source: Arc<S>,
    options: SessionOptions,
    query: &str,
    clipboard: Box<dyn Clipboard>,
) -> ExplorerHandle {
    let state = UrlState::parse(query, &options.map);
    let (tx, commands) = mpsc::channel(COMMAND_BUFFER);
    let (completions_tx, completions) = mpsc::unbounded_channel();

    let session = ExplorerSession {
        id,
        fetcher: StationFetcher::new(source),
        completions: completions_tx,
        tracker: ViewportTracker::new(state.viewport, state.auto_update, options.debounce),
        filters: state.filters,
        visible: Vec::new(),
        layer: ClusterLayer::new(
            state.viewport,
            options.map.cluster_radius_px,
            options.map.min_zoom,
            options.map.max_zoom,
        ),
        markers: MarkerSync::new(),
        selected: state.selected,
        url: UrlSync::new(query),
        clipboard,
        toasts: Vec::new(),
        options,
    };
    tokio::spawn(session.run(commands, completions));

    ExplorerHandle { tx }
}

struct SessionEntry {
    handle: ExplorerHandle,
    last_seen: Instant,
}

/// Live sessions keyed by id
pub struct SessionRegistry<S> {
    source: Arc<S>,
    options: SessionOptions,
    next_id: AtomicU64,
    sessions: RwLock<HashMap<u64, SessionEntry>>,
}

impl<S: ChargingDataSource> SessionRegistry<S> {
    pub fn new(source: Arc<S>, options: SessionOptions) -> Self {
        Self {
            source,
            options,
            next_id: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn mount(&self, query: &str) -> ExplorerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = spawn_session(
            id,
            self.source.clone(),
            self.options.clone(),
            query,
            Box::new(ClipboardBuffer::default()),
        );
        let entry = SessionEntry {
            handle: handle.clone(),
            last_seen: Instant::now(),
        };
        self.sessions.write().await.insert(id, entry);
        handle
    }

    /// Look up a session and mark it as seen
    pub async fn get(&self, id: u64) -> ApiResult<ExplorerHandle> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", id)))?;
        entry.last_seen = Instant::now();
        Ok(entry.handle.clone())
    }

    pub async fn unmount(&self, id: u64) -> ApiResult<()> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", id)))?;
        entry.handle.shutdown().await
    }

    /// Unmount every session not seen for at least `idle`; returns how many were evicted
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<(u64, SessionEntry)> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<u64> = sessions
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_seen) >= idle)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        let evicted = expired.len();
        for (id, entry) in expired {
            if let Err(e) = entry.handle.shutdown().await {
                debug!(session = id, "Idle session was already closed: {}", e);
            }
        }
        if evicted > 0 {
            let remaining = self.len().await;
            info!(evicted, remaining, "Evicted idle sessions");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
