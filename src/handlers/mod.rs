/// HTTP request handlers
use crate::clients::ChargingDataSource;
use crate::domain::{Bounds, FilterOptions, FilterState, Health, LatLng, MapViewport};
use crate::errors::{ApiError, ApiResult};
use crate::services::session::SessionSnapshot;
use crate::services::{Action, ExportFormat, LocateFailure, ReferenceLoader, SessionRegistry};
use axum::{
    extract::{FromRequest, Path, RawQuery, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Application state shared across handlers
pub struct AppState<S> {
    pub registry: Arc<SessionRegistry<S>>,
    pub reference: Arc<ReferenceLoader<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            reference: self.reference.clone(),
        }
    }
}

/// Successful response wrapper
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

/// JSON body whose rejections are reported in the error envelope
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

type SnapshotResponse = ApiResult<Json<SuccessResponse<SessionSnapshot>>>;

#[derive(Serialize)]
pub struct ReferenceBody {
    pub loaded: bool,
    pub options: FilterOptions,
}

#[derive(Debug, Deserialize)]
pub struct ViewportRequest {
    pub center: LatLng,
    pub zoom: u8,
    pub bounds: Bounds,
}

#[derive(Debug, Deserialize)]
pub struct AutoUpdateRequest {
    pub enabled: bool,
}

/// Browser geolocation outcome relayed by the client
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LocateRequest {
    Position { lat: f64, lng: f64 },
    Failure { error: LocateFailure },
}

/// Health check handler
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        now: Utc::now(),
    })
}

/// Facet options for the filter pickers
pub async fn get_reference<S: ChargingDataSource>(
    State(state): State<AppState<S>>,
) -> Json<SuccessResponse<ReferenceBody>> {
    let options = state.reference.options().await;
    Json(SuccessResponse::new(ReferenceBody {
        loaded: state.reference.is_loaded(),
        options,
    }))
}

/// Mount a session from the page's URL query
pub async fn mount_session<S: ChargingDataSource>(
    State(state): State<AppState<S>>,
    RawQuery(query): RawQuery,
) -> SnapshotResponse {
    let handle = state.registry.mount(query.as_deref().unwrap_or("")).await;
    let snapshot = handle.snapshot().await?;
    Ok(Json(SuccessResponse::new(snapshot)))
}

pub async fn get_session<S: ChargingDataSource>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
) -> SnapshotResponse {
    apply(&state, id, Action::Snapshot).await
}

/// Unmount a session, aborting its in-flight fetch
pub async fn delete_session<S: ChargingDataSource>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
) -> ApiResult<Json<Value>> {
    state.registry.unmount(id).await?;
    Ok(Json(serde_json::json!(SuccessResponse::new(
        serde_json::json!({
            "closed": id
        })
    ))))
}

pub async fn move_viewport<S: ChargingDataSource>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
    ApiJson(body): ApiJson<ViewportRequest>,
) -> SnapshotResponse {
    let action = Action::Moved {
        viewport: MapViewport {
            center: body.center,
            zoom: body.zoom,
        },
        bounds: body.bounds,
    };
    apply(&state, id, action).await
}

pub async fn set_filters<S: ChargingDataSource>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
    ApiJson(filters): ApiJson<FilterState>,
) -> SnapshotResponse {
    apply(&state, id, Action::SetFilters(filters)).await
}

pub async fn reset_filters<S: ChargingDataSource>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
) -> SnapshotResponse {
    apply(&state, id, Action::ResetFilters).await
}

pub async fn set_auto_update<S: ChargingDataSource>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
    ApiJson(body): ApiJson<AutoUpdateRequest>,
) -> SnapshotResponse {
    apply(&state, id, Action::SetAutoUpdate(body.enabled)).await
}

/// "Search this area" in manual mode
pub async fn search_area<S: ChargingDataSource>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
) -> SnapshotResponse {
    apply(&state, id, Action::SearchArea).await
}

pub async fn retry<S: ChargingDataSource>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
) -> SnapshotResponse {
    apply(&state, id, Action::Retry).await
}

pub async fn dismiss_error<S: ChargingDataSource>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
) -> SnapshotResponse {
    apply(&state, id, Action::DismissError).await
}

pub async fn select_station<S: ChargingDataSource>(
    Path((id, poi)): Path<(u64, i64)>,
    State(state): State<AppState<S>>,
) -> SnapshotResponse {
    apply(&state, id, Action::Select(poi)).await
}

pub async fn locate<S: ChargingDataSource>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
    ApiJson(body): ApiJson<LocateRequest>,
) -> SnapshotResponse {
    let outcome = match body {
        LocateRequest::Position { lat, lng } => Ok(LatLng::new(lat, lng)),
        LocateRequest::Failure { error } => Err(error),
    };
    apply(&state, id, Action::Locate(outcome)).await
}

pub async fn copy_address<S: ChargingDataSource>(
    Path((id, poi)): Path<(u64, i64)>,
    State(state): State<AppState<S>>,
) -> SnapshotResponse {
    apply(&state, id, Action::CopyAddress(poi)).await
}

pub async fn share_station<S: ChargingDataSource>(
    Path((id, poi)): Path<(u64, i64)>,
    State(state): State<AppState<S>>,
) -> SnapshotResponse {
    apply(&state, id, Action::Share(poi)).await
}

pub async fn export_csv<S: ChargingDataSource>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
) -> ApiResult<Response> {
    export_as(&state, id, ExportFormat::Csv).await
}

pub async fn export_json<S: ChargingDataSource>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
) -> ApiResult<Response> {
    export_as(&state, id, ExportFormat::Json).await
}

async fn apply<S: ChargingDataSource>(
    state: &AppState<S>,
    id: u64,
    action: Action,
) -> SnapshotResponse {
    let handle = state.registry.get(id).await?;
    let snapshot = handle.apply(action).await?;
    Ok(Json(SuccessResponse::new(snapshot)))
}

async fn export_as<S: ChargingDataSource>(
    state: &AppState<S>,
    id: u64,
    format: ExportFormat,
) -> ApiResult<Response> {
    let handle = state.registry.get(id).await?;
    let file = handle.export(format).await?;
    let headers = [
        (header::CONTENT_TYPE, file.format.content_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.format.filename()),
        ),
    ];
    Ok((headers, file.body).into_response())
}
