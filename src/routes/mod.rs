/// Application routes configuration
use crate::clients::ChargingDataSource;
use crate::handlers::{
    copy_address, delete_session, dismiss_error, export_csv, export_json, get_reference,
    get_session, health, locate, mount_session, move_viewport, reset_filters, retry, search_area,
    select_station, set_auto_update, set_filters, share_station, AppState,
};
use axum::{
    routing::{get, post},
    Router,
};

/// Build the application router with all routes
pub fn build_router<S: ChargingDataSource>(state: AppState<S>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Reference vocabularies
        .route("/api/reference", get(get_reference::<S>))
        // Session lifecycle
        .route("/api/sessions", post(mount_session::<S>))
        .route(
            "/api/sessions/:id",
            get(get_session::<S>).delete(delete_session::<S>),
        )
        // Map and filter interactions
        .route("/api/sessions/:id/viewport", post(move_viewport::<S>))
        .route("/api/sessions/:id/filters", post(set_filters::<S>))
        .route("/api/sessions/:id/filters/reset", post(reset_filters::<S>))
        .route("/api/sessions/:id/auto-update", post(set_auto_update::<S>))
        .route("/api/sessions/:id/search-area", post(search_area::<S>))
        .route("/api/sessions/:id/retry", post(retry::<S>))
        .route("/api/sessions/:id/error/dismiss", post(dismiss_error::<S>))
        .route("/api/sessions/:id/select/:poi", post(select_station::<S>))
        .route("/api/sessions/:id/locate", post(locate::<S>))
        // Station actions
        .route(
            "/api/sessions/:id/stations/:poi/copy-address",
            post(copy_address::<S>),
        )
        .route("/api/sessions/:id/stations/:poi/share", post(share_station::<S>))
        // Export
        .route("/api/sessions/:id/export.csv", get(export_csv::<S>))
        .route("/api/sessions/:id/export.json", get(export_json::<S>))
        .with_state(state)
}
