use crate::render::MountStatus;
use crate::server::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use serde_json::json;

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(state.widget.page().await)
}

pub async fn widget_markup(State(state): State<AppState>) -> Html<String> {
    Html(state.widget.host_markup().await)
}

/// Resolves the payload again and reports that attempt's mount, even if a
/// concurrent reload finished later. A failed load answers 502 with the same body shape.
pub async fn reload(State(state): State<AppState>) -> impl IntoResponse {
    let mount = state.widget.reload().await;
    let code = if mount.status == MountStatus::Failed {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    (code, Json(state.widget.status_with(mount)))
}

pub async fn toggle(State(state): State<AppState>) -> impl IntoResponse {
    let visible = state.widget.toggle();
    Json(json!({ "visible": visible }))
}

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.widget.status().await)
}

pub async fn healthz() -> &'static str {
    "ok"
}
