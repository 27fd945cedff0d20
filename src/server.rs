use crate::api;
use crate::config::AppConfig;
use crate::widget::Widget;
use axum::Router;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub widget: Arc<Widget>,
}

impl AppState {
    pub fn new(config: AppConfig, widget: Arc<Widget>) -> Self {
        Self { config, widget }
    }
}

pub fn router(state: AppState) -> Router {
    let enable_cors = state.config.enable_cors;
    let router = Router::new()
        .route("/", get(api::index))
        .route("/widget", get(api::widget_markup))
        .route("/api/reload", post(api::reload))
        .route("/api/toggle", post(api::toggle))
        .route("/api/status", get(api::status))
        .route("/healthz", get(api::healthz))
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

pub async fn run(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticModuleFetcher;
    use crate::host::HostGeometry;
    use crate::resolver::{Resolver, SelectionPolicy};
    use crate::script::Limits;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    const URL: &str = "https://cdn.test/remote.umd.js";

    async fn state_with(source: Option<&str>, autoload: bool) -> AppState {
        let mut fetcher = StaticModuleFetcher::new();
        if let Some(source) = source {
            fetcher = fetcher.with_module(URL, source);
        }
        let resolver = Resolver::new(
            Arc::new(fetcher),
            SelectionPolicy::default(),
            Limits::default(),
        );
        let widget = Arc::new(Widget::new(
            resolver,
            URL,
            HostGeometry::default(),
            Limits::default(),
        ));
        widget.boot(autoload).await.unwrap();
        let config = AppConfig {
            remote_url: URL.to_string(),
            ..AppConfig::default()
        };
        AppState::new(config, widget)
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn index_embeds_rendered_host() {
        let state = state_with(
            Some("window.RemoteComponent = () => React.createElement('b', null, 'hi');"),
            true,
        )
        .await;
        let (status, body) = send(router(state), "GET", "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("id=\"shadow-umd-host\""));
        assert!(body.contains("<b>hi</b>"));
    }

    #[tokio::test]
    async fn status_reports_mount_state() {
        let state = state_with(Some("window.Foo = { x: 1 };"), true).await;
        let (status, body) = send(router(state), "GET", "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["host_id"], "shadow-umd-host");
        assert_eq!(json["mount_id"], "root");
        assert_eq!(json["mount"]["status"], "invalid");
        assert_eq!(
            json["mount"]["source"],
            serde_json::json!({ "via": "new_binding", "name": "Foo" })
        );
    }

    #[tokio::test]
    async fn reload_failure_is_a_bad_gateway() {
        let state = state_with(None, false).await;
        let (status, body) = send(router(state), "POST", "/api/reload").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["mount"]["failure"], "fetch");
        assert_eq!(json["mount"]["status"], "failed");
    }

    #[tokio::test]
    async fn reload_answers_with_the_mount_it_produced() {
        let state = state_with(
            Some("window.Widget = function () { return React.createElement('em', null, 'x') };"),
            false,
        )
        .await;
        let app = router(state);
        let (status, body) = send(app.clone(), "POST", "/api/reload").await;
        assert_eq!(status, StatusCode::OK);
        let reloaded: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(reloaded["mount"]["status"], "rendered");
        assert!(reloaded["mount"]["attempt_id"].is_string());

        let (_, body) = send(app, "GET", "/api/status").await;
        let current: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(current["mount"]["attempt_id"], reloaded["mount"]["attempt_id"]);
    }

    #[tokio::test]
    async fn toggle_flips_visibility() {
        let state = state_with(None, false).await;
        let app = router(state.clone());
        let (_, body) = send(app.clone(), "POST", "/api/toggle").await;
        assert_eq!(body, r#"{"visible":false}"#);
        let (_, markup) = send(app, "GET", "/widget").await;
        assert!(markup.contains("display:none"));
        assert!(!state.widget.is_visible());
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let state = state_with(None, false).await;
        let (status, body) = send(router(state), "GET", "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
