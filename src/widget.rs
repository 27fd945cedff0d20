use crate::host::{self, BootGuard, HOST_ID, HostGeometry};
use crate::render::{MOUNT_ID, MountStatus, MountedView, mount_export};
use crate::resolver::{ExportKind, ExportSource, FailureKind, ResolveFailure, Resolver};
use crate::scope::ExecutionScope;
use crate::script::Limits;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BootError {
    #[error("widget already booted")]
    AlreadyBooted,
}

/// The current render of the isolated host.
#[derive(Debug, Clone, Serialize)]
pub struct MountState {
    pub status: MountStatus,
    #[serde(skip)]
    pub markup: String,
    pub message: Option<String>,
    pub source: Option<ExportSource>,
    pub export_kind: Option<ExportKind>,
    pub failure: Option<FailureKind>,
    pub attempt_id: Option<Uuid>,
    pub completed_at: Option<String>,
}

impl MountState {
    fn loading() -> Self {
        Self::from_view(MountedView::loading())
    }

    fn from_view(view: MountedView) -> Self {
        Self {
            status: view.status,
            markup: view.markup,
            message: view.message,
            source: None,
            export_kind: None,
            failure: None,
            attempt_id: None,
            completed_at: None,
        }
    }

    fn completed(mut self, attempt_id: Uuid) -> Self {
        self.attempt_id = Some(attempt_id);
        self.completed_at = Some(chrono::Utc::now().to_rfc3339());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WidgetStatus {
    pub host_id: &'static str,
    pub mount_id: &'static str,
    pub remote_url: String,
    pub booted: bool,
    pub visible: bool,
    pub mount: MountState,
}

/// Owns the boot guard and the mount state. Every reload runs the payload
/// against a global table of its own.
pub struct Widget {
    resolver: Resolver,
    remote_url: String,
    geometry: HostGeometry,
    limits: Limits,
    mount: RwLock<MountState>,
    visible: AtomicBool,
    guard: BootGuard,
}

impl Widget {
    pub fn new(
        resolver: Resolver,
        remote_url: impl Into<String>,
        geometry: HostGeometry,
        limits: Limits,
    ) -> Self {
        Self {
            resolver,
            remote_url: remote_url.into(),
            geometry,
            limits,
            mount: RwLock::new(MountState::loading()),
            visible: AtomicBool::new(true),
            guard: BootGuard::new(),
        }
    }

    /// Shows the loading shell, then resolves and mounts when `autoload` is set.
    pub async fn boot(&self, autoload: bool) -> Result<(), BootError> {
        if !self.guard.try_acquire() {
            warn!("boot requested twice; ignoring");
            return Err(BootError::AlreadyBooted);
        }
        *self.mount.write().await = MountState::loading();
        if autoload {
            info!(url = %self.remote_url, "fetching UMD");
            self.reload().await;
        }
        Ok(())
    }

    /// Runs a fresh resolution and mount. Concurrent reloads are independent;
    /// whichever finishes last owns the mount.
    pub async fn reload(&self) -> MountState {
        let scope = ExecutionScope::fresh();
        let realm = scope.global().realm().clone();
        let state = match self.resolver.resolve(&self.remote_url, &scope).await {
            Ok(export) => {
                let limits = self.limits;
                let value = export.value.clone();
                let global = export.global.clone();
                let view = tokio::task::spawn_blocking(move || mount_export(&value, &global, limits))
                    .await
                    .unwrap_or_else(|join_err| {
                        MountedView::failed(&format!("render aborted: {join_err}"))
                    });
                if view.status == MountStatus::Rendered {
                    info!(source = %export.source, "rendered remote component");
                }
                let mut state = MountState::from_view(view);
                state.source = Some(export.source);
                state.export_kind = Some(export.kind);
                state.completed(export.attempt_id)
            }
            Err(err) => {
                error!(error = %err, attempt_id = %err.attempt_id, "failed to load remote component");
                let failure = ResolveFailure::from(&err);
                let mut state = MountState::from_view(MountedView::failed(&failure.message));
                state.failure = Some(failure.kind);
                state.completed(err.attempt_id)
            }
        };
        // The markup is a string by now; break the attempt's reference cycles.
        realm.dispose();
        *self.mount.write().await = state.clone();
        state
    }

    /// Flips visibility and returns the new value.
    pub fn toggle(&self) -> bool {
        !self.visible.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    pub fn is_booted(&self) -> bool {
        self.guard.is_booted()
    }

    pub async fn mount_state(&self) -> MountState {
        self.mount.read().await.clone()
    }

    pub async fn status(&self) -> WidgetStatus {
        self.status_with(self.mount_state().await)
    }

    /// Status around a specific mount, such as the one a reload just produced.
    pub fn status_with(&self, mount: MountState) -> WidgetStatus {
        WidgetStatus {
            host_id: HOST_ID,
            mount_id: MOUNT_ID,
            remote_url: self.remote_url.clone(),
            booted: self.is_booted(),
            visible: self.is_visible(),
            mount,
        }
    }

    pub async fn host_markup(&self) -> String {
        let mount = self.mount.read().await;
        host::host_markup(self.geometry, self.is_visible(), &mount.markup)
    }

    pub async fn page(&self) -> String {
        host::host_page(&self.host_markup().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticModuleFetcher;
    use crate::resolver::SelectionPolicy;
    use std::sync::Arc;

    const URL: &str = "https://cdn.test/hello.umd.js";

    fn widget_with(fetcher: StaticModuleFetcher) -> Widget {
        let resolver = Resolver::new(
            Arc::new(fetcher),
            SelectionPolicy::default(),
            Limits::default(),
        );
        Widget::new(resolver, URL, HostGeometry::default(), Limits::default())
    }

    fn hello_widget() -> Widget {
        widget_with(StaticModuleFetcher::new().with_module(
            URL,
            "window.HelloComponent = function () { return React.createElement('p', null, 'Hello from remote!') };",
        ))
    }

    #[tokio::test]
    async fn boot_mounts_the_remote_component_once() {
        let widget = hello_widget();
        widget.boot(true).await.unwrap();
        let state = widget.mount_state().await;
        assert_eq!(state.status, MountStatus::Rendered);
        assert_eq!(
            state.source,
            Some(ExportSource::WellKnown("HelloComponent".into()))
        );
        assert!(state.markup.contains("<p>Hello from remote!</p>"));
        assert!(state.completed_at.is_some());
        assert_eq!(widget.boot(true).await, Err(BootError::AlreadyBooted));
    }

    #[tokio::test]
    async fn boot_without_autoload_shows_loading_shell() {
        let widget = hello_widget();
        widget.boot(false).await.unwrap();
        let state = widget.mount_state().await;
        assert_eq!(state.status, MountStatus::Loading);
        assert!(widget.host_markup().await.contains("Loading remote component"));
    }

    #[tokio::test]
    async fn fetch_failure_renders_error_view() {
        let widget = widget_with(StaticModuleFetcher::new());
        widget.boot(true).await.unwrap();
        let state = widget.mount_state().await;
        assert_eq!(state.status, MountStatus::Failed);
        assert_eq!(state.failure, Some(FailureKind::Fetch));
        assert_eq!(
            state.message.as_deref(),
            Some("Failed to load remote component: HTTP 404 for https://cdn.test/hello.umd.js")
        );
    }

    #[tokio::test]
    async fn invalid_export_gets_placeholder() {
        let widget = widget_with(
            StaticModuleFetcher::new().with_module(URL, "window.App = { version: 1 };"),
        );
        let state = widget.reload().await;
        assert_eq!(state.status, MountStatus::Invalid);
        assert_eq!(state.export_kind, Some(ExportKind::PlainObject));
    }

    #[tokio::test]
    async fn concurrent_reloads_leave_one_completed_state() {
        let widget = Arc::new(hello_widget());
        let (a, b) = tokio::join!(widget.reload(), widget.reload());
        assert_ne!(a.attempt_id, b.attempt_id);
        let current = widget.mount_state().await.attempt_id;
        assert!(current == a.attempt_id || current == b.attempt_id);
    }

    #[tokio::test]
    async fn reload_after_boot_renders_the_same_component_again() {
        let widget = widget_with(StaticModuleFetcher::new().with_module(
            URL,
            "window.Widget = function () { return React.createElement('p', null, 'hi') };",
        ));
        widget.boot(true).await.unwrap();
        let booted = widget.mount_state().await;
        assert_eq!(booted.status, MountStatus::Rendered);
        assert_eq!(booted.source, Some(ExportSource::NewBinding("Widget".into())));

        let reloaded = widget.reload().await;
        assert_eq!(reloaded.status, MountStatus::Rendered);
        assert_eq!(reloaded.source, booted.source);
        assert_eq!(reloaded.markup, booted.markup);
        assert_ne!(reloaded.attempt_id, booted.attempt_id);
    }

    #[tokio::test]
    async fn vite_bundle_mounts_on_boot() {
        let widget = widget_with(
            StaticModuleFetcher::new().with_module(URL, crate::resolver::VITE_HELLO_COMPONENT),
        );
        widget.boot(true).await.unwrap();
        let state = widget.mount_state().await;
        assert_eq!(state.status, MountStatus::Rendered);
        assert!(state.markup.contains("<div>Hello from component</div>"));
    }

    #[tokio::test]
    async fn failed_reload_reports_its_own_attempt() {
        let widget = widget_with(
            StaticModuleFetcher::new().with_module(URL, "throw new Error('boom')"),
        );
        let first = widget.reload().await;
        let second = widget.reload().await;
        assert_eq!(first.failure, Some(FailureKind::Eval));
        assert!(first.attempt_id.is_some_and(|id| !id.is_nil()));
        assert_ne!(first.attempt_id, second.attempt_id);
    }

    #[tokio::test]
    async fn toggle_hides_and_shows_the_host() {
        let widget = hello_widget();
        assert!(widget.is_visible());
        assert!(!widget.toggle());
        assert!(widget.host_markup().await.contains("display:none"));
        assert!(widget.toggle());
        let status = widget.status().await;
        assert!(status.visible);
        assert_eq!(status.host_id, "shadow-umd-host");
    }
}
