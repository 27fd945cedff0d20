use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

pub const HOST_ID: &str = "shadow-umd-host";

/// Highest z-index browsers honor.
const MAX_Z_INDEX: u32 = 2_147_483_647;

const SHADOW_RESET_CSS: &str = ":host { all: initial; }\n\
*, *::before, *::after { box-sizing: border-box; }\n\
html, body, #root { margin: 0; padding: 0; }";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGeometry {
    pub width: u32,
    pub height: u32,
}

impl Default for HostGeometry {
    fn default() -> Self {
        Self {
            width: 350,
            height: 350,
        }
    }
}

/// Inline style for the host element.
pub fn host_style(geometry: HostGeometry, visible: bool) -> String {
    format!(
        "all:initial;position:fixed;z-index:{MAX_Z_INDEX};bottom:0;right:0;\
         width:{}px;height:{}px;background:black;color:white;border-radius:0.75rem;\
         overflow:hidden;pointer-events:auto;box-shadow:0 12px 30px rgba(0,0,0,.35);display:{}",
        geometry.width,
        geometry.height,
        if visible { "block" } else { "none" }
    )
}

/// Host element with a declarative open shadow root around `mount_markup`.
pub fn host_markup(geometry: HostGeometry, visible: bool, mount_markup: &str) -> String {
    format!(
        "<div id=\"{HOST_ID}\" style=\"{}\">\
         <template shadowrootmode=\"open\"><style>{SHADOW_RESET_CSS}</style>{mount_markup}</template>\
         </div>",
        host_style(geometry, visible)
    )
}

/// Ctrl+Alt+X flips the host locally and persists the state server-side.
/// `window.__shadowUmd.reload()` asks the server for a fresh resolution.
fn host_script() -> String {
    format!(
        r#"<script>
(function () {{
  var host = document.getElementById('{HOST_ID}');
  if (!host) return;
  document.addEventListener('keydown', function (e) {{
    if (e.ctrlKey && e.altKey && e.key.toLowerCase() === 'x') {{
      host.style.display = host.style.display === 'none' ? 'block' : 'none';
      fetch('/api/toggle', {{ method: 'POST' }}).catch(function () {{}});
    }}
  }});
  window.__shadowUmd = {{
    host: host,
    reload: function () {{
      return fetch('/api/reload', {{ method: 'POST' }}).then(function () {{ location.reload(); }});
    }}
  }};
}})();
</script>"#
    )
}

/// Demo page that embeds the widget host.
pub fn host_page(host: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>shadow-umd</title></head>\
         <body>{host}{}</body></html>",
        host_script()
    )
}

/// Process-wide guard; only the first `try_acquire` succeeds.
#[derive(Debug, Default)]
pub struct BootGuard {
    booted: AtomicBool,
}

impl BootGuard {
    pub const fn new() -> Self {
        Self {
            booted: AtomicBool::new(false),
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.booted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_booted(&self) -> bool {
        self.booted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_style_matches_widget_geometry() {
        let style = host_style(HostGeometry::default(), true);
        for part in [
            "position:fixed",
            "bottom:0;right:0",
            "width:350px;height:350px",
            "background:black;color:white",
            "border-radius:0.75rem",
            "z-index:2147483647",
            "display:block",
        ] {
            assert!(style.contains(part), "missing {part}");
        }
        assert!(host_style(HostGeometry::default(), false).ends_with("display:none"));
    }

    #[test]
    fn markup_wraps_mount_in_shadow_root() {
        let markup = host_markup(
            HostGeometry {
                width: 400,
                height: 300,
            },
            true,
            "<div id=\"root\"></div>",
        );
        assert!(markup.starts_with("<div id=\"shadow-umd-host\""));
        assert!(markup.contains("width:400px;height:300px"));
        assert!(markup.contains("<template shadowrootmode=\"open\"><style>:host { all: initial; }"));
        assert!(markup.contains("<div id=\"root\"></div></template>"));
    }

    #[test]
    fn page_binds_toggle_hotkey() {
        let page = host_page("<div id=\"shadow-umd-host\"></div>");
        assert!(page.contains("e.ctrlKey && e.altKey"));
        assert!(page.contains("/api/toggle"));
    }

    #[test]
    fn boot_guard_admits_one_boot() {
        let guard = BootGuard::new();
        assert!(!guard.is_booted());
        assert!(guard.try_acquire());
        assert!(!guard.try_acquire());
        assert!(guard.is_booted());
    }
}
