use crate::host::HostGeometry;
use crate::resolver::{DEFAULT_EXPORT_NAMES, SelectionPolicy};
use crate::script::Limits;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_REMOTE_URL: &str =
    "https://raw.githubusercontent.com/dingemoe/ui/main/dist/hello-component.umd.js";

/// Runtime configuration for the widget host.
///
/// Precedence, lowest first: defaults, the TOML file named by
/// `SHADOW_UMD_CONFIG`, environment variables, command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub remote_url: String,
    pub export_names: Vec<String>,
    pub legacy_global_diff: bool,
    pub fetch_timeout: Option<Duration>,
    pub max_steps: Option<u64>,
    pub max_call_depth: usize,
    pub autoload: bool,
    pub geometry: HostGeometry,
    pub enable_cors: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            remote_url: DEFAULT_REMOTE_URL.to_string(),
            export_names: DEFAULT_EXPORT_NAMES.iter().map(|s| s.to_string()).collect(),
            legacy_global_diff: true,
            fetch_timeout: None,
            max_steps: None,
            max_call_depth: Limits::default().max_call_depth,
            autoload: true,
            geometry: HostGeometry::default(),
            enable_cors: false,
        }
    }
}

/// Optional overlay read from TOML; every key may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bind_addr: Option<SocketAddr>,
    pub remote_url: Option<String>,
    pub export_names: Option<Vec<String>>,
    pub legacy_global_diff: Option<bool>,
    pub fetch_timeout_ms: Option<u64>,
    pub max_steps: Option<u64>,
    pub max_call_depth: Option<usize>,
    pub autoload: Option<bool>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub enable_cors: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    fn apply(self, config: &mut AppConfig) {
        if let Some(v) = self.bind_addr {
            config.bind_addr = v;
        }
        if let Some(v) = self.remote_url {
            config.remote_url = v;
        }
        if let Some(v) = self.export_names {
            config.export_names = v;
        }
        if let Some(v) = self.legacy_global_diff {
            config.legacy_global_diff = v;
        }
        if let Some(ms) = self.fetch_timeout_ms {
            config.fetch_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(v) = self.max_steps {
            config.max_steps = Some(v);
        }
        if let Some(v) = self.max_call_depth {
            config.max_call_depth = v;
        }
        if let Some(v) = self.autoload {
            config.autoload = v;
        }
        if let Some(v) = self.width {
            config.geometry.width = v;
        }
        if let Some(v) = self.height {
            config.geometry.height = v;
        }
        if let Some(v) = self.enable_cors {
            config.enable_cors = v;
        }
    }
}

/// Command-line overrides shared by every subcommand.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigArgs {
    /// Address to listen on.
    #[arg(long, global = true)]
    pub bind: Option<SocketAddr>,
    /// UMD bundle to load instead of the configured one.
    #[arg(long = "remote-url", global = true)]
    pub remote_url: Option<String>,
    /// Comma-separated well-known export names, highest priority first.
    #[arg(long, global = true, value_delimiter = ',')]
    pub export_names: Option<Vec<String>>,
    /// Do not fall back to scanning new globals.
    #[arg(long, global = true)]
    pub no_global_diff: bool,
    /// Abort payloads after this many evaluation steps.
    #[arg(long, global = true)]
    pub max_steps: Option<u64>,
    /// Fetch timeout in milliseconds.
    #[arg(long, global = true)]
    pub fetch_timeout_ms: Option<u64>,
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_var<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("failed to parse {key}"))
}

fn split_names(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("SHADOW_UMD_CONFIG") {
            FileConfig::load(Path::new(&path))?.apply(&mut config);
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies environment overrides read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = var("BIND_ADDR") {
            self.bind_addr = parse_var("BIND_ADDR", &v)?;
        }
        if let Some(v) = var("SHADOW_UMD_REMOTE_URL") {
            self.remote_url = v.trim().to_string();
        }
        if let Some(v) = var("SHADOW_UMD_EXPORT_NAMES") {
            self.export_names = split_names(&v);
        }
        if let Some(v) = var("SHADOW_UMD_LEGACY_GLOBAL_DIFF") {
            self.legacy_global_diff = parse_flag(&v);
        }
        if let Some(v) = var("SHADOW_UMD_FETCH_TIMEOUT_MS") {
            let ms: u64 = parse_var("SHADOW_UMD_FETCH_TIMEOUT_MS", &v)?;
            self.fetch_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(v) = var("SHADOW_UMD_MAX_STEPS") {
            self.max_steps = Some(parse_var("SHADOW_UMD_MAX_STEPS", &v)?);
        }
        if let Some(v) = var("SHADOW_UMD_MAX_CALL_DEPTH") {
            self.max_call_depth = parse_var("SHADOW_UMD_MAX_CALL_DEPTH", &v)?;
        }
        if let Some(v) = var("SHADOW_UMD_AUTOLOAD") {
            self.autoload = parse_flag(&v);
        }
        if let Some(v) = var("SHADOW_UMD_WIDTH") {
            self.geometry.width = parse_var("SHADOW_UMD_WIDTH", &v)?;
        }
        if let Some(v) = var("SHADOW_UMD_HEIGHT") {
            self.geometry.height = parse_var("SHADOW_UMD_HEIGHT", &v)?;
        }
        if let Some(v) = var("ENABLE_CORS") {
            self.enable_cors = parse_flag(&v);
        }
        Ok(())
    }

    pub fn apply_args(&mut self, args: &ConfigArgs) {
        if let Some(bind) = args.bind {
            self.bind_addr = bind;
        }
        if let Some(url) = &args.remote_url {
            self.remote_url = url.clone();
        }
        if let Some(names) = &args.export_names {
            self.export_names = names.clone();
        }
        if args.no_global_diff {
            self.legacy_global_diff = false;
        }
        if let Some(steps) = args.max_steps {
            self.max_steps = Some(steps);
        }
        if let Some(ms) = args.fetch_timeout_ms {
            self.fetch_timeout = Some(Duration::from_millis(ms));
        }
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            export_names: self.export_names.clone(),
            legacy_global_diff: self.legacy_global_diff,
        }
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_steps: self.max_steps,
            max_call_depth: self.max_call_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_stock_widget() {
        let config = AppConfig::default();
        assert_eq!(config.remote_url, DEFAULT_REMOTE_URL);
        assert_eq!(config.selection_policy(), SelectionPolicy::default());
        assert_eq!(config.limits().max_call_depth, 256);
        assert!(config.limits().max_steps.is_none());
        assert!(config.fetch_timeout.is_none());
        assert_eq!(config.geometry, HostGeometry { width: 350, height: 350 });
    }

    #[test]
    fn environment_overrides_defaults() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("BIND_ADDR", "127.0.0.1:9000"),
                ("SHADOW_UMD_EXPORT_NAMES", " Widget, ,App "),
                ("SHADOW_UMD_LEGACY_GLOBAL_DIFF", "off"),
                ("SHADOW_UMD_FETCH_TIMEOUT_MS", "1500"),
                ("SHADOW_UMD_MAX_STEPS", "10000"),
                ("SHADOW_UMD_AUTOLOAD", "0"),
                ("SHADOW_UMD_WIDTH", "420"),
                ("ENABLE_CORS", "TRUE"),
            ]))
            .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.export_names, vec!["Widget", "App"]);
        assert!(!config.legacy_global_diff);
        assert_eq!(config.fetch_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.max_steps, Some(10_000));
        assert!(!config.autoload);
        assert_eq!(config.geometry.width, 420);
        assert!(config.enable_cors);
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let err = AppConfig::default()
            .apply_env(env(&[("SHADOW_UMD_MAX_STEPS", "lots")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to parse SHADOW_UMD_MAX_STEPS");
    }

    #[test]
    fn file_overlay_then_cli_flags() {
        let file: FileConfig = toml::from_str(
            r#"
            remote_url = "https://cdn.test/widget.umd.js"
            export_names = ["Widget"]
            max_call_depth = 64
            height = 500
            "#,
        )
        .unwrap();
        let mut config = AppConfig::default();
        file.apply(&mut config);
        assert_eq!(config.remote_url, "https://cdn.test/widget.umd.js");
        assert_eq!(config.max_call_depth, 64);
        assert_eq!(config.geometry.height, 500);

        config.apply_args(&ConfigArgs {
            remote_url: Some("https://cdn.test/other.js".into()),
            no_global_diff: true,
            ..ConfigArgs::default()
        });
        assert_eq!(config.remote_url, "https://cdn.test/other.js");
        assert_eq!(config.export_names, vec!["Widget"]);
        assert!(!config.legacy_global_diff);
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("colour = 'red'").is_err());
    }
}
