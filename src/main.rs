mod api;
mod config;
mod fetch;
mod host;
mod render;
mod resolver;
mod scope;
mod script;
mod server;
mod widget;

use crate::config::{AppConfig, ConfigArgs};
use crate::fetch::HttpModuleFetcher;
use crate::render::{MountStatus, mount_export};
use crate::resolver::Resolver;
use crate::scope::ExecutionScope;
use crate::server::AppState;
use crate::widget::Widget;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "shadow-umd", version, about = "Serves a remote UMD component inside an isolated widget host")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    overrides: ConfigArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Boot the widget and serve it over HTTP (default).
    Serve,
    /// Resolve a bundle once and print what it exports.
    Resolve {
        /// Bundle URL; defaults to the configured remote URL.
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    config.apply_args(&cli.overrides);

    let fetcher = HttpModuleFetcher::new(config.fetch_timeout)
        .context("failed to build HTTP client")?;
    let resolver = Resolver::new(
        Arc::new(fetcher),
        config.selection_policy(),
        config.limits(),
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, resolver).await,
        Command::Resolve { url } => {
            let url = url.unwrap_or_else(|| config.remote_url.clone());
            resolve_once(&url, &resolver, &config).await
        }
    }
}

async fn serve(config: AppConfig, resolver: Resolver) -> anyhow::Result<()> {
    let widget = Arc::new(Widget::new(
        resolver,
        config.remote_url.clone(),
        config.geometry,
        config.limits(),
    ));
    widget
        .boot(config.autoload)
        .await
        .context("failed to boot widget")?;

    let addr: SocketAddr = config.bind_addr;
    tracing::info!(%addr, url = %config.remote_url, "starting shadow-umd server");
    server::run(addr, AppState::new(config, widget)).await
}

async fn resolve_once(url: &str, resolver: &Resolver, config: &AppConfig) -> anyhow::Result<()> {
    let scope = ExecutionScope::fresh();
    let export = resolver
        .resolve(url, &scope)
        .await
        .with_context(|| format!("failed to resolve {url}"))?;
    println!("source: {}", export.source);
    println!("kind: {:?}", export.kind);
    println!("new globals: {}", export.new_keys.join(", "));

    let limits = config.limits();
    let value = export.value.clone();
    let global = export.global.clone();
    let view = tokio::task::spawn_blocking(move || mount_export(&value, &global, limits)).await?;
    export.global.realm().dispose();
    println!("{}", view.markup);
    if view.status != MountStatus::Rendered {
        anyhow::bail!(
            "export did not render: {}",
            view.message.unwrap_or_else(|| format!("{:?}", view.status))
        );
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
