//! Driver Fatigue Monitor - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, AppConfig, AppState, ControlPanel, Monitor, ReplayBackend};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("loading configuration")?;

    init_logging(&config.logging.level, config.logging.json)?;
    info!("=== Driver Fatigue Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = &config.server.metrics_addr {
        let addr: SocketAddr = addr.parse().context("parsing metrics_addr")?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        info!("Prometheus metrics on {}", addr);
    }

    let backend = ReplayBackend::open(&config.trace_path, config.camera.clone())
        .with_context(|| format!("opening landmark trace {}", config.trace_path.display()))?;

    let monitor = Monitor::new(
        ControlPanel::new(config.detection.clone()),
        config.camera.clone(),
        config.dms.clone(),
        config.alerts.clone(),
        Arc::new(backend),
    );
    let state = Arc::new(AppState::new(monitor));

    run_server(
        &config.server.bind_addr,
        state,
        config.server.rate_limit.as_ref(),
    )
    .await
}
