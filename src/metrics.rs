use std::net::SocketAddr;

/// Installs the Prometheus exporter when metrics scraping is wanted.
///
/// The orchestrator records counters and histograms unconditionally through
/// the `metrics` facade; without an installed exporter they are no-ops.
pub fn init_metrics() {
    let port: u16 = std::env::var("REVFLOW_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9898);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            println!("[metrics] Prometheus exporter listening on http://{}/metrics", addr);
        }
        Err(e) => {
            println!("[metrics] Prometheus exporter install failed (possibly already installed): {}", e);
        }
    }
}
