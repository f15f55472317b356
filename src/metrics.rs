// src/metrics.rs
use std::net::SocketAddr;

use anyhow::{anyhow, Context, Result};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. With `listen`, `/metrics` is also
    /// served there from a task on the current runtime.
    pub fn init(listen: Option<SocketAddr>) -> Result<Self> {
        let builder = PrometheusBuilder::new();
        let handle = match listen {
            Some(addr) => {
                let (recorder, exporter) = builder
                    .with_http_listener(addr)
                    .build()
                    .context("prometheus: build exporter")?;
                let handle = recorder.handle();
                metrics::set_global_recorder(recorder)
                    .map_err(|_| anyhow!("prometheus: a metrics recorder is already installed"))?;
                tokio::spawn(async move {
                    if let Err(e) = exporter.await {
                        tracing::warn!(error = ?e, "metrics exporter stopped");
                    }
                });
                tracing::info!(%addr, "serving /metrics");
                handle
            }
            None => builder
                .install_recorder()
                .context("prometheus: install recorder")?,
        };
        describe();
        Ok(Self { handle })
    }

    /// Current exposition text.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Register help text for the job counters (once per process).
pub fn describe() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("listings_fetched_total", "Listings returned by the search.");
        describe_counter!("listings_new_total", "Fetched listings not seen before.");
        describe_counter!("notifications_sent_total", "Emails accepted by the transport.");
        describe_counter!("notifications_failed_total", "Emails that failed to send.");
        describe_counter!("fetch_errors_total", "Invocations aborted by a search failure.");
        describe_counter!(
            "seen_store_save_errors_total",
            "Invocations whose seen-set could not be written."
        );
    });
}
