//! Prometheus recorder for the CLI
//!
//! Installed globally so counters from every crate land in one registry;
//! `--metrics` renders it in the text exposition format on exit.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}
