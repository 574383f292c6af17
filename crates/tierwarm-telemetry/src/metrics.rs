//! Prometheus-backed transfer counters and textfile export.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Runs are short-lived, so metrics are written to a node-exporter textfile
//!   instead of being served.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry for a single run.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    transfer_outcomes_total: IntCounterVec,
    transfer_bytes_total: IntCounterVec,
    sidecar_transfers_total: IntCounterVec,
    orphans_relocated_total: IntCounter,
    last_run_timestamp_seconds: IntGauge,
    last_run_aborted: IntGauge,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("tierwarm".to_string()), None).map_err(
            |source| TelemetryError::MetricsCollector {
                name: "registry",
                source,
            },
        )?;

        let transfer_outcomes_total = IntCounterVec::new(
            Opts::new(
                "transfer_outcomes_total",
                "Media transfers by phase and outcome",
            ),
            &["phase", "outcome"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "transfer_outcomes_total",
            source,
        })?;
        let transfer_bytes_total = IntCounterVec::new(
            Opts::new("transfer_bytes_total", "Media bytes transferred by phase"),
            &["phase"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "transfer_bytes_total",
            source,
        })?;
        let sidecar_transfers_total = IntCounterVec::new(
            Opts::new(
                "sidecar_transfers_total",
                "Sidecar transfers by phase and status",
            ),
            &["phase", "status"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "sidecar_transfers_total",
            source,
        })?;
        let orphans_relocated_total = IntCounter::with_opts(Opts::new(
            "orphans_relocated_total",
            "Orphaned sidecars moved back to the array",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "orphans_relocated_total",
            source,
        })?;
        let last_run_timestamp_seconds = IntGauge::with_opts(Opts::new(
            "last_run_timestamp_seconds",
            "Unix time at which the last run finished",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "last_run_timestamp_seconds",
            source,
        })?;
        let last_run_aborted = IntGauge::with_opts(Opts::new(
            "last_run_aborted",
            "1 when the last run aborted before transferring anything",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "last_run_aborted",
            source,
        })?;

        register(&registry, "transfer_outcomes_total", &transfer_outcomes_total)?;
        register(&registry, "transfer_bytes_total", &transfer_bytes_total)?;
        register(&registry, "sidecar_transfers_total", &sidecar_transfers_total)?;
        register(&registry, "orphans_relocated_total", &orphans_relocated_total)?;
        register(
            &registry,
            "last_run_timestamp_seconds",
            &last_run_timestamp_seconds,
        )?;
        register(&registry, "last_run_aborted", &last_run_aborted)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                transfer_outcomes_total,
                transfer_bytes_total,
                sidecar_transfers_total,
                orphans_relocated_total,
                last_run_timestamp_seconds,
                last_run_aborted,
            }),
        })
    }

    /// Add `count` items that finished a phase with the given outcome.
    pub fn add_outcomes(&self, phase: &str, outcome: &str, count: u64) {
        self.inner
            .transfer_outcomes_total
            .with_label_values(&[phase, outcome])
            .inc_by(count);
    }

    /// Add bytes moved onto the destination tier during a phase.
    pub fn add_bytes(&self, phase: &str, bytes: u64) {
        self.inner
            .transfer_bytes_total
            .with_label_values(&[phase])
            .inc_by(bytes);
    }

    /// Add sidecar transfers with the given status (`copied` or `failed`).
    pub fn add_sidecars(&self, phase: &str, status: &str, count: u64) {
        self.inner
            .sidecar_transfers_total
            .with_label_values(&[phase, status])
            .inc_by(count);
    }

    /// Add relocated orphan sidecars.
    pub fn add_orphans(&self, count: u64) {
        self.inner.orphans_relocated_total.inc_by(count);
    }

    /// Record when the run finished and whether it aborted.
    pub fn record_run(&self, finished_unix_secs: i64, aborted: bool) {
        self.inner
            .last_run_timestamp_seconds
            .set(finished_unix_secs);
        self.inner.last_run_aborted.set(i64::from(aborted));
    }

    /// Current value of the outcome counter for a phase.
    #[must_use]
    pub fn outcome_count(&self, phase: &str, outcome: &str) -> u64 {
        self.inner
            .transfer_outcomes_total
            .with_label_values(&[phase, outcome])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Write the rendered metrics to `path`, replacing it atomically so a
    /// scraping collector never observes a partial file.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails or the file cannot be written.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let write_error = |source: io::Error| TelemetryError::MetricsWrite {
            path: path.to_path_buf(),
            source,
        };
        let mut staging = tempfile::Builder::new()
            .prefix(".tierwarm-metrics")
            .tempfile_in(dir)
            .map_err(write_error)?;
        staging
            .write_all(rendered.as_bytes())
            .map_err(write_error)?;
        staging
            .persist(path)
            .map(drop)
            .map_err(|err| write_error(err.error))
    }
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn counters_accumulate_and_render() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let metrics = Metrics::new()?;
        metrics.add_outcomes("warm", "copied", 2);
        metrics.add_outcomes("warm", "copied", 1);
        metrics.add_outcomes("demote", "failed", 1);
        metrics.add_bytes("warm", 4_096);
        metrics.add_sidecars("warm", "copied", 3);
        metrics.add_orphans(2);
        metrics.record_run(1_700_000_000, false);

        assert_eq!(metrics.outcome_count("warm", "copied"), 3);
        assert_eq!(metrics.outcome_count("demote", "failed"), 1);
        assert_eq!(metrics.outcome_count("demote", "moved"), 0);

        let rendered = metrics.render()?;
        assert!(rendered.contains("tierwarm_transfer_outcomes_total"));
        assert!(rendered.contains("tierwarm_transfer_bytes_total{phase=\"warm\"} 4096"));
        assert!(rendered.contains("tierwarm_orphans_relocated_total 2"));
        assert!(rendered.contains("tierwarm_last_run_aborted 0"));
        Ok(())
    }

    #[test]
    fn textfile_is_replaced_atomically() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tierwarm.prom");
        fs::write(&path, "stale")?;

        let metrics = Metrics::new()?;
        metrics.record_run(42, true);
        metrics.write_textfile(&path)?;

        let written = fs::read_to_string(&path)?;
        assert!(written.contains("tierwarm_last_run_timestamp_seconds 42"));
        assert!(written.contains("tierwarm_last_run_aborted 1"));
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn failed_replace_leaves_no_staging_file() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let occupied = dir.path().join("tierwarm.prom");
        fs::create_dir(&occupied)?;
        fs::write(occupied.join("keep"), "x")?;

        let metrics = Metrics::new()?;
        let err = metrics.write_textfile(&occupied).err();
        assert!(matches!(err, Some(TelemetryError::MetricsWrite { .. })));
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn textfile_write_reports_missing_directory() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let metrics = Metrics::new()?;
        let err = metrics
            .write_textfile(&dir.path().join("missing").join("tierwarm.prom"))
            .err();
        assert!(matches!(err, Some(TelemetryError::MetricsWrite { .. })));
        Ok(())
    }
}
