//! Per-response timing metrics.

use std::time::Duration;

use pagelet_core::{RenderMode, RequestContext};
use pagelet_executor::{PoolStats, ServeReport};
use serde::Serialize;

/// Metrics for one served response.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetrics {
    /// Request ID for correlation.
    pub request_id: String,
    /// Root pagelet name.
    pub pagelet: String,
    pub mode: RenderMode,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_shell_us: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_first_fragment_us: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_complete_us: Option<u64>,
    /// Fragments in write order.
    pub fragments: Vec<FragmentMetrics>,
    pub closed: bool,
    /// Instance pool counters at the time the metrics were taken.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStats>,
}

/// Metrics for a single fragment write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FragmentMetrics {
    pub name: String,
    /// From request start to write start (microseconds).
    pub start_us: u64,
    /// From request start to fragment sent (microseconds).
    pub sent_us: u64,
    pub duration_us: u64,
    /// Fragments still owed to the client after this one.
    pub remaining: usize,
}

fn micros(d: Duration) -> u64 {
    d.as_micros() as u64
}

impl ResponseMetrics {
    pub fn from_report(req: &RequestContext, pagelet: impl Into<String>, report: &ServeReport) -> Self {
        let timing = &report.timing;
        let fragments = timing
            .fragments()
            .map(|t| FragmentMetrics {
                name: t.name.clone(),
                start_us: micros(t.start),
                sent_us: micros(t.sent),
                duration_us: micros(t.duration),
                remaining: t.remaining,
            })
            .collect();

        Self {
            request_id: req.request_id.to_string(),
            pagelet: pagelet.into(),
            mode: report.mode,
            status_code: report.status.as_u16(),
            time_to_shell_us: timing.time_to_shell().map(micros),
            time_to_first_fragment_us: timing.time_to_first_fragment().map(micros),
            time_to_complete_us: timing.time_to_complete().map(micros),
            fragments,
            closed: report.closed,
            pool: None,
        }
    }

    pub fn with_pool(mut self, stats: PoolStats) -> Self {
        self.pool = Some(stats);
        self
    }

    /// Emit the metrics as one `info` event.
    pub fn record(&self) {
        tracing::info!(
            request = %self.request_id,
            pagelet = %self.pagelet,
            mode = %self.mode,
            status = self.status_code,
            fragments = self.fragments.len(),
            time_to_shell_us = self.time_to_shell_us,
            time_to_complete_us = self.time_to_complete_us,
            "response metrics"
        );
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Format as human-readable summary.
    pub fn to_summary(&self) -> String {
        let mut lines = vec![format!(
            "Response: {} [{} {}] {}",
            self.request_id, self.pagelet, self.mode, self.status_code
        )];

        if let Some(us) = self.time_to_shell_us {
            lines.push(format!("  Time to shell: {}us ({:.2}ms)", us, us as f64 / 1000.0));
        }
        if let Some(us) = self.time_to_first_fragment_us {
            lines.push(format!("  Time to first fragment: {}us ({:.2}ms)", us, us as f64 / 1000.0));
        }
        if let Some(us) = self.time_to_complete_us {
            lines.push(format!("  Time to complete: {}us ({:.2}ms)", us, us as f64 / 1000.0));
        }

        if !self.fragments.is_empty() {
            lines.push("  Fragments:".to_string());
            for fragment in &self.fragments {
                lines.push(format!(
                    "    {}: sent at {}us ({:.2}ms), {} remaining",
                    fragment.name,
                    fragment.sent_us,
                    fragment.sent_us as f64 / 1000.0,
                    fragment.remaining
                ));
            }
        }

        if let Some(pool) = &self.pool {
            lines.push(format!(
                "  Pool: {} acquired, {} released, {} reused",
                pool.acquired, pool.released, pool.reused
            ));
        }

        lines.join("\n")
    }
}
