//! Hardware (PMU) metrics monitor (§10.6, supplementing `hw_metrics.py`).
//!
//! Optionally shells out to an external PMU-helper binary that streams a CSV
//! (§6 Inputs: `TS,SKT,CPU,CID,...` with top-down counters at indices 4..9)
//! and separately renders an HTML snapshot, gzip+base64 encoded for
//! embedding per `HwMetrics.html_gzip_base64`.

use std::io::Write as _;

use base64::Engine as _;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use crate::domain::model::HwMetrics;

/// Parsed row of the PMU-helper CSV stream.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PmuRow {
    pub cpu_freq: f64,
    pub cpi: f64,
    pub tma_frontend_bound: f64,
    pub tma_bad_speculation: f64,
    pub tma_backend_bound: f64,
    pub tma_retiring: f64,
}

pub struct HwMetricsMonitor {
    enabled: bool,
}

impl HwMetricsMonitor {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Parse the PMU helper's CSV stream. The header line (starting
    /// `TS,SKT,CPU,CID`) is validated and skipped; each data line must have
    /// at least 10 comma-separated fields, with floats at indices 4..9.
    pub fn parse_csv(&self, csv: &str) -> Option<PmuRow> {
        let mut lines = csv.lines();
        let header = lines.next()?;
        if !header.starts_with("TS,SKT,CPU,CID") {
            warn!(header, "unexpected PMU helper CSV header");
            return None;
        }

        let data_line = lines.next()?;
        let fields: Vec<&str> = data_line.split(',').collect();
        if fields.len() < 10 {
            return None;
        }

        let parse = |idx: usize| fields.get(idx).and_then(|s| s.trim().parse::<f64>().ok());
        Some(PmuRow {
            cpu_freq: parse(4)?,
            cpi: parse(5)?,
            tma_frontend_bound: parse(6)?,
            tma_bad_speculation: parse(7)?,
            tma_backend_bound: parse(8)?,
            tma_retiring: parse(9)?,
        })
    }

    /// Gzip-compress then base64-encode an HTML snapshot, matching the
    /// original's `gzip.compress` + `base64.b64encode` pipeline.
    pub fn encode_html(&self, html: &str) -> std::io::Result<String> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(html.as_bytes())?;
        let compressed = encoder.finish()?;
        Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
    }

    pub fn build(&self, csv: Option<&str>, html: Option<&str>) -> HwMetrics {
        if !self.enabled {
            return HwMetrics::default();
        }
        let dict = csv
            .and_then(|c| self.parse_csv(c))
            .map(|row| {
                std::collections::HashMap::from([
                    ("cpu_freq".to_string(), row.cpu_freq),
                    ("cpi".to_string(), row.cpi),
                    ("tma_frontend_bound".to_string(), row.tma_frontend_bound),
                    ("tma_bad_speculation".to_string(), row.tma_bad_speculation),
                    ("tma_backend_bound".to_string(), row.tma_backend_bound),
                    ("tma_retiring".to_string(), row.tma_retiring),
                ])
            });
        let html_gzip_base64 = html.and_then(|h| self.encode_html(h).ok());
        HwMetrics {
            dict,
            html_gzip_base64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_pmu_csv_row() {
        let monitor = HwMetricsMonitor::new(true);
        let csv = "TS,SKT,CPU,CID,CPUFREQ,CPI,FE,BADSPEC,BE,RETIRE\n1,0,0,0,3.4,0.9,0.1,0.05,0.1,0.75\n";
        let row = monitor.parse_csv(csv).unwrap();
        assert_eq!(row.cpu_freq, 3.4);
        assert_eq!(row.cpi, 0.9);
        assert_eq!(row.tma_retiring, 0.75);
    }

    #[test]
    fn rejects_bad_header() {
        let monitor = HwMetricsMonitor::new(true);
        assert!(monitor.parse_csv("garbage\n1,2,3\n").is_none());
    }

    #[test]
    fn disabled_monitor_produces_empty_metrics() {
        let monitor = HwMetricsMonitor::new(false);
        let metrics = monitor.build(Some("TS,SKT,CPU,CID,1,2,3,4,5,6"), Some("<html></html>"));
        assert_eq!(metrics, HwMetrics::default());
    }

    #[test]
    fn html_round_trips_through_gzip_base64() {
        let monitor = HwMetricsMonitor::new(true);
        let encoded = monitor.encode_html("<html>hi</html>").unwrap();
        let compressed = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        let mut out = String::new();
        std::io::Read::read_to_string(&mut decoder, &mut out).unwrap();
        assert_eq!(out, "<html>hi</html>");
    }
}
