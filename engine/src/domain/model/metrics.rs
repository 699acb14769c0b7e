//! System and hardware metrics collected alongside each cycle's stacks.

/// CPU/RAM averages and, when an external PMU helper is configured,
/// top-down microarchitecture counters. Each field is optional because the
/// PMU helper is itself optional and averages need at least one sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemMetrics {
    pub cpu_avg: Option<f64>,
    pub mem_avg: Option<f64>,
    pub cpu_freq: Option<f64>,
    pub cpi: Option<f64>,
    pub tma_frontend_bound: Option<f64>,
    pub tma_backend_bound: Option<f64>,
    pub tma_bad_speculation: Option<f64>,
    pub tma_retiring: Option<f64>,
}

/// `{ dict, html }` — the parsed PMU-helper dict plus an optional
/// gzip+base64-encoded HTML snapshot for embedding in reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HwMetrics {
    pub dict: Option<std::collections::HashMap<String, f64>>,
    pub html_gzip_base64: Option<String>,
}
