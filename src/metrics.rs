//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Auth Metrics
    pub static ref SESSIONS_ISSUED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("brdscope_sessions_issued_total", "Total number of sessions issued"),
        &["method"]
    ).expect("metric can be created");
    pub static ref OAUTH_LOGINS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("brdscope_oauth_logins_total", "Total number of OAuth callback outcomes"),
        &["provider", "status"]
    ).expect("metric can be created");

    // Analysis Metrics
    pub static ref LLM_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("brdscope_llm_requests_total", "Total number of LLM analysis requests"),
        &["status"]
    ).expect("metric can be created");
    pub static ref LLM_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "brdscope_llm_request_duration_seconds",
            "LLM analysis request duration in seconds"
        ).buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]),
        &["status"]
    ).expect("metric can be created");
    pub static ref ANALYSES_CREATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("brdscope_analyses_created_total", "Total number of analyses stored"),
        &["source"]
    ).expect("metric can be created");
    pub static ref SHARE_LINKS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "brdscope_share_links_created_total",
        "Total number of share links created"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("brdscope_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Safe to call more than once; duplicate registrations are logged and skipped.
pub fn init_metrics() {
    let collectors: Vec<(&str, Box<dyn prometheus::core::Collector>)> = vec![
        ("SESSIONS_ISSUED_TOTAL", Box::new(SESSIONS_ISSUED_TOTAL.clone())),
        ("OAUTH_LOGINS_TOTAL", Box::new(OAUTH_LOGINS_TOTAL.clone())),
        ("LLM_REQUESTS_TOTAL", Box::new(LLM_REQUESTS_TOTAL.clone())),
        (
            "LLM_REQUEST_DURATION_SECONDS",
            Box::new(LLM_REQUEST_DURATION_SECONDS.clone()),
        ),
        ("ANALYSES_CREATED_TOTAL", Box::new(ANALYSES_CREATED_TOTAL.clone())),
        (
            "SHARE_LINKS_CREATED_TOTAL",
            Box::new(SHARE_LINKS_CREATED_TOTAL.clone()),
        ),
        ("ERRORS_TOTAL", Box::new(ERRORS_TOTAL.clone())),
    ];

    for (name, collector) in collectors {
        if let Err(error) = REGISTRY.register(collector) {
            tracing::debug!(metric = name, %error, "Metric registration skipped");
        }
    }

    tracing::info!("Metrics registry initialized");
}

/// Record the outcome and latency of one LLM call.
pub fn observe_llm_request(status: &str, elapsed: std::time::Duration) {
    LLM_REQUESTS_TOTAL.with_label_values(&[status]).inc();
    LLM_REQUEST_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(elapsed.as_secs_f64());
}
