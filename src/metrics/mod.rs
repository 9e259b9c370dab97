//! Prometheus metrics for comicrag
//!
//! Counters and histograms for the ingestion pipeline, search and embedding
//! calls, exposed in text format on `/metrics`.

use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Task metrics
    // ============================================================================

    /// Archives accepted into the queue
    pub static ref TASKS_SUBMITTED: Counter = Counter::with_opts(
        Opts::new(
            "comicrag_tasks_submitted_total",
            "Archives accepted into the processing queue"
        )
    ).expect("Failed to create TASKS_SUBMITTED counter");

    pub static ref TASKS_COMPLETED: Counter = Counter::with_opts(
        Opts::new(
            "comicrag_tasks_completed_total",
            "Archives processed successfully"
        )
    ).expect("Failed to create TASKS_COMPLETED counter");

    pub static ref TASKS_FAILED: Counter = Counter::with_opts(
        Opts::new(
            "comicrag_tasks_failed_total",
            "Archives whose processing failed"
        )
    ).expect("Failed to create TASKS_FAILED counter");

    /// Jobs waiting for a worker
    pub static ref QUEUE_DEPTH: Gauge = Gauge::with_opts(
        Opts::new(
            "comicrag_queue_depth",
            "Jobs waiting for a worker"
        )
    ).expect("Failed to create QUEUE_DEPTH gauge");

    // ============================================================================
    // Analysis metrics
    // ============================================================================

    pub static ref PAGES_ANALYZED: Counter = Counter::with_opts(
        Opts::new(
            "comicrag_pages_analyzed_total",
            "Pages described by the image analyzer"
        )
    ).expect("Failed to create PAGES_ANALYZED counter");

    /// Failed image analysis attempts that were retried
    pub static ref ANALYSIS_RETRIES: Counter = Counter::with_opts(
        Opts::new(
            "comicrag_analysis_retries_total",
            "Image analysis attempts that failed and were retried"
        )
    ).expect("Failed to create ANALYSIS_RETRIES counter");

    // ============================================================================
    // Search metrics
    // ============================================================================

    /// Total number of search requests
    pub static ref SEARCH_REQUESTS: Counter = Counter::with_opts(
        Opts::new(
            "comicrag_search_requests_total",
            "Total number of search requests"
        )
    ).expect("Failed to create SEARCH_REQUESTS counter");

    /// Search request latency in seconds
    pub static ref SEARCH_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "comicrag_search_latency_seconds",
            "Search request latency in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])
    ).expect("Failed to create SEARCH_LATENCY histogram");

    // ============================================================================
    // Embedding metrics
    // ============================================================================

    /// Total embedding generation requests
    pub static ref EMBEDDING_REQUESTS: Counter = Counter::with_opts(
        Opts::new(
            "comicrag_embedding_requests_total",
            "Total embedding generation requests"
        )
    ).expect("Failed to create EMBEDDING_REQUESTS counter");

    /// Embedding generation latency in seconds
    pub static ref EMBEDDING_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "comicrag_embedding_latency_seconds",
            "Embedding generation latency in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0])
    ).expect("Failed to create EMBEDDING_LATENCY histogram");
}

/// Register all metrics with the global registry.
///
/// Call once at startup. A second call logs the duplicate registrations
/// instead of panicking, so tests can build several servers.
pub fn register_metrics() {
    let collectors: Vec<(&str, Box<dyn prometheus::core::Collector>)> = vec![
        ("TASKS_SUBMITTED", Box::new(TASKS_SUBMITTED.clone())),
        ("TASKS_COMPLETED", Box::new(TASKS_COMPLETED.clone())),
        ("TASKS_FAILED", Box::new(TASKS_FAILED.clone())),
        ("QUEUE_DEPTH", Box::new(QUEUE_DEPTH.clone())),
        ("PAGES_ANALYZED", Box::new(PAGES_ANALYZED.clone())),
        ("ANALYSIS_RETRIES", Box::new(ANALYSIS_RETRIES.clone())),
        ("SEARCH_REQUESTS", Box::new(SEARCH_REQUESTS.clone())),
        ("SEARCH_LATENCY", Box::new(SEARCH_LATENCY.clone())),
        ("EMBEDDING_REQUESTS", Box::new(EMBEDDING_REQUESTS.clone())),
        ("EMBEDDING_LATENCY", Box::new(EMBEDDING_LATENCY.clone())),
    ];

    for (name, collector) in collectors {
        if let Err(e) = REGISTRY.register(collector) {
            tracing::debug!("Metric {} not registered: {}", name, e);
        }
    }
}

/// Gather all metrics and encode them in Prometheus text format
///
/// Returns an empty string if encoding fails (which should not happen with valid metrics).
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Metrics contained invalid UTF-8: {}", e);
        String::new()
    })
}
