//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("relaygazer_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");

    // Inbox Metrics
    pub static ref INBOX_ACTIVITIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("relaygazer_inbox_activities_total", "Total number of accepted inbox activities"),
        &["activity_type"]
    ).expect("metric can be created");
    pub static ref INBOX_REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("relaygazer_inbox_rejections_total", "Total number of rejected inbox requests"),
        &["reason"]
    ).expect("metric can be created");

    // Federation Metrics
    pub static ref ACTOR_FETCH_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "relaygazer_actor_fetch_duration_seconds",
            "Remote actor fetch duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    ).expect("metric can be created");

    // Cache Metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("relaygazer_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("relaygazer_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("relaygazer_errors_total", "Total number of errors"),
        &["error_type", "endpoint"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
            .expect("HTTP_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(INBOX_ACTIVITIES_TOTAL.clone()))
            .expect("INBOX_ACTIVITIES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(INBOX_REJECTIONS_TOTAL.clone()))
            .expect("INBOX_REJECTIONS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ACTOR_FETCH_DURATION_SECONDS.clone()))
            .expect("ACTOR_FETCH_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(CACHE_HITS_TOTAL.clone()))
            .expect("CACHE_HITS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(CACHE_MISSES_TOTAL.clone()))
            .expect("CACHE_MISSES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}
