//! Prometheus metrics collection for tawkd.
//!
//! Tracks connection counts, event throughput, routing outcomes, and message
//! dispatch, exposed on an HTTP endpoint for scraping.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Currently registered connections.
pub static CONNECTED_USERS: OnceLock<IntGauge> = OnceLock::new();

/// Client events processed by type.
pub static EVENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Event handler errors by event type and error code.
pub static EVENT_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Server events delivered to a live connection, by type.
pub static EVENTS_DELIVERED: OnceLock<IntCounterVec> = OnceLock::new();

/// Best-effort deliveries that missed (offline target or full queue), by type.
pub static DELIVERY_MISSES: OnceLock<IntCounterVec> = OnceLock::new();

/// Messages dispatched into conversations, by kind.
pub static MESSAGES_DISPATCHED: OnceLock<IntCounterVec> = OnceLock::new();

/// Rate limit hits (flood protection).
pub static RATE_LIMITED: OnceLock<IntCounter> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(
        CONNECTED_USERS,
        IntGauge::new("tawk_connected_users", "Currently registered connections")
    );
    register!(
        EVENTS_TOTAL,
        IntCounterVec::new(
            Opts::new("tawk_events_total", "Client events processed by type"),
            &["event"]
        )
    );
    register!(
        EVENT_ERRORS,
        IntCounterVec::new(
            Opts::new("tawk_event_errors_total", "Event handler errors"),
            &["event", "code"]
        )
    );
    register!(
        EVENTS_DELIVERED,
        IntCounterVec::new(
            Opts::new("tawk_events_delivered_total", "Server events delivered"),
            &["event"]
        )
    );
    register!(
        DELIVERY_MISSES,
        IntCounterVec::new(
            Opts::new(
                "tawk_delivery_misses_total",
                "Best-effort deliveries dropped (offline target or full queue)"
            ),
            &["event"]
        )
    );
    register!(
        MESSAGES_DISPATCHED,
        IntCounterVec::new(
            Opts::new("tawk_messages_dispatched_total", "Messages persisted by kind"),
            &["kind"]
        )
    );
    register!(
        RATE_LIMITED,
        IntCounter::new("tawk_rate_limited_total", "Rate limit hits")
    );
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record a processed client event.
#[inline]
pub fn record_event(event: &str) {
    if let Some(c) = EVENTS_TOTAL.get() {
        c.with_label_values(&[event]).inc();
    }
}

/// Record an event handler error.
#[inline]
pub fn record_event_error(event: &str, code: &str) {
    if let Some(c) = EVENT_ERRORS.get() {
        c.with_label_values(&[event, code]).inc();
    }
}

/// Record a successful delivery into a connection's outbound queue.
#[inline]
pub fn record_delivery(event: &str) {
    if let Some(c) = EVENTS_DELIVERED.get() {
        c.with_label_values(&[event]).inc();
    }
}

/// Record a delivery miss.
#[inline]
pub fn record_delivery_miss(event: &str) {
    if let Some(c) = DELIVERY_MISSES.get() {
        c.with_label_values(&[event]).inc();
    }
}

/// Record a dispatched message by kind.
#[inline]
pub fn record_message(kind: &str) {
    if let Some(c) = MESSAGES_DISPATCHED.get() {
        c.with_label_values(&[kind]).inc();
    }
}

/// Update the connected users gauge.
#[inline]
pub fn set_connected_users(count: i64) {
    if let Some(g) = CONNECTED_USERS.get() {
        g.set(count);
    }
}

/// Record a rate limit hit.
#[inline]
pub fn record_rate_limited() {
    if let Some(c) = RATE_LIMITED.get() {
        c.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_lifecycle() {
        init();

        record_event("text_message");
        record_delivery_miss("incoming_message");

        let output = gather_metrics();
        assert!(output.contains("tawk_events_total"));
    }
}
