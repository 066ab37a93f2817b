//! ---
//! srr_section: "02-messaging-bus"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Message-bus envelope, transports, and request client."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
use std::time::Duration;

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};

/// Prometheus handles for agent RPC activity.
pub struct RequestMetrics {
    sent: IntCounter,
    replies: IntCounter,
    errors: IntCounter,
    latency: Histogram,
}

impl RequestMetrics {
    /// Register the RPC metrics with the provided registry.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let sent = IntCounter::with_opts(Opts::new(
            "srr_agent_requests_sent_total",
            "Agent RPC requests placed on the bus",
        ))?;
        let replies = IntCounter::with_opts(Opts::new(
            "srr_agent_replies_received_total",
            "Agent RPC replies matched by correlation id",
        ))?;
        let errors = IntCounter::with_opts(Opts::new(
            "srr_agent_bus_errors_total",
            "Agent RPCs that ended in a transport error",
        ))?;
        let latency = Histogram::with_opts(HistogramOpts::new(
            "srr_agent_request_roundtrip_seconds",
            "Latency between request send and matched reply",
        ))?;

        registry.register(Box::new(sent.clone()))?;
        registry.register(Box::new(replies.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(latency.clone()))?;

        Ok(Self {
            sent,
            replies,
            errors,
            latency,
        })
    }

    /// Record a request handed to the transport.
    pub fn observe_sent(&self) {
        self.sent.inc();
    }

    /// Record a matched reply and its round-trip latency.
    pub fn observe_reply(&self, latency: Duration) {
        self.replies.inc();
        self.latency.observe(latency.as_secs_f64());
    }

    /// Record a transport failure.
    pub fn observe_error(&self) {
        self.errors.inc();
    }
}
