//! ---
//! srr_section: "02-messaging-bus"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Message-bus envelope, transports, and request client."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Message-bus plumbing for the SRR coordinator: the request/reply envelope,
//! the [`MessageBus`] transport seam, and the typed [`RequestClient`] used to
//! address remote agents by `(queue, agent)`.

pub mod client;
pub mod metrics;
pub mod transport;
pub mod types;

/// Shared result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Transport-level failures surfaced to the orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// No reply arrived inside the request timeout.
    #[error("timed out waiting on queue {queue}")]
    Timeout {
        /// Queue on which the wait expired.
        queue: String,
    },
    /// A transport backend exists only as a placeholder.
    #[error("bus transport not yet implemented: {0}")]
    Unimplemented(&'static str),
    /// Request or reply body failed to (de)serialize.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Catch-all for backend-specific faults.
    #[error("bus internal error: {0}")]
    Internal(String),
}

pub use client::RequestClient;
pub use metrics::RequestMetrics;
pub use transport::{InMemoryBus, MessageBus};
pub use types::Message;
