//! ---
//! srr_section: "03-orchestration-core"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Save/restore orchestration engine and fleet catalog."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
//! Orchestration engine for fleet-wide configuration save, restore, and
//! reset. The coordinator expands operator-selected groups into features,
//! fans save/restore/reset queries out to the owning agents over the bus,
//! verifies snapshot integrity, and rolls a group back to its pre-restore
//! state when any feature fails to restore.

pub mod dispatcher;
pub mod dto;
pub mod registry;
pub mod restart;
pub mod restore;
pub mod save;

/// Shared result type for orchestration operations.
pub type Result<T> = std::result::Result<T, SrrError>;

/// Failure kinds the orchestration engine distinguishes. The dispatcher maps
/// these onto UI status strings; everything that is not an integrity failure
/// surfaces as `FAILED`.
#[derive(Debug, thiserror::Error)]
pub enum SrrError {
    /// Transport failure from the message bus.
    #[error("message bus failure: {0}")]
    Bus(#[from] srr_msg::BusError),
    /// The decrypt round-trip disagreed with the supplied passphrase.
    #[error("invalid passphrase")]
    InvalidPassphrase,
    /// Payload version outside the supported set.
    #[error("unsupported payload version: {0}")]
    InvalidVersion(String),
    /// One or more group digests mismatched and `force` was not set.
    #[error("data integrity check failed for groups: {}", .0.join(" "))]
    IntegrityCheckFailed(Vec<String>),
    /// An agent rejected a restore; triggers rollback of the enclosing scope.
    #[error("restore failed for feature {feature}: {reason}")]
    RestoreFailed {
        /// Feature whose restore the agent rejected.
        feature: String,
        /// Agent-provided error text.
        reason: String,
    },
    /// An agent rejected a reset; always non-fatal for the caller.
    #[error("reset failed for feature {feature}: {reason}")]
    ResetFailed {
        /// Feature whose reset the agent rejected.
        feature: String,
        /// Agent-provided error text.
        reason: String,
    },
    /// A v2.0 group payload is missing a feature the registry requires.
    #[error("group {group} cannot be restored. Missing features")]
    MissingFeatures {
        /// Group that cannot be restored.
        group: String,
    },
    /// An agent replied with a different response family than requested.
    #[error("unexpected reply kind from agent {agent}")]
    UnexpectedReply {
        /// Misbehaving agent.
        agent: String,
    },
    /// Reserved entry point.
    #[error("not implemented yet")]
    NotImplemented,
    /// Request or payload JSON did not parse.
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

pub use dispatcher::{Reply, RestoreReply, SrrCoordinator};
pub use dto::Status;
pub use registry::{
    default_fleet, FeatureDescriptor, GroupDescriptor, SrrRegistry, SrrRegistryBuilder,
};
pub use restart::RestartArbiter;
