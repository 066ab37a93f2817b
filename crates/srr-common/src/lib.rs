//! ---
//! srr_section: "01-shared-runtime"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Shared configuration, logging, and crypto primitives."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
//! Shared primitives for the SRR coordinator workspace: configuration
//! loading, tracing setup, and the digest/passphrase facade consumed by the
//! orchestration core.

pub mod config;
pub mod crypto;
pub mod logging;

pub use config::{CoordinatorConfig, LoggingConfig, SrrConfig};
pub use crypto::{
    check_passphrase_format, decrypt, encrypt, passphrase_format, sha256_hex, CryptoError,
};
pub use logging::{init_tracing, LogFormat};
