//! Unified error handling for physlink.
//!
//! Setup-time failures (allocation, carve-out, schema binding) surface as
//! [`LinkError`]. Hot-path channel operations never return `LinkError`:
//! a full ring reports [`ChannelFull`], which the caller must acknowledge,
//! and everything else degrades locally (see the channel modules).

use thiserror::Error;

/// Main error type for physlink setup and binding operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// I/O related errors (region mapping).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared-memory region or band allocation errors.
    #[error("Memory error: {0}")]
    Memory(String),

    /// A non-fresh region carried the wrong magic or layout version.
    /// Fatal for that channel; a build/version skew, not a runtime fault.
    #[error(
        "Schema mismatch on {channel}: expected magic {expected:#010x} v{expected_version}, \
         found {found:#010x} v{found_version}"
    )]
    SchemaMismatch {
        channel: &'static str,
        expected: u32,
        expected_version: u32,
        found: u32,
        found_version: u32,
    },

    /// Configuration validation errors (capacities, step rate).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker-side initialization failures.
    #[error("Initialization failed: {0}")]
    Init(String),
}

/// Convenience alias used throughout the crate.
pub type LinkResult<T> = Result<T, LinkError>;

/// A ring buffer had no free slot; the record was dropped.
///
/// Not a fault: the producer never blocks and the channel never grows.
/// Callers must consume the result so the drop is acknowledged (logged or
/// counted) at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("channel full, record dropped")]
pub struct ChannelFull;
