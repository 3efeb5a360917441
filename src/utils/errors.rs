// src/utils/errors.rs
//! Error types for the cohort runtime
//!
//! One enum covers every layer: spawning, bootstrap decoding, the symmetric
//! world, slots, and the result channel. Workload failures inside agents are
//! converted to flags and aggregated collectively (see `exec`), so the only
//! workload-related variant here is the opaque `AgentFailed` the requester
//! sees on a two-way future.

use thiserror::Error;

/// Result type used throughout the cohort runtime
pub type Result<T> = std::result::Result<T, CohortError>;

/// Errors produced by the cohort runtime
#[derive(Debug, Error)]
pub enum CohortError {
    /// The OS declined to create a process
    #[error("process spawn failed: {0}")]
    ProcessSpawnFailed(String),

    /// A spawned process could not reconstruct the transmitted command
    #[error("command decode failed: {0}")]
    CommandDecode(String),

    /// A command key was not found in the bootstrap registry
    #[error("no command registered under key '{0}'")]
    UnknownCommand(String),

    /// Group size must be at least one agent
    #[error("invalid group size: {0}")]
    InvalidGroupSize(usize),

    /// Rank outside [0, ranks)
    #[error("rank {rank} out of range for group of {ranks}")]
    RankOutOfRange { rank: usize, ranks: usize },

    /// Symmetric world file failed validation on attach
    #[error("symmetric world corrupted: {0}")]
    WorldCorrupted(String),

    /// Symmetric heap exhausted by slot reservations
    #[error("symmetric heap exhausted: need {need} bytes, {available} available")]
    HeapExhausted { need: usize, available: usize },

    /// Encoded value does not fit the slot capacity
    #[error("slot overflow: encoded value is {need} bytes, capacity is {capacity}")]
    SlotOverflow { need: usize, capacity: usize },

    /// Read of a slot nothing was published into
    #[error("slot is empty")]
    SlotEmpty,

    /// The result channel closed before a complete frame arrived
    #[error("result channel closed before a complete frame arrived")]
    ChannelClosed,

    /// Aggregated two-way failure: at least one agent failed
    #[error("bulk execution failed: {0}")]
    AgentFailed(String),

    /// Serialization or deserialization failure
    #[error("serialization failed: {0}")]
    Serialization(#[from] bincode::Error),

    /// Underlying I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation failure
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all runtime failure
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<config::ConfigError> for CohortError {
    fn from(err: config::ConfigError) -> Self {
        CohortError::Config(err.to_string())
    }
}

impl From<nix::errno::Errno> for CohortError {
    fn from(err: nix::errno::Errno) -> Self {
        CohortError::Io(std::io::Error::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CohortError::SlotOverflow {
            need: 128,
            capacity: 64,
        };
        assert!(err.to_string().contains("128"));
        assert!(err.to_string().contains("64"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: CohortError = io.into();
        assert!(matches!(err, CohortError::Io(_)));
    }
}
