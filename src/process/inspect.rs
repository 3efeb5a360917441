// src/process/inspect.rs
//! Introspection of the current process

use crate::utils::errors::Result;
use std::path::PathBuf;

/// Path of the binary this process is executing.
///
/// This is what gets re-executed to spawn an agent: the agent is always the
/// same program as its requester, so command types registered on one side
/// exist on the other.
pub fn current_executable() -> Result<PathBuf> {
    Ok(std::env::current_exe()?)
}

/// Snapshot of the process environment
pub fn environment() -> Vec<(String, String)> {
    std::env::vars().collect()
}

/// Operating-system id of this process
pub fn process_id() -> u32 {
    std::process::id()
}
