// src/bootstrap/mod.rs
//! Active-message bootstrap
//!
//! A spawned agent is the same binary as the requester, re-executed. The only
//! signal that an invocation exists to run a transmitted command, rather
//! than the program's ordinary logic, is one reserved environment variable
//! carrying the serialized command. [`init`] checks for it at the top of
//! `main`: when present, the command is decoded, executed, and the process
//! exits without ever reaching ordinary startup; when absent, `init` returns
//! and startup proceeds unmodified.
//!
//! Dispatch is typed. Commands are plain serializable structs implementing
//! [`Runnable`]; a process-wide registry maps each command type's key to a
//! monomorphized decode-and-run function. Every command type a process may
//! receive must be registered before `init` runs: same binary, same
//! registrations, so parent and child always agree.
//!
//! # Wire path
//!
//! ```text
//! Runnable ─ bincode ─► payload ─► Envelope { key, payload } ─ bincode ─ hex ─► env var
//! ```

use crate::utils::errors::{CohortError, Result};
use crate::utils::hex;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error};

/// The reserved environment variable carrying a serialized command
pub const ACTIVE_MESSAGE_ENV: &str = "COHORT_ACTIVE_MESSAGE";

/// A serializable unit of work that can be transmitted into a spawned process
pub trait Runnable: Serialize + DeserializeOwned + 'static {
    /// Registry key for this command type. The default is the concrete type
    /// name, which is stable across re-executions of one binary.
    fn key() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Execute the command in the spawned process
    fn exec(self) -> Result<()>;
}

type Runner = fn(&[u8]) -> Result<()>;

static REGISTRY: Lazy<RwLock<HashMap<&'static str, Runner>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Serialized envelope placed in the child's environment
#[derive(Serialize, Deserialize)]
struct Envelope {
    key: String,
    payload: Vec<u8>,
}

fn run_erased<R: Runnable>(payload: &[u8]) -> Result<()> {
    let command: R = bincode::deserialize(payload)?;
    command.exec()
}

/// Register a command type so spawned processes can decode and run it
pub fn register<R: Runnable>() {
    let key = R::key();
    debug!("registering command type '{}'", key);
    REGISTRY.write().insert(key, run_erased::<R>);
}

/// Encode a command into the string form carried by the environment variable
pub fn encode<R: Runnable>(command: &R) -> Result<String> {
    let envelope = Envelope {
        key: R::key().to_string(),
        payload: bincode::serialize(command)?,
    };
    Ok(hex::encode(&bincode::serialize(&envelope)?))
}

/// Decode an envelope string and run the command it names
fn dispatch(value: &str) -> Result<()> {
    let bytes = hex::decode(value)?;
    let envelope: Envelope =
        bincode::deserialize(&bytes).map_err(|e| CohortError::CommandDecode(e.to_string()))?;

    let runner = {
        let registry = REGISTRY.read();
        registry
            .get(envelope.key.as_str())
            .copied()
            .ok_or_else(|| CohortError::UnknownCommand(envelope.key.clone()))?
    };

    debug!("dispatching command '{}'", envelope.key);
    runner(&envelope.payload)
}

/// Run a transmitted command instead of ordinary startup, if one is present.
///
/// Call this at the top of `main`, after command registration. When the
/// reserved variable is set this function does not return: the process exits
/// with success after the command runs, or with a failure status if the
/// command cannot be decoded or fails fatally.
pub fn init() {
    let value = match std::env::var(ACTIVE_MESSAGE_ENV) {
        Ok(value) => value,
        Err(_) => return,
    };

    match dispatch(&value) {
        Ok(()) => std::process::exit(libc::EXIT_SUCCESS),
        Err(e) => {
            error!("active message dispatch failed: {}", e);
            std::process::exit(libc::EXIT_FAILURE);
        }
    }
}

/// Generate the dispatcher entry used when agents are spawned from a test
/// harness binary.
///
/// Test binaries never run the crate's `main`, so the bootstrap check has to
/// live in a `#[test]` the spawner can target by name (see
/// `SpawnOptions::for_tests`). `$register` is a function that registers every
/// command type the tests transmit.
#[macro_export]
macro_rules! bootstrap_entry {
    ($register:path) => {
        #[test]
        fn cohort_bootstrap_entry() {
            $register();
            $crate::bootstrap::init();
        }
    };
}
