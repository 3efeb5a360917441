// src/lib.rs
//! Cohort Bulk-Execution Library
//!
//! Cohort launches fixed-size groups of cooperating execution agents as
//! separate operating-system processes, runs a workload on every agent with
//! a rank identifier and an optionally-shared parameter, and, for two-way
//! execution, collects one aggregated result (or failure) back in the
//! requesting process.
//!
//! # Architecture
//!
//! The library is structured into several key modules:
//!
//! - **bootstrap**: active-message dispatch: how a serialized command takes
//!   over a freshly spawned process instead of ordinary startup
//! - **process**: process group manager and process introspection
//! - **rma**: per-group symmetric world, remote references, symmetric slots
//! - **ipc**: one-shot cross-process future/promise channels
//! - **exec**: workload traits and the bulk executor
//! - **observability**: tracing setup
//! - **utils**: configuration, errors, helpers
//!
//! # Protocol sketch
//!
//! ```text
//! requester                           agent 0..n (spawned, same binary)
//! ─────────                           ──────────────────────────────────
//! create world file                   bootstrap finds command in env
//! spawn n agents ──(env command)──►   attach world at assigned rank
//!                                     rank 0 publishes shared parameter
//!                                     barrier ── read shared ── run(f)
//!                                     reduce-OR failure flags
//! future.get() ◄──(byte channel)───   rank 0 reports value or failure
//! wait() joins all n                  agents exit
//! ```

// Public module exports
pub mod bootstrap;
pub mod exec;
pub mod ipc;
pub mod observability;
pub mod process;
pub mod rma;
pub mod utils;

// Re-export commonly used types
pub use bootstrap::{init, Runnable, ACTIVE_MESSAGE_ENV};
pub use exec::bulk::{BulkExecutor, GroupHandle};
pub use exec::workload::{
    register_twoway_workload, register_workload, AgentContext, TwowayWorkload, Workload,
};
pub use ipc::future::{InterprocessFuture, InterprocessPromise};
pub use process::group::{register_job, Job, ProcessContext, SpawnOptions};
pub use process::inspect;
pub use rma::remote::RemoteRef;
pub use rma::slot::SymmetricSlot;
pub use rma::world::{GroupWorld, SymmetricWorld, WorldSpec};
pub use utils::config::CohortConfig;
pub use utils::errors::{CohortError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Library build information
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}
