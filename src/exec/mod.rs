// src/exec/mod.rs
//! Bulk execution orchestration
//!
//! - **Workload**: the traits user code implements, plus the agent-side
//!   commands that run them inside spawned processes
//! - **Bulk**: the requester-side executor that allocates a world, spawns
//!   the group, and (for two-way execution) hands back a future

pub mod bulk;
pub mod workload;

// Re-export commonly used types
pub use bulk::{BulkExecutor, GroupHandle};
pub use workload::{
    register_twoway_workload, register_workload, AgentContext, TwowayWorkload, Workload,
};
