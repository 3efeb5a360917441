// src/ipc/mod.rs
//! Cross-process result delivery
//!
//! One-shot future/promise pairs spanning two address spaces, bound to a
//! byte channel: a pipe for a same-host handoff, or a TCP listener/stream
//! pair when an agent group reports back to its requester.

pub mod future;

// Re-export commonly used types
pub use future::{InterprocessFuture, InterprocessPromise};
