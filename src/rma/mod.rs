// src/rma/mod.rs
//! Remote memory access for execution groups
//!
//! Every execution group gets its own **symmetric world**: a memory-mapped
//! file with one heap region per rank plus a small coordination header. The
//! protocol layer consumes the world through four primitives (load, store,
//! barrier, reduce-OR) and two abstractions built on top of them:
//!
//! - **Remote Ref**: a typed reference to a value at (owning rank, offset)
//! - **Symmetric Slot**: a fixed-capacity cell reserved at the same offset
//!   on every rank, staging values published for remote readers
//!
//! # Architecture
//!
//! ```text
//! world file:  [ header | reduce flags | heap rank 0 | heap rank 1 | ... ]
//!                  │
//!                  └─ barrier generation + arrival counters (atomics)
//! ```
//!
//! Slot reservations are symmetric: agents reserve in identical order, so a
//! reservation denotes the same offset in every rank's heap region.

pub mod remote;
pub mod slot;
pub mod world;

// Re-export commonly used types
pub use remote::RemoteRef;
pub use slot::SymmetricSlot;
pub use world::{GroupWorld, SymmetricWorld, WorldSpec};
