// src/exec/workload.rs
//! Workload traits and agent-side execution
//!
//! A workload is a serializable description of what every agent should do.
//! The requester transmits one copy per agent (tagged with a rank); inside
//! each spawned process the matching command attaches the group's world,
//! participates in the broadcast of the shared parameter, runs the user
//! code, and synchronizes completion.
//!
//! The shared parameter is constructed exactly once, by rank 0's factory;
//! other ranks only read it remotely. When its type has a destructor, rank 0
//! drops it only after a barrier has confirmed every agent is done with it.

use crate::bootstrap::Runnable;
use crate::ipc::future::InterprocessPromise;
use crate::rma::remote::RemoteRef;
use crate::rma::slot::SymmetricSlot;
use crate::rma::world::{SymmetricWorld, WorldSpec};
use crate::utils::errors::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{debug, error};

/// What an agent knows about itself and its group
pub struct AgentContext<'w> {
    world: &'w SymmetricWorld,
}

impl<'w> AgentContext<'w> {
    fn new(world: &'w SymmetricWorld) -> Self {
        Self { world }
    }

    /// This agent's rank in [0, group_size)
    pub fn rank(&self) -> usize {
        self.world.my_rank()
    }

    /// Number of agents in the group
    pub fn group_size(&self) -> usize {
        self.world.ranks()
    }

    /// The group's symmetric world, for workloads that want their own slots
    pub fn world(&self) -> &'w SymmetricWorld {
        self.world
    }

    /// Block until every agent of the group reaches this barrier
    pub fn barrier(&self) {
        self.world.barrier_all();
    }
}

/// A one-way bulk workload: runs on every agent, reports nothing back
pub trait Workload: Serialize + DeserializeOwned + Clone + Send + 'static {
    /// Parameter constructed once by rank 0 and shared with the group
    type Shared: Serialize + DeserializeOwned;

    /// Factory for the shared parameter; invoked on rank 0 only
    fn shared(&self) -> Self::Shared;

    /// Body executed on every agent
    fn run(&self, ctx: &AgentContext<'_>, shared: RemoteRef<'_, Self::Shared>) -> Result<()>;
}

/// A two-way bulk workload: additionally seeds a rank-0-resident result that
/// is reported back to the requester
pub trait TwowayWorkload: Serialize + DeserializeOwned + Clone + Send + 'static {
    /// Parameter constructed once by rank 0 and shared with the group
    type Shared: Serialize + DeserializeOwned;

    /// Result value delivered through the future
    type Output: Serialize + DeserializeOwned + Send + 'static;

    /// Factory for the shared parameter; invoked on rank 0 only
    fn shared(&self) -> Self::Shared;

    /// Initial value of the result slot; invoked on rank 0 only
    fn seed(&self) -> Self::Output;

    /// Body executed on every agent
    fn run(
        &self,
        ctx: &AgentContext<'_>,
        result: RemoteRef<'_, Self::Output>,
        shared: RemoteRef<'_, Self::Shared>,
    ) -> Result<()>;
}

/// Agent-side command for one-way execution
#[derive(Serialize, Deserialize)]
pub(crate) struct AgentCommand<W> {
    pub workload: W,
    pub world: WorldSpec,
    pub rank: usize,
}

impl<W: Workload> Runnable for AgentCommand<W> {
    fn exec(self) -> Result<()> {
        let world = SymmetricWorld::attach(&self.world, self.rank)?;
        let ctx = AgentContext::new(&world);
        debug!("agent {}/{} up", ctx.rank(), ctx.group_size());

        let mut slot = SymmetricSlot::<W::Shared>::reserve(&world, self.world.slot_capacity)?;
        if ctx.rank() == 0 {
            slot.publish(self.workload.shared())?;
        }
        // no agent reads the shared slot before publication completes
        world.barrier_all();

        if let Err(e) = self.workload.run(&ctx, slot.remote_ref(0)) {
            // one-way execution has no result channel; failures are only
            // observable through side effects, and the agent still reaches
            // the trailing barrier
            error!("agent {} workload failed: {}", ctx.rank(), e);
        }

        if std::mem::needs_drop::<W::Shared>() {
            // rank 0 may not destroy the shared value until every agent is
            // done using it
            world.barrier_all();
            if ctx.rank() == 0 {
                slot.destroy();
            }
        }
        Ok(())
    }
}

/// Agent-side command for two-way execution
#[derive(Serialize, Deserialize)]
pub(crate) struct TwowayAgentCommand<W> {
    pub workload: W,
    pub world: WorldSpec,
    pub rank: usize,
    pub reply: SocketAddr,
}

impl<W: TwowayWorkload> Runnable for TwowayAgentCommand<W> {
    fn exec(self) -> Result<()> {
        let world = SymmetricWorld::attach(&self.world, self.rank)?;
        let ctx = AgentContext::new(&world);
        debug!("agent {}/{} up (two-way)", ctx.rank(), ctx.group_size());

        // result and shared slots come from the same reservation sequence,
        // so one broadcast/synchronization path serves both
        let capacity = self.world.slot_capacity;
        let mut result_slot = SymmetricSlot::<W::Output>::reserve(&world, capacity)?;
        let mut shared_slot = SymmetricSlot::<W::Shared>::reserve(&world, capacity)?;

        if ctx.rank() == 0 {
            result_slot.publish(self.workload.seed())?;
            shared_slot.publish(self.workload.shared())?;
        }
        world.barrier_all();

        let failed = match self.workload.run(
            &ctx,
            result_slot.remote_ref(0),
            shared_slot.remote_ref(0),
        ) {
            Ok(()) => false,
            Err(e) => {
                error!("agent {} workload failed: {}", ctx.rank(), e);
                true
            }
        };

        // whole-group failure visibility before anything leaves the group;
        // the rendezvous doubles as the completion barrier
        let any_failed = world.all_reduce_or(failed);

        if ctx.rank() == 0 {
            let promise = InterprocessPromise::<W::Output>::connect(self.reply)?;
            if any_failed {
                promise.set_error("a member of the execution group failed")?;
            } else {
                let value = result_slot.take()?;
                promise.set_value(&value)?;
            }
            shared_slot.destroy();
        }
        Ok(())
    }
}

/// Register a one-way workload type so spawned agents can decode and run it
pub fn register_workload<W: Workload>() {
    crate::bootstrap::register::<AgentCommand<W>>();
}

/// Register a two-way workload type so spawned agents can decode and run it
pub fn register_twoway_workload<W: TwowayWorkload>() {
    crate::bootstrap::register::<TwowayAgentCommand<W>>();
}
