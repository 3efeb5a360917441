// src/exec/bulk.rs
//! Requester-side bulk executor
//!
//! One `bulk_execute` call makes one execution group: a fresh symmetric
//! world plus n spawned agent processes, ranks 0..n. One-way execution
//! returns a [`GroupHandle`] (hold it until `wait` has joined the group);
//! two-way execution returns an [`InterprocessFuture`] that resolves to the
//! aggregated result or failure.
//!
//! Spawning never blocks on the agents. The only blocking points are the
//! future's `get` and the explicit `wait` join.

use crate::exec::workload::{AgentCommand, TwowayAgentCommand, TwowayWorkload, Workload};
use crate::ipc::future::InterprocessFuture;
use crate::process::group::{ProcessContext, SpawnOptions};
use crate::rma::world::GroupWorld;
use crate::utils::config::CohortConfig;
use crate::utils::errors::{CohortError, Result};
use tokio::net::TcpListener;
use tracing::info;
use ulid::Ulid;

/// Orchestrates bulk execution over groups of agent processes
pub struct BulkExecutor {
    context: ProcessContext,
    options: SpawnOptions,
    config: CohortConfig,
}

impl BulkExecutor {
    /// Build an executor from configuration
    pub fn new(config: CohortConfig) -> Result<Self> {
        let options = SpawnOptions::from_config(&config)?;
        Ok(Self::with_spawn_options(config, options))
    }

    /// Build an executor with explicit spawn options (used by test harness
    /// binaries, which must route dispatch through their generated entry)
    pub fn with_spawn_options(config: CohortConfig, options: SpawnOptions) -> Self {
        Self {
            context: ProcessContext::new(),
            options,
            config,
        }
    }

    /// The process context tracking this executor's spawned agents
    pub fn context(&self) -> &ProcessContext {
        &self.context
    }

    /// Launch `agents` processes each running `workload`; no result comes
    /// back.
    ///
    /// Returns immediately with the group handle. Keep the handle alive
    /// until [`wait`](Self::wait) has joined the group.
    pub fn bulk_execute<W: Workload>(&self, workload: W, agents: usize) -> Result<GroupHandle> {
        if agents == 0 {
            return Err(CohortError::InvalidGroupSize(0));
        }

        let world = GroupWorld::create(&self.config, agents)?;
        info!("launching group {} with {} agents", world.id(), agents);

        let spec = world.spec();
        for rank in 0..agents {
            let command = AgentCommand {
                workload: workload.clone(),
                world: spec.clone(),
                rank,
            };
            self.context.execute(&self.options, &command)?;
        }

        Ok(GroupHandle {
            id: world.id(),
            agents,
            _world: world,
        })
    }

    /// Launch `agents` processes each running `workload` and return a future
    /// for the group's single aggregated result.
    ///
    /// The listener for the result channel is bound before anything spawns;
    /// rank 0 connects back to it once the group's reduction has decided
    /// success or failure.
    pub async fn twoway_bulk_execute<W: TwowayWorkload>(
        &self,
        workload: W,
        agents: usize,
    ) -> Result<InterprocessFuture<W::Output>> {
        if agents == 0 {
            return Err(CohortError::InvalidGroupSize(0));
        }

        let listener = TcpListener::bind((self.config.reply_host.as_str(), 0)).await?;
        let reply = listener.local_addr()?;

        let world = GroupWorld::create(&self.config, agents)?;
        info!(
            "launching two-way group {} with {} agents, reply at {}",
            world.id(),
            agents,
            reply
        );

        let spec = world.spec();
        for rank in 0..agents {
            let command = TwowayAgentCommand {
                workload: workload.clone(),
                world: spec.clone(),
                rank,
                reply,
            };
            self.context.execute(&self.options, &command)?;
        }

        Ok(InterprocessFuture::from_listener(listener, world))
    }

    /// Join every agent this executor has spawned; returns how many were
    /// joined. Idempotent.
    pub fn wait(&self) -> Result<usize> {
        self.context.wait()
    }
}

/// Handle to a launched one-way group.
///
/// Owns the group's world file; dropping it before the agents have attached
/// would break them, so hold it until `wait` returns.
pub struct GroupHandle {
    id: Ulid,
    agents: usize,
    _world: GroupWorld,
}

impl GroupHandle {
    /// Group identifier
    pub fn id(&self) -> Ulid {
        self.id
    }

    /// Number of agents launched
    pub fn agents(&self) -> usize {
        self.agents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Serialize, Deserialize)]
    struct Noop;

    impl Workload for Noop {
        type Shared = ();
        fn shared(&self) {}
        fn run(
            &self,
            _ctx: &crate::exec::workload::AgentContext<'_>,
            _shared: crate::rma::remote::RemoteRef<'_, ()>,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_zero_agents_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = CohortConfig {
            world_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let executor = BulkExecutor::with_spawn_options(config, SpawnOptions::for_tests());

        assert!(matches!(
            executor.bulk_execute(Noop, 0),
            Err(CohortError::InvalidGroupSize(0))
        ));
    }
}
