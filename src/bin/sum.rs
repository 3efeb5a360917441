// src/bin/sum.rs
//! Two-way demo: every rank publishes a partial, rank 0 gathers the sum
//!
//! The shared parameter broadcasts a base value; each rank publishes
//! `base + rank` into its own slot; after a barrier rank 0 reads every
//! partial remotely, stores the total into the result reference, and the
//! requester's future resolves to it.

use anyhow::Result;
use cohort::{AgentContext, BulkExecutor, CohortConfig, RemoteRef, SymmetricSlot, TwowayWorkload};
use serde::{Deserialize, Serialize};
use tracing::info;

const AGENTS: usize = 4;

#[derive(Clone, Serialize, Deserialize)]
struct PartialSum {
    base: u64,
}

impl TwowayWorkload for PartialSum {
    type Shared = u64;
    type Output = u64;

    fn shared(&self) -> u64 {
        self.base
    }

    fn seed(&self) -> u64 {
        0
    }

    fn run(
        &self,
        ctx: &AgentContext<'_>,
        result: RemoteRef<'_, u64>,
        shared: RemoteRef<'_, u64>,
    ) -> cohort::Result<()> {
        let base = shared.load()?;
        let partial = base + ctx.rank() as u64;

        let mut slot = SymmetricSlot::<u64>::reserve(ctx.world(), 64)?;
        slot.publish(partial)?;
        ctx.barrier();

        if ctx.rank() == 0 {
            let mut total = 0;
            for rank in 0..ctx.group_size() {
                total += slot.remote_ref(rank).load()?;
            }
            result.store(&total)?;
        }
        Ok(())
    }
}

fn register() {
    cohort::register_twoway_workload::<PartialSum>();
}

#[tokio::main]
async fn main() -> Result<()> {
    register();
    cohort::observability::init_tracing()?;
    cohort::init();

    let config = CohortConfig::load()?;
    let executor = BulkExecutor::new(config)?;

    let future = executor
        .twoway_bulk_execute(PartialSum { base: 100 }, AGENTS)
        .await?;
    let total = future.get().await?;
    executor.wait()?;

    info!("sum of partials across {} agents: {}", AGENTS, total);
    Ok(())
}
