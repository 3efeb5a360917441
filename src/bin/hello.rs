// src/bin/hello.rs
//! One-way demo: every agent greets with the broadcast shared parameter
//!
//! Rank 0's factory produces 13; every agent, whatever its rank, must
//! observe 13 through the shared reference.

use anyhow::Result;
use cohort::{AgentContext, BulkExecutor, CohortConfig, CohortError, RemoteRef, Workload};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Clone, Serialize, Deserialize)]
struct Hello;

impl Workload for Hello {
    type Shared = i32;

    fn shared(&self) -> i32 {
        13
    }

    fn run(&self, ctx: &AgentContext<'_>, shared: RemoteRef<'_, i32>) -> cohort::Result<()> {
        let value = shared.load()?;
        info!(
            "hello world from agent {} of {}, received {}",
            ctx.rank(),
            ctx.group_size(),
            value
        );
        if value != 13 {
            return Err(CohortError::Runtime(format!("expected 13, got {}", value)));
        }
        Ok(())
    }
}

fn register() {
    cohort::register_workload::<Hello>();
}

fn main() -> Result<()> {
    register();
    cohort::observability::init_tracing()?;
    cohort::init();

    let config = CohortConfig::load()?;
    let executor = BulkExecutor::new(config)?;

    let group = executor.bulk_execute(Hello, 2)?;
    let joined = executor.wait()?;
    drop(group);

    info!("OK: joined {} agents", joined);
    Ok(())
}
