//! Virtual users: independent execution units that run journeys in a loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinHandle;

use super::scheduler::RunProgress;
use crate::journey::{IterationContext, Journey, JourneyRunner, JourneySelector, Variables};

/// Everything a unit needs, shared read-only by all units of a run.
pub struct VuShared {
    pub runner: JourneyRunner,
    pub journeys: Vec<Journey>,
    pub selector: JourneySelector,
    /// Setup data and `base_url`, copied into every iteration context.
    pub base_vars: Variables,
    pub seed: u64,
    /// Set when graceful stop expires; units stop at the next step boundary.
    pub interrupt: Arc<AtomicBool>,
    pub progress: RunProgress,
}

impl VuShared {
    /// Per-unit seed so every unit draws an independent, reproducible stream.
    fn unit_seed(&self, id: u64) -> u64 {
        self.seed ^ id.wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }
}

/// Counts a unit as active until dropped, including when its task panics.
struct ActiveUnit(RunProgress);

impl ActiveUnit {
    fn new(progress: RunProgress) -> Self {
        progress.unit_started();
        Self(progress)
    }
}

impl Drop for ActiveUnit {
    fn drop(&mut self) {
        self.0.unit_finished();
    }
}

/// Handle on a running unit.
pub struct VirtualUser {
    pub id: u64,
    retire: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl VirtualUser {
    pub fn spawn(id: u64, shared: Arc<VuShared>) -> Self {
        let retire = Arc::new(AtomicBool::new(false));
        let unit_retire = Arc::clone(&retire);
        let active = ActiveUnit::new(shared.progress.clone());

        let handle = tokio::spawn(async move {
            let _active = active;
            run_unit(id, &shared, &unit_retire).await
        });

        Self {
            id,
            retire,
            handle: Some(handle),
        }
    }

    /// Ask the unit to stop after its current iteration.
    pub fn retire(&self) {
        self.retire.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait for the unit to exit. Returns the iterations it completed.
    pub async fn join(&mut self) -> u64 {
        let Some(handle) = self.handle.as_mut() else {
            return 0;
        };
        let result = handle.await;
        self.handle = None;
        match result {
            Ok(iterations) => iterations,
            Err(e) => {
                tracing::error!("Virtual user {} panicked: {}", self.id, e);
                0
            }
        }
    }
}

async fn run_unit(id: u64, shared: &VuShared, retire: &AtomicBool) -> u64 {
    let mut rng = StdRng::seed_from_u64(shared.unit_seed(id));
    let mut iteration = 0u64;
    tracing::debug!("vu={} started", id);

    while !retire.load(Ordering::Acquire) && !shared.interrupt.load(Ordering::Acquire) {
        let journey = &shared.journeys[shared.selector.pick(&mut rng)];
        let mut ctx = IterationContext::new(id, iteration, &shared.base_vars, &mut rng);
        let outcome = shared.runner.run(journey, &mut ctx, &shared.interrupt).await;
        if !outcome.interrupted {
            iteration += 1;
        }
        // Let other units and the scheduler run between iterations.
        tokio::task::yield_now().await;
    }

    tracing::debug!("vu={} retired after {} iterations", id, iteration);
    iteration
}
