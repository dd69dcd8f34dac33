//! Scenario scheduler - tracks the ramp profile's target by spawning and
//! retiring virtual users.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};

use super::ramp::{RampProfile, SchedulerState};
use super::vu::{VirtualUser, VuShared};

/// Live view of the scheduler, shared with the reporter.
#[derive(Clone)]
pub struct RunProgress {
    state: Arc<RwLock<SchedulerState>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    target: Arc<AtomicU64>,
}

impl RunProgress {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SchedulerState::Idle)),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            target: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.read()
    }

    /// Units spawned and not yet exited, including ones finishing their
    /// last iteration after being retired.
    pub fn active_units(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn peak_units(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    pub fn target(&self) -> u64 {
        self.target.load(Ordering::Acquire)
    }

    fn set_state(&self, state: SchedulerState) {
        let mut current = self.state.write();
        if *current != state {
            tracing::info!("Scheduler: {} -> {}", *current, state);
            *current = state;
        }
    }

    pub(crate) fn unit_started(&self) {
        let now = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
    }

    pub(crate) fn unit_finished(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerReport {
    pub peak_units: usize,
    pub iterations: u64,
    /// Units still active when the scheduler returned; always zero.
    pub final_units: usize,
    /// Whether graceful stop expired and units had to be interrupted.
    pub interrupted: bool,
}

pub struct Scheduler {
    profile: RampProfile,
    tick: Duration,
    graceful_stop: Duration,
}

impl Scheduler {
    pub fn new(profile: RampProfile, graceful_stop: Duration) -> Self {
        Self {
            profile,
            tick: Duration::from_millis(100),
            graceful_stop,
        }
    }

    /// How often the target is recomputed.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Drive units through every stage, then retire them all.
    pub async fn run(&self, shared: Arc<VuShared>) -> SchedulerReport {
        let progress = shared.progress.clone();
        let interrupt: Arc<AtomicBool> = Arc::clone(&shared.interrupt);
        let start = Instant::now();

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut units: Vec<VirtualUser> = Vec::new();
        let mut draining: Vec<VirtualUser> = Vec::new();
        let mut next_id = 0u64;
        let mut iterations = 0u64;

        tracing::info!(
            "Starting {} stage(s), total {:?}, up to {} virtual users",
            self.profile.stages().len(),
            self.profile.total_duration(),
            self.profile.max_target()
        );

        loop {
            ticker.tick().await;

            let Some(position) = self.profile.position(start.elapsed()) else {
                break;
            };
            progress.set_state(position.state());
            progress.target.store(position.target, Ordering::Release);

            let target = usize::try_from(position.target).unwrap_or(usize::MAX);
            while units.len() < target {
                next_id += 1;
                units.push(VirtualUser::spawn(next_id, Arc::clone(&shared)));
            }
            while units.len() > target {
                // Newest first; the unit finishes its iteration before exiting.
                if let Some(unit) = units.pop() {
                    unit.retire();
                    draining.push(unit);
                }
            }

            let mut index = 0;
            while index < draining.len() {
                if draining[index].is_finished() {
                    let mut unit = draining.swap_remove(index);
                    iterations += unit.join().await;
                } else {
                    index += 1;
                }
            }
        }

        progress.target.store(0, Ordering::Release);
        tracing::info!(
            "All stages elapsed, retiring {} virtual user(s)",
            units.len() + draining.len()
        );
        for unit in &units {
            unit.retire();
        }
        draining.append(&mut units);

        let graceful = timeout(self.graceful_stop, join_all(&mut draining, &mut iterations)).await;
        let interrupted = match graceful {
            Ok(()) => false,
            Err(_) => {
                tracing::warn!(
                    "Graceful stop of {:?} expired, interrupting remaining virtual users",
                    self.graceful_stop
                );
                interrupt.store(true, Ordering::Release);
                join_all(&mut draining, &mut iterations).await;
                true
            }
        };

        progress.set_state(SchedulerState::Completed);
        SchedulerReport {
            peak_units: progress.peak_units(),
            iterations,
            final_units: progress.active_units(),
            interrupted,
        }
    }
}

async fn join_all(units: &mut [VirtualUser], iterations: &mut u64) {
    for unit in units.iter_mut() {
        *iterations += unit.join().await;
    }
}
