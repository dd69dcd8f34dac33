// Engine module
// Ramp profile, scheduler, virtual users, lifecycle hooks and run orchestration

pub mod lifecycle;
pub mod ramp;
pub mod result;
pub mod run;
pub mod scenario;
pub mod scheduler;
pub mod vu;

pub use lifecycle::{HealthCheck, Lifecycle, LifecycleGuard, NoHooks};
pub use ramp::{RampPosition, RampProfile, SchedulerState, Stage};
pub use result::{CheckSummary, MetricSummary, RunResult};
pub use run::Runner;
pub use scenario::{Scenario, DEFAULT_GRACEFUL_STOP};
pub use scheduler::{RunProgress, Scheduler, SchedulerReport};
pub use vu::{VirtualUser, VuShared};
