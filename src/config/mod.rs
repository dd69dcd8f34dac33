// Configuration module
// Scenario files and the duration format they use

pub mod duration;
pub mod file;

pub use duration::HumanDuration;
pub use file::{
    CheckSpec, HealthCheckSpec, JourneySpec, Overrides, PacingSpec, ScenarioFile, SetupSpec,
    StageSpec, StepSpec, ThresholdExprs,
};
