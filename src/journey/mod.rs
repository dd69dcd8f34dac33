// Journey module
// Checks, steps, per-iteration context and weighted journey selection

pub mod check;
pub mod context;
pub mod runner;
pub mod selector;
pub mod step;

pub use check::{Check, CheckEvaluator, CheckOutcome, CheckRule, TRANSPORT_ERROR_CHECK};
pub use context::{IterationContext, VariableGenerator, Variables};
pub use runner::{Journey, JourneyOutcome, JourneyRunner};
pub use selector::JourneySelector;
pub use step::{
    default_acceptable_statuses, BodyTemplate, Pacing, Step, StepExecutor, StepOutcome, StepScope,
};
