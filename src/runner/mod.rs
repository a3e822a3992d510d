//! Run orchestration: context, registry, ordering, sequencing and reports.

pub mod context;
pub mod dependency;
pub mod registry;
pub mod report;
pub mod sequencer;

pub use context::{RunContext, RunOptions};
pub use dependency::{DependencyGraph, DependencyGraphBuilder};
pub use registry::StepRegistry;
pub use report::{
    RunOutcome, RunReport, RunReportBuilder, SkipReason, StepOutcome, StepResult, StepState,
};
pub use sequencer::{RunEvent, Sequencer};
