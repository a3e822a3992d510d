//! Step resolution, probing, and execution.
//!
//! - [`Step`] - A fully resolved step ready for execution
//! - [`Prober`] / [`ShellProber`] - Idempotency probes
//! - [`classify`] - Transient vs permanent failure classification
//! - [`Executor`] - Run a step's actions with bounded retries
//! - [`MockProber`] / [`MockActionRunner`] - Scripted fakes for tests
//!
//! # Example
//!
//! ```no_run
//! use provisor::config::{Settings, StepConfig, Variables};
//! use provisor::runner::RunContext;
//! use provisor::steps::{Executor, Prober, ShellActionRunner, ShellProber, Step};
//!
//! let config = StepConfig {
//!     name: "hello".to_string(),
//!     command: Some("echo hello".to_string()),
//!     ..Default::default()
//! };
//! let step = Step::resolve(&config, &Settings::default(), &Variables::new()).unwrap();
//! let ctx = RunContext::new(".");
//!
//! if !ShellProber.probe(&step, &ctx).is_satisfied() {
//!     let execution = Executor::new(&ShellActionRunner).execute(&step, &ctx);
//!     println!("{} attempt(s), succeeded: {}", execution.attempts, execution.succeeded());
//! }
//! ```

pub mod classify;
pub mod executor;
pub mod mock;
pub mod probe;
pub mod resolved;

pub use classify::{classify, Classification, FailureClass};
pub use executor::{
    ActionRecord, ActionRunner, AttemptRecord, Execution, Executor, RetryNotice,
    ShellActionRunner, StepFailure,
};
pub use mock::{MockActionRunner, MockProber, MockResponse};
pub use probe::{run_probe, ProbeOutcome, ProbeResult, Prober, ShellProber};
pub use resolved::{RetryPolicy, Step};
