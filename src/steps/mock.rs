//! Scripted probe and action fakes for testing.
//!
//! Both fakes answer per step name and record every call, so sequencing
//! behavior can be asserted without touching the host.
//!
//! # Example
//!
//! ```
//! use provisor::steps::{MockActionRunner, MockProber, ProbeResult};
//!
//! let prober = MockProber::new();
//! prober.set("nginx", ProbeResult::Satisfied);
//!
//! let runner = MockActionRunner::new();
//! runner.script("cert", vec![MockActionRunner::transient_failure(), MockActionRunner::success()]);
//!
//! assert!(runner.invocations().is_empty());
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::error::{ProvisorError, Result};
use crate::runner::RunContext;
use crate::shell::CommandResult;
use crate::steps::executor::ActionRunner;
use crate::steps::probe::{ProbeOutcome, ProbeResult, Prober};
use crate::steps::Step;

/// Prober answering from a per-step table.
///
/// Steps without an entry are `Unsatisfied`.
#[derive(Debug, Default)]
pub struct MockProber {
    results: RefCell<HashMap<String, ProbeResult>>,
    probed: RefCell<Vec<String>>,
}

impl MockProber {
    /// Create a prober that reports every step unsatisfied.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the answer for a step.
    pub fn set(&self, step: &str, result: ProbeResult) {
        self.results.borrow_mut().insert(step.to_string(), result);
    }

    /// Steps probed so far, in order.
    pub fn probed(&self) -> Vec<String> {
        self.probed.borrow().clone()
    }
}

impl Prober for MockProber {
    fn probe(&self, step: &Step, _ctx: &RunContext) -> ProbeOutcome {
        self.probed.borrow_mut().push(step.name.clone());
        let result = self
            .results
            .borrow()
            .get(&step.name)
            .cloned()
            .unwrap_or(ProbeResult::Unsatisfied);
        ProbeOutcome {
            result,
            description: format!("mock probe for {}", step.name),
        }
    }
}

/// A scripted response for one action invocation.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return this command result.
    Result(CommandResult),
    /// Fail to start the command.
    SpawnError,
}

/// Action runner replaying scripted responses per step.
///
/// Each invocation pops the next response for its step; once the script is
/// empty (or for unscripted steps) every command succeeds.
#[derive(Debug, Default)]
pub struct MockActionRunner {
    scripts: RefCell<HashMap<String, VecDeque<MockResponse>>>,
    invocations: RefCell<Vec<(String, String)>>,
    timeouts: RefCell<Vec<Option<Duration>>>,
}

impl MockActionRunner {
    /// Create a runner where every command succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue responses for a step's invocations.
    pub fn script(&self, step: &str, responses: Vec<MockResponse>) {
        self.scripts
            .borrow_mut()
            .entry(step.to_string())
            .or_default()
            .extend(responses);
    }

    /// Make every invocation of `step` fail permanently.
    pub fn always_fail(&self, step: &str, attempts: usize) {
        self.script(step, vec![Self::failure(1, "fatal error"); attempts]);
    }

    /// A successful exit.
    pub fn success() -> MockResponse {
        MockResponse::Result(CommandResult::success("", Duration::from_millis(1)))
    }

    /// A failing exit with the given code and stderr.
    pub fn failure(exit_code: i32, stderr: &str) -> MockResponse {
        MockResponse::Result(CommandResult::failure(
            Some(exit_code),
            stderr,
            Duration::from_millis(1),
        ))
    }

    /// A failure whose output matches a built-in transient pattern.
    pub fn transient_failure() -> MockResponse {
        Self::failure(1, "curl: (7) Failed to connect: Connection refused")
    }

    /// A command that could not be started.
    pub fn spawn_error() -> MockResponse {
        MockResponse::SpawnError
    }

    /// Every `(step, command)` invoked, in order.
    pub fn invocations(&self) -> Vec<(String, String)> {
        self.invocations.borrow().clone()
    }

    /// Distinct step names invoked, in first-invocation order.
    pub fn invoked_steps(&self) -> Vec<String> {
        let mut steps: Vec<String> = Vec::new();
        for (step, _) in self.invocations.borrow().iter() {
            if !steps.contains(step) {
                steps.push(step.clone());
            }
        }
        steps
    }

    /// The timeout passed to each invocation.
    pub fn timeouts(&self) -> Vec<Option<Duration>> {
        self.timeouts.borrow().clone()
    }
}

impl ActionRunner for MockActionRunner {
    fn run(
        &self,
        step: &Step,
        command: &str,
        _ctx: &RunContext,
        timeout: Option<Duration>,
    ) -> Result<CommandResult> {
        self.invocations
            .borrow_mut()
            .push((step.name.clone(), command.to_string()));
        self.timeouts.borrow_mut().push(timeout);

        let next = self
            .scripts
            .borrow_mut()
            .get_mut(&step.name)
            .and_then(VecDeque::pop_front);

        match next {
            Some(MockResponse::Result(result)) => Ok(result),
            Some(MockResponse::SpawnError) => Err(ProvisorError::CommandSpawn {
                command: command.to_string(),
                message: "No such file or directory".to_string(),
            }),
            None => Ok(CommandResult::success("", Duration::from_millis(1))),
        }
    }
}
