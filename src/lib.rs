//! Provisor - idempotent, dependency-aware provisioning.
//!
//! Provisor reads a YAML manifest of provisioning steps, orders them by
//! their declared dependencies, probes each one to see whether its effect
//! already holds, and executes only what is missing. Transient failures are
//! retried with backoff; a failed required step aborts the run while a
//! failed best-effort step does not. Every run ends in a [`runner::RunReport`].
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Manifest loading, variables, and validation
//! - [`error`] - Error types and result aliases
//! - [`report`] - Human and JSON rendering of run reports
//! - [`runner`] - Step registry, dependency ordering, and the sequencer
//! - [`shell`] - Shell command execution with timeouts
//! - [`steps`] - Step resolution, probing, classification, and execution
//! - [`ui`] - Spinners, prompts, and terminal output
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//!
//! use provisor::config::parse_manifest;
//! use provisor::runner::{RunContext, RunOutcome, Sequencer, StepRegistry};
//! use provisor::steps::{MockActionRunner, MockProber, ProbeResult};
//!
//! let manifest = parse_manifest(
//!     r#"
//! steps:
//!   - name: nginx
//!     command: apt-get install -y nginx
//!   - name: site
//!     command: cp site.conf /etc/nginx/conf.d/
//!     depends_on: [nginx]
//! "#,
//!     Path::new("provision.yml"),
//! )
//! .unwrap();
//!
//! let ctx = RunContext::new("/tmp");
//! let registry = StepRegistry::load(&manifest, &ctx).unwrap();
//!
//! let prober = MockProber::new();
//! prober.set("nginx", ProbeResult::Satisfied);
//! let runner = MockActionRunner::new();
//!
//! let report = Sequencer::new(&prober, &runner).run(&registry, &ctx);
//! assert_eq!(report.outcome(), RunOutcome::Success);
//! assert_eq!(runner.invoked_steps(), vec!["site"]);
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod report;
pub mod runner;
pub mod shell;
pub mod steps;
pub mod ui;

pub use error::{ProvisorError, Result};
