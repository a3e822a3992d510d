//! Rendering a finished run.
//!
//! A [`RunReport`] is rendered for people by [`HumanReporter`] and for
//! machines by [`JsonReporter`]. The process exit status is derived from
//! the report's overall outcome through [`exit_code`].

pub mod human;
pub mod json;

pub use human::HumanReporter;
pub use json::JsonReporter;

use crate::runner::RunReport;

/// Exit status for a finished run.
///
/// `0` on success, `3` on partial failure, `4` when a required step
/// aborted the run.
pub fn exit_code(report: &RunReport) -> i32 {
    report.outcome().exit_code()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::time::Duration;

    use crate::config::Criticality;
    use crate::runner::{RunReport, RunReportBuilder, SkipReason, StepOutcome, StepResult};
    use crate::steps::{
        ActionRecord, AttemptRecord, Classification, FailureClass, ProbeOutcome, StepFailure,
    };

    fn failed_attempt(attempt: u32, command: &str, stderr: &str) -> AttemptRecord {
        AttemptRecord {
            attempt,
            actions: vec![ActionRecord {
                command: command.to_string(),
                exit_code: Some(1),
                stdout: String::new(),
                stderr: stderr.to_string(),
                duration: Duration::from_millis(5),
                timed_out: false,
            }],
            duration: Duration::from_millis(5),
            failure: Some(Classification {
                class: FailureClass::Permanent,
                reason: "exit code 1".to_string(),
            }),
        }
    }

    /// A run where `cert` is satisfied, `nginx` succeeds after a degraded
    /// probe, `docs` fails best-effort and `site` is blocked.
    pub fn partial_failure() -> RunReport {
        let mut builder = RunReportBuilder::new(Some("web".to_string()), false);

        builder.record(StepResult::skipped(
            "cert",
            Criticality::Required,
            SkipReason::AlreadySatisfied,
            Some(ProbeOutcome::satisfied("file exists: /etc/cert.pem")),
        ));

        builder.record(StepResult {
            name: "nginx".to_string(),
            criticality: Criticality::Required,
            outcome: StepOutcome::Succeeded,
            attempts: 1,
            duration: Duration::from_millis(1200),
            message: "completed".to_string(),
            probe: Some(ProbeOutcome::unknown("command succeeds", "probe timed out")),
            probe_degraded: true,
            attempt_log: vec![AttemptRecord {
                attempt: 1,
                actions: vec![ActionRecord {
                    command: "apt-get install -y nginx".to_string(),
                    exit_code: Some(0),
                    stdout: "nginx installed".to_string(),
                    stderr: String::new(),
                    duration: Duration::from_millis(1200),
                    timed_out: false,
                }],
                duration: Duration::from_millis(1200),
                failure: None,
            }],
        });

        builder.record(StepResult {
            name: "docs".to_string(),
            criticality: Criticality::BestEffort,
            outcome: StepOutcome::Failed(StepFailure {
                class: FailureClass::Permanent,
                reason: "exit code 1".to_string(),
                retries_exhausted: false,
            }),
            attempts: 1,
            duration: Duration::from_millis(5),
            message: "exit code 1".to_string(),
            probe: None,
            probe_degraded: false,
            attempt_log: vec![failed_attempt(1, "make docs", "make: *** No rule to make target")],
        });

        builder.record(StepResult::skipped(
            "site",
            Criticality::Required,
            SkipReason::BlockedByDependency("docs".to_string()),
            None,
        ));

        builder.finish()
    }

    /// A run where the required `db` step fails and `app` is blocked.
    pub fn aborted() -> RunReport {
        let mut builder = RunReportBuilder::new(None, false);
        builder.record(StepResult {
            name: "db".to_string(),
            criticality: Criticality::Required,
            outcome: StepOutcome::Failed(StepFailure {
                class: FailureClass::Permanent,
                reason: "exit code 1".to_string(),
                retries_exhausted: true,
            }),
            attempts: 2,
            duration: Duration::from_millis(10),
            message: "exit code 1".to_string(),
            probe: None,
            probe_degraded: false,
            attempt_log: vec![
                failed_attempt(1, "createdb app", "connection refused"),
                failed_attempt(2, "createdb app", "role does not exist"),
            ],
        });
        builder.abort();
        builder.record(StepResult::skipped(
            "app",
            Criticality::Required,
            SkipReason::BlockedByAbort,
            None,
        ));
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_follows_outcome() {
        assert_eq!(exit_code(&fixtures::partial_failure()), 3);
        assert_eq!(exit_code(&fixtures::aborted()), 4);
        let empty = crate::runner::RunReportBuilder::new(None, false).finish();
        assert_eq!(exit_code(&empty), 0);
    }
}
