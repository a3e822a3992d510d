//! Integration tests for run sequencing through the public API.

use std::fs;
use std::path::Path;
use std::time::Duration;

use provisor::config::{load_manifest, parse_manifest};
use provisor::runner::{
    RunContext, RunOptions, RunOutcome, Sequencer, SkipReason, StepOutcome, StepRegistry,
};
use provisor::steps::{
    FailureClass, MockActionRunner, MockProber, ProbeResult, ShellActionRunner, ShellProber,
};
use provisor::ProvisorError;
use tempfile::TempDir;

fn no_sleep(_: Duration) {}

fn registry(yaml: &str, ctx: &RunContext) -> Result<StepRegistry, ProvisorError> {
    let manifest = parse_manifest(yaml, Path::new("provision.yml"))?;
    StepRegistry::load(&manifest, ctx)
}

fn outcome<'a>(report: &'a provisor::runner::RunReport, step: &str) -> &'a StepOutcome {
    &report.step(step).unwrap().outcome
}

#[test]
fn cyclic_manifest_runs_nothing() {
    let ctx = RunContext::new("/tmp");
    let err = registry(
        r#"
steps:
  - name: a
    command: touch a
    depends_on: [c]
  - name: b
    command: touch b
    depends_on: [a]
  - name: c
    command: touch c
    depends_on: [b]
"#,
        &ctx,
    )
    .unwrap_err();

    match err {
        ProvisorError::CircularDependency { cycle } => {
            assert!(cycle.contains("a"));
            assert!(cycle.contains("->"));
        }
        other => panic!("expected cycle, got {other}"),
    }
}

#[test]
fn satisfied_probe_never_invokes_action() {
    let ctx = RunContext::new("/tmp");
    let registry = registry("steps:\n  - name: nginx\n    command: apt-get install nginx\n", &ctx).unwrap();

    let prober = MockProber::new();
    prober.set("nginx", ProbeResult::Satisfied);
    let runner = MockActionRunner::new();

    let report = Sequencer::new(&prober, &runner).run(&registry, &ctx);

    assert!(runner.invocations().is_empty());
    assert_eq!(
        outcome(&report, "nginx"),
        &StepOutcome::Skipped(SkipReason::AlreadySatisfied)
    );
    assert_eq!(report.outcome(), RunOutcome::Success);
}

#[test]
fn required_failure_after_retries_skips_dependents() {
    let ctx = RunContext::new("/tmp");
    let registry = registry(
        r#"
steps:
  - name: repo
    command: add-apt-repository ppa:nginx
    retry:
      max_retries: 1
      backoff_ms: 1
  - name: nginx
    command: apt-get install nginx
    depends_on: [repo]
  - name: site
    command: cp site.conf /etc/nginx
    depends_on: [nginx]
"#,
        &ctx,
    )
    .unwrap();

    let prober = MockProber::new();
    let runner = MockActionRunner::new();
    runner.script(
        "repo",
        vec![
            MockActionRunner::transient_failure(),
            MockActionRunner::transient_failure(),
        ],
    );

    let report = Sequencer::new(&prober, &runner)
        .with_sleep(no_sleep)
        .run(&registry, &ctx);

    assert_eq!(runner.invoked_steps(), vec!["repo"]);
    assert_eq!(report.step("repo").unwrap().attempts, 2);
    match outcome(&report, "repo") {
        StepOutcome::Failed(failure) => {
            assert!(failure.retries_exhausted);
            assert_eq!(failure.class, FailureClass::Permanent);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(
        outcome(&report, "nginx"),
        &StepOutcome::Skipped(SkipReason::BlockedByDependency("repo".to_string()))
    );
    assert_eq!(
        outcome(&report, "site"),
        &StepOutcome::Skipped(SkipReason::BlockedByDependency("nginx".to_string()))
    );
    assert_eq!(report.outcome(), RunOutcome::Aborted);
}

#[test]
fn best_effort_failure_lets_independent_steps_run() {
    let ctx = RunContext::new("/tmp");
    let registry = registry(
        r#"
steps:
  - name: docs
    command: make docs
    criticality: best_effort
  - name: app
    command: make app
"#,
        &ctx,
    )
    .unwrap();

    let prober = MockProber::new();
    let runner = MockActionRunner::new();
    runner.always_fail("docs", 1);

    let report = Sequencer::new(&prober, &runner).run(&registry, &ctx);

    assert!(outcome(&report, "docs").is_failed());
    assert_eq!(outcome(&report, "app"), &StepOutcome::Succeeded);
    assert_eq!(report.outcome(), RunOutcome::PartialFailure);
    assert_eq!(report.outcome().exit_code(), 3);
}

const ABC: &str = r#"
steps:
  - name: a
    command: echo a
  - name: b
    command: echo b
    depends_on: [a]
  - name: c
    command: echo c
    depends_on: [a]
"#;

#[test]
fn required_failure_blocks_later_independent_steps() {
    let ctx = RunContext::new("/tmp");
    let registry = registry(ABC, &ctx).unwrap();

    let prober = MockProber::new();
    let runner = MockActionRunner::new();
    runner.always_fail("b", 1);

    let report = Sequencer::new(&prober, &runner).run(&registry, &ctx);

    assert_eq!(outcome(&report, "a"), &StepOutcome::Succeeded);
    assert!(outcome(&report, "b").is_failed());
    assert_eq!(
        outcome(&report, "c"),
        &StepOutcome::Skipped(SkipReason::BlockedByAbort)
    );
    assert_eq!(runner.invoked_steps(), vec!["a", "b"]);
    assert_eq!(report.outcome(), RunOutcome::Aborted);
    assert_eq!(report.outcome().exit_code(), 4);
}

#[test]
fn declaration_order_decides_who_runs_before_abort() {
    let ctx = RunContext::new("/tmp");
    let registry = registry(
        r#"
steps:
  - name: a
    command: echo a
  - name: c
    command: echo c
    depends_on: [a]
  - name: b
    command: echo b
    depends_on: [a]
"#,
        &ctx,
    )
    .unwrap();

    let prober = MockProber::new();
    let runner = MockActionRunner::new();
    runner.always_fail("b", 1);

    let report = Sequencer::new(&prober, &runner).run(&registry, &ctx);

    assert_eq!(runner.invoked_steps(), vec!["a", "c", "b"]);
    assert_eq!(outcome(&report, "c"), &StepOutcome::Succeeded);
    assert!(outcome(&report, "b").is_failed());
    assert_eq!(report.outcome(), RunOutcome::Aborted);
}

#[test]
fn transient_failures_retry_until_success() {
    let ctx = RunContext::new("/tmp");
    let registry = registry(
        r#"
steps:
  - name: fetch
    command: curl -fsSL https://example.com/key.gpg
    retry:
      max_retries: 2
      backoff_ms: 10
"#,
        &ctx,
    )
    .unwrap();

    let prober = MockProber::new();
    let runner = MockActionRunner::new();
    runner.script(
        "fetch",
        vec![
            MockActionRunner::transient_failure(),
            MockActionRunner::transient_failure(),
            MockActionRunner::success(),
        ],
    );

    let report = Sequencer::new(&prober, &runner)
        .with_sleep(no_sleep)
        .run(&registry, &ctx);

    let fetch = report.step("fetch").unwrap();
    assert_eq!(fetch.outcome, StepOutcome::Succeeded);
    assert_eq!(fetch.attempts, 3);
    assert_eq!(fetch.attempt_log.len(), 3);
    assert_eq!(report.outcome(), RunOutcome::Success);
}

#[test]
fn rerun_after_success_skips_everything() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("provision.yml"),
        r#"
steps:
  - name: dir
    command: mkdir -p conf.d
    check:
      type: file_exists
      path: conf.d
  - name: conf
    command: echo "server_name example.com;" > conf.d/site.conf
    depends_on: [dir]
    check:
      type: file_contains
      path: conf.d/site.conf
      content: server_name example.com;
"#,
    )
    .unwrap();

    let loaded = load_manifest(&temp.path().join("provision.yml")).unwrap();
    let ctx = RunContext::for_manifest(&loaded, Default::default(), RunOptions::default()).unwrap();
    let registry = StepRegistry::load(&loaded.manifest, &ctx).unwrap();
    let sequencer = Sequencer::new(&ShellProber, &ShellActionRunner);

    let first = sequencer.run(&registry, &ctx);
    assert_eq!(first.outcome(), RunOutcome::Success);
    assert_eq!(first.succeeded_count(), 2);

    let second = sequencer.run(&registry, &ctx);
    assert_eq!(second.outcome(), RunOutcome::Success);
    assert_eq!(second.skipped_count(), 2);
    assert!(second
        .steps()
        .iter()
        .all(|s| s.outcome == StepOutcome::Skipped(SkipReason::AlreadySatisfied)));
}

#[test]
#[cfg(unix)]
fn unbounded_timeouts_still_converge() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("provision.yml"),
        r#"
settings:
  probe_timeout_secs: 0
  cancel_grace_secs: 18446744073709551615
steps:
  - name: marker
    command: touch ready
    timeout_secs: 18446744073709551615
    check:
      type: command_succeeds
      command: test -f ready
"#,
    )
    .unwrap();

    let loaded = load_manifest(&temp.path().join("provision.yml")).unwrap();
    let ctx = RunContext::for_manifest(&loaded, Default::default(), RunOptions::default()).unwrap();
    let registry = StepRegistry::load(&loaded.manifest, &ctx).unwrap();
    let sequencer = Sequencer::new(&ShellProber, &ShellActionRunner);

    let first = sequencer.run(&registry, &ctx);
    assert_eq!(first.outcome(), RunOutcome::Success);
    assert_eq!(outcome(&first, "marker"), &StepOutcome::Succeeded);

    let second = sequencer.run(&registry, &ctx);
    assert_eq!(
        outcome(&second, "marker"),
        &StepOutcome::Skipped(SkipReason::AlreadySatisfied)
    );
}
