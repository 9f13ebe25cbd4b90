use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rampr::{ExitCode, Hooks, IterationError, SetupError, Verdict, iteration_fn, run_yaml};

#[derive(Default)]
struct NoLocal;

#[tokio::test(start_paused = true)]
async fn passing_run_exits_zero_with_summary() {
    let yaml = r#"
vus: 2
duration: 3s
think_time: 100ms
metrics:
  rtt: trend
thresholds:
  rtt: ["p(95)<200", "avg<100"]
  checks: ["rate>0.95"]
"#;

    let iteration = iteration_fn::<i64, NoLocal, _>(|ctx| {
        Box::pin(async move {
            let metrics = ctx.metrics();
            metrics.trend("rtt")?.add(20.0);
            ctx.check("data ok", *ctx.data() == 7);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<(), IterationError>(())
        })
    });

    let outcome = run_yaml(yaml, Hooks::with_data(7i64), iteration, None, None)
        .await
        .unwrap_or_else(|e| panic!("{e:#}"));

    assert_eq!(outcome.exit_code, ExitCode::Success);
    assert_eq!(outcome.exit_code.as_i32(), 0);
    assert_eq!(outcome.report.verdict, Verdict::Passed);

    assert!(outcome.summary.contains("verdict: passed"));
    assert!(outcome.summary.contains("rtt: p(95)<200"));
    assert!(outcome.summary.contains("data ok: pass="));
}

#[tokio::test(start_paused = true)]
async fn failing_threshold_maps_to_nonzero_exit() {
    let yaml = r#"
vus: 1
duration: 2s
think_time: 100ms
metrics:
  errors: counter
thresholds:
  errors: ["count<1"]
"#;

    let iteration = iteration_fn::<(), NoLocal, _>(|ctx| {
        Box::pin(async move {
            ctx.metrics().counter("errors")?.add(1.0);
            Ok(())
        })
    });

    let outcome = run_yaml(yaml, Hooks::none(), iteration, None, None)
        .await
        .unwrap_or_else(|e| panic!("{e:#}"));

    assert_eq!(outcome.report.verdict, Verdict::Failed);
    assert_eq!(outcome.exit_code, ExitCode::ThresholdsFailed);
    assert_ne!(outcome.exit_code.as_i32(), 0);
    assert!(outcome.summary.contains("[FAIL]"));

    let json = rampr::render_json(&outcome.report).unwrap_or_else(|e| panic!("{e:#}"));
    assert!(json.contains("\"verdict\": \"failed\""));
}

#[tokio::test(start_paused = true)]
async fn aborting_run_still_reports_and_tears_down() {
    let yaml = r#"
vus: 1
duration: 30s
think_time: 100ms
metrics:
  slow: trend
thresholds:
  slow:
    - threshold: "avg<10"
      abort_on_fail: true
"#;

    let torn_down = Arc::new(AtomicBool::new(false));

    let iteration = iteration_fn::<(), NoLocal, _>(|ctx| {
        Box::pin(async move {
            ctx.metrics().trend("slow")?.add(500.0);
            Ok(())
        })
    });

    let torn = torn_down.clone();
    let hooks = Hooks::with_data(()).on_teardown(move |_data, _ctx| {
        let torn = torn.clone();
        async move {
            torn.store(true, Ordering::SeqCst);
            Ok(())
        }
    });

    let outcome = run_yaml(yaml, hooks, iteration, None, None)
        .await
        .unwrap_or_else(|e| panic!("{e:#}"));

    assert_eq!(outcome.report.verdict, Verdict::Aborted);
    assert_eq!(outcome.exit_code, ExitCode::Aborted);
    assert!(torn_down.load(Ordering::SeqCst));
    assert!(outcome.summary.contains("aborted by: slow"));
}

#[tokio::test]
async fn setup_failure_maps_to_setup_exit_code() {
    let yaml = "vus: 1\nduration: 1s\n";

    let iteration = iteration_fn::<(), NoLocal, _>(|_ctx| {
        Box::pin(async { Ok(()) })
    });

    let hooks: Hooks<()> = Hooks::new(|_ctx| async {
        Err(SetupError::new("backend unreachable"))
    });

    let outcome = run_yaml(yaml, hooks, iteration, None, None)
        .await
        .unwrap_or_else(|e| panic!("{e:#}"));

    assert_eq!(outcome.exit_code, ExitCode::SetupFailed);
    assert!(outcome.summary.contains("setup failed: backend unreachable"));
}

#[tokio::test]
async fn invalid_options_fail_before_running() {
    let err = match run_yaml(
        "vus: 0\nduration: 1s\n",
        Hooks::none(),
        iteration_fn::<(), NoLocal, _>(|_ctx| Box::pin(async { Ok(()) })),
        None,
        None,
    )
    .await
    {
        Ok(_) => panic!("expected error"),
        Err(e) => e,
    };

    assert!(format!("{err:#}").contains("vus"));
}
