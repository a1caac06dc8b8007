// tests/orchestrator_tests.rs
mod common;
use common::*;
use futures::StreamExt;
use serde_json::json;
use serial_test::serial;
use std::time::Duration;
use stepcore::{
  execute_step, ExpectationResult, LifecycleEventKind, Materialization, OutputEvent, RuntimeType, StepError,
};

#[tokio::test]
#[serial]
async fn test_single_output_step_runs_to_success() {
  setup_tracing();
  let manager = RecordingManager::new(ManagerReply::Nothing);
  let ctx = context(
    step("s", ScriptedCompute::emitting([result_42()])).with_output(output("result", RuntimeType::int(), &manager)),
  );

  let (events, err) = run(&ctx).await;
  assert!(err.is_none(), "unexpected error: {:?}", err);
  assert_eq!(
    event_types(&events),
    vec!["STEP_START", "STEP_OUTPUT", "ASSET_STORE_OPERATION", "STEP_SUCCESS"]
  );
  assert_eq!(manager.handled_values(), vec![json!(42)]);

  match &events[1].kind {
    LifecycleEventKind::StepOutput(data) => {
      assert!(data.type_check_data.success);
      assert_eq!(data.type_check_data.label, "result");
      assert_eq!(data.step_output_handle.output_name, "result");
      assert_eq!(data.version, None);
    }
    other => panic!("Expected StepOutput, got {:?}", other),
  }
  match &events[3].kind {
    LifecycleEventKind::StepSuccess(data) => assert!(data.duration_ms >= 0.0),
    other => panic!("Expected StepSuccess, got {:?}", other),
  }
  assert!(events.iter().all(|e| e.step_key == "s" && e.node_handle == "s"));
}

#[tokio::test]
#[serial]
async fn test_retried_attempt_starts_with_restarted_event() {
  setup_tracing();
  let manager = RecordingManager::new(ManagerReply::Nothing);
  let ctx = context(
    step("s", ScriptedCompute::emitting([result_42()])).with_output(output("result", RuntimeType::int(), &manager)),
  );

  let (events, err) = stepcore::collect_step_events(&ctx, 2).await;
  assert!(err.is_none());
  assert_eq!(events[0].event_type(), "STEP_RESTARTED");
  assert_eq!(events[0].kind, LifecycleEventKind::StepRestarted { prior_attempt_count: 2 });
  assert!(events[0].message.contains("attempt # 3"));
  assert_eq!(count_of(&events, "STEP_START"), 0);
}

#[tokio::test]
#[serial]
async fn test_nothing_runs_until_the_stream_is_pulled() {
  setup_tracing();
  let manager = RecordingManager::new(ManagerReply::Nothing);
  let compute = ScriptedCompute::emitting([result_42()]);
  let ctx = context(step("s", compute.clone()).with_output(output("result", RuntimeType::int(), &manager)));

  let mut stream = execute_step(&ctx, 0);
  assert_eq!(compute.call_count(), 0);

  let first = stream.next().await.unwrap().unwrap();
  assert_eq!(first.event_type(), "STEP_START");
  assert_eq!(compute.call_count(), 0);

  let second = stream.next().await.unwrap().unwrap();
  assert_eq!(second.event_type(), "STEP_OUTPUT");
  assert_eq!(compute.call_count(), 1);
  assert!(manager.handled_values().is_empty(), "manager ran before its event was pulled");

  drop(stream);
  assert!(manager.handled_values().is_empty());
}

#[tokio::test]
#[serial]
async fn test_expectations_and_materializations_pass_through_in_order() {
  setup_tracing();
  let manager = RecordingManager::new(ManagerReply::Nothing);
  let compute = ScriptedCompute::emitting([
    ExpectationResult::new(true).with_label("row_count").into(),
    result_42(),
    Materialization::new("report").into(),
    ExpectationResult::new(false).into(),
  ]);
  let ctx = context(step("s", compute).with_output(output("result", RuntimeType::int(), &manager)));

  let (events, err) = run(&ctx).await;
  assert!(err.is_none());
  assert_eq!(
    event_types(&events),
    vec![
      "STEP_START",
      "STEP_EXPECTATION_RESULT",
      "STEP_OUTPUT",
      "ASSET_STORE_OPERATION",
      "STEP_MATERIALIZATION",
      "STEP_EXPECTATION_RESULT",
      "STEP_SUCCESS"
    ]
  );
  assert_eq!(events[1].message, "Expectation row_count passed.");
  assert_eq!(events[5].message, "Expectation failed.");
}

#[tokio::test]
#[serial]
async fn test_compute_errors_are_wrapped_with_node_context() {
  setup_tracing();
  let manager = RecordingManager::new(ManagerReply::Nothing);
  let ctx = context(
    step("s", ScriptedCompute::new(vec![Scripted::Raise(anyhow_boom)]))
      .with_output(output("result", RuntimeType::int(), &manager)),
  );

  let (events, err) = run(&ctx).await;
  assert_eq!(event_types(&events), vec!["STEP_START"]);
  match err.unwrap() {
    StepError::Compute { step_key, node_name, node_def_name, source } => {
      assert_eq!(step_key, "s");
      assert_eq!(node_name, "s");
      assert_eq!(node_def_name, "s_def");
      assert_eq!(source.to_string(), "boom");
    }
    other => panic!("Expected Compute error, got {:?}", other),
  }
}

#[tokio::test]
#[serial]
async fn test_compute_failing_on_call_is_wrapped_too() {
  setup_tracing();
  let manager = RecordingManager::new(ManagerReply::Nothing);
  let ctx = context(step("s", RaisesOnCall(anyhow_boom)).with_output(output("result", RuntimeType::int(), &manager)));

  let (_, err) = run(&ctx).await;
  let err = err.unwrap();
  assert!(err.is_user_code_error());
  assert!(matches!(err, StepError::Compute { .. }));
}

#[tokio::test]
#[serial]
async fn test_control_flow_signals_reach_the_caller_unwrapped() {
  setup_tracing();
  let manager = RecordingManager::new(ManagerReply::Nothing);

  let failing = context(
    step("s", ScriptedCompute::new(vec![Scripted::Raise(explicit_failure)]))
      .with_output(output("result", RuntimeType::int(), &manager)),
  );
  match run(&failing).await.1.unwrap() {
    StepError::Failure(failure) => assert_eq!(failure.description, "gave up on purpose"),
    other => panic!("Expected Failure, got {:?}", other),
  }

  let retrying = context(step("s", RaisesOnCall(retry_in_five)).with_output(output("result", RuntimeType::int(), &manager)));
  let err = run(&retrying).await.1.unwrap();
  assert!(err.is_retry_requested());
  match err {
    StepError::RetryRequested(retry) => {
      assert_eq!(retry.max_retries, 3);
      assert_eq!(retry.seconds_to_wait, Some(5.0));
    }
    other => panic!("Expected RetryRequested, got {:?}", other),
  }
}

#[tokio::test]
#[serial]
async fn test_events_before_a_failure_stay_recorded() {
  setup_tracing();
  let manager = RecordingManager::new(ManagerReply::Nothing);
  let compute = ScriptedCompute::new(vec![Scripted::Emit(result_42()), Scripted::Raise(anyhow_boom)]);
  let ctx = context(step("s", compute).with_output(output("result", RuntimeType::int(), &manager)));

  let (events, err) = run(&ctx).await;
  assert!(matches!(err, Some(StepError::Compute { .. })));
  assert_eq!(
    event_types(&events),
    vec!["STEP_START", "STEP_OUTPUT", "ASSET_STORE_OPERATION"]
  );
  assert_eq!(manager.handled_values(), vec![json!(42)]);
}

#[tokio::test]
#[serial]
async fn test_every_run_ends_in_exactly_one_success_or_one_error() {
  setup_tracing();
  let manager = RecordingManager::new(ManagerReply::Nothing);
  let scripts: Vec<Vec<Scripted>> = vec![
    vec![Scripted::Emit(result_42())],
    vec![],
    vec![Scripted::Emit(result_42()), Scripted::Emit(result_42())],
    vec![Scripted::Raise(explicit_failure)],
    vec![Scripted::Emit(OutputEvent::new("result", json!("not an int")).into())],
  ];

  for script in scripts {
    let ctx = context(
      step("s", ScriptedCompute::new(script)).with_output(output("result", RuntimeType::int(), &manager)),
    );
    let mut stream = execute_step(&ctx, 0);
    let mut successes = 0;
    let mut errors = 0;
    while let Some(item) = stream.next().await {
      match item {
        Ok(event) if event.is_step_success() => successes += 1,
        Ok(_) => {}
        Err(_) => errors += 1,
      }
    }
    assert_eq!(successes + errors, 1, "successes: {}, errors: {}", successes, errors);
  }
}

#[tokio::test]
#[serial]
async fn test_compute_returning_nothing_is_fine_when_no_output_is_required() {
  setup_tracing();
  let manager = RecordingManager::new(ManagerReply::Nothing);
  let ctx = context(
    step("s", ReturnsNothing)
      .with_output(output("maybe", RuntimeType::any(), &manager).optional())
      .with_output(output("done", RuntimeType::nothing(), &manager)),
  );

  let (events, err) = run(&ctx).await;
  assert!(err.is_none(), "unexpected error: {:?}", err);
  assert_eq!(
    event_types(&events),
    vec!["STEP_START", "STEP_OUTPUT", "ASSET_STORE_OPERATION", "STEP_SUCCESS"]
  );
  assert_eq!(manager.handled_values(), vec![json!(null)]);
}

#[tokio::test]
#[serial]
async fn test_duration_covers_output_persistence() {
  setup_tracing();
  let manager = RecordingManager::slow(ManagerReply::Nothing, Duration::from_millis(30));
  let ctx = context(
    step("s", ScriptedCompute::emitting([result_42()])).with_output(output("result", RuntimeType::int(), &manager)),
  );

  let (events, err) = run(&ctx).await;
  assert!(err.is_none());
  match &events.last().unwrap().kind {
    LifecycleEventKind::StepSuccess(data) => assert!(data.duration_ms >= 30.0, "duration was {}", data.duration_ms),
    other => panic!("Expected StepSuccess, got {:?}", other),
  }
}

#[tokio::test]
#[serial]
async fn test_lifecycle_events_serialize_with_their_type_tag() {
  setup_tracing();
  let manager = RecordingManager::new(ManagerReply::Nothing);
  let ctx = context(
    step("s", ScriptedCompute::emitting([result_42()])).with_output(output("result", RuntimeType::int(), &manager)),
  );

  let (events, _) = run(&ctx).await;
  let serialized = serde_json::to_value(&events[1]).unwrap();
  assert_eq!(serialized["kind"]["event_type"], json!("STEP_OUTPUT"));
  assert_eq!(serialized["kind"]["data"]["step_output_handle"]["output_name"], json!("result"));
  assert_eq!(serialized["step_key"], json!("s"));
}
