//! Recovery, fatal errors and the turn budget

use std::sync::Arc;
use std::time::Duration;

use groupchat::{
    CapabilityError, CapabilitySelection, CapabilityTermination, GroupChat, RoutingSelection,
    RunConfig, RunFailure, RunStatus, StrategyError,
};

use super::scripted::{agent, registry, ScriptedCapability, SlowCapability};

#[tokio::test]
async fn test_capability_failure_is_recorded_and_run_continues() {
    let a = ScriptedCapability::replying(["plan"]);
    let b = ScriptedCapability::new();
    b.push(Err(CapabilityError::failed("connection reset")));
    b.push(Ok("code".to_string()));
    let c = ScriptedCapability::replying(["%APPR%"]);

    let chat = GroupChat::builder(registry(vec![
        agent("A", a.clone()),
        agent("B", b.clone()),
        agent("C", c.clone()),
    ]))
    .selection(
        RoutingSelection::new("A")
            .route("A", "B")
            .route("B", "C")
            .route("C", "B"),
    )
    .build(RunConfig::new(10, 3))
    .unwrap();

    let outcome = chat.run("Build a calculator app").await;

    assert_eq!(outcome.status, RunStatus::Terminated);
    assert_eq!(outcome.turns.len(), 4);

    let failure = &outcome.turns[1];
    assert!(failure.is_system());
    assert!(failure.is_error);
    assert_eq!(failure.turn_index, 2);
    assert_eq!(failure.sequence, None);
    assert!(failure.content.contains("Agent 'B' failed"));
    assert!(failure.content.contains("connection reset"));

    // Failed turn leaves the transcript untouched, so B is selected again
    assert_eq!(outcome.turns[2].agent, "B");
    assert_eq!(outcome.transcript.len(), 4);
    assert_eq!(b.calls(), 2);
    assert_eq!(outcome.failed_turns(), 1);
}

#[tokio::test]
async fn test_persistent_failures_exhaust_the_budget() {
    let a = ScriptedCapability::new();
    let chat = GroupChat::builder(registry(vec![agent("A", a.clone())]))
        .build(RunConfig::new(3, 3))
        .unwrap();

    let outcome = chat.run("anything").await;

    assert_eq!(
        outcome.status,
        RunStatus::Failed(RunFailure::TurnBudgetExceeded { max_turns: 3 })
    );
    assert_eq!(outcome.turns.len(), 3);
    assert!(outcome.turns.iter().all(|t| t.is_error));
    assert_eq!(outcome.transcript.len(), 1);
    assert_eq!(a.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_a_recoverable_failure() {
    let a = ScriptedCapability::replying(["plan"]);
    let slow = Arc::new(SlowCapability {
        delay: Duration::from_secs(600),
        reply: "too late".to_string(),
    });

    let chat = GroupChat::builder(registry(vec![agent("A", a.clone()), agent("B", slow)]))
        .selection(RoutingSelection::new("A").route("A", "B"))
        .build(RunConfig::new(4, 3).with_capability_timeout(Duration::from_secs(30)))
        .unwrap();

    let outcome = chat.run("plan then code").await;

    assert_eq!(
        outcome.status,
        RunStatus::Failed(RunFailure::TurnBudgetExceeded { max_turns: 4 })
    );
    assert_eq!(outcome.turns.len(), 4);
    assert!(!outcome.turns[0].is_error);
    for turn in &outcome.turns[1..] {
        assert!(turn.is_error);
        assert!(turn.content.contains("timed out after 30000ms"));
    }
    assert_eq!(outcome.transcript.len(), 2);
}

#[tokio::test]
async fn test_unrecognized_selection_is_fatal() {
    let writer = ScriptedCapability::new();
    let decider = ScriptedCapability::replying(["I cannot decide"]);

    let chat = GroupChat::builder(registry(vec![
        agent("Writer", writer.clone()),
        agent("Reviewer", ScriptedCapability::new()),
    ]))
    .selection(CapabilitySelection::new(decider.clone(), ["Writer", "Reviewer"]))
    .build(RunConfig::new(5, 3))
    .unwrap();

    let outcome = chat.run("draft a memo").await;

    match outcome.failure() {
        Some(RunFailure::SelectionFailed(StrategyError::Unrecognized(reply))) => {
            assert_eq!(reply, "I cannot decide");
        }
        other => panic!("Expected selection failure, got {:?}", other),
    }
    assert!(outcome.turns.is_empty());
    assert_eq!(writer.calls(), 0);
}

#[tokio::test]
async fn test_selection_capability_error_is_fatal() {
    let writer = ScriptedCapability::replying(["draft"]);
    let decider = ScriptedCapability::new();
    decider.push(Err(CapabilityError::Request("connection refused".to_string())));

    let chat = GroupChat::builder(registry(vec![
        agent("Writer", writer.clone()),
        agent("Reviewer", ScriptedCapability::new()),
    ]))
    .selection(CapabilitySelection::new(decider.clone(), ["Writer", "Reviewer"]))
    .build(RunConfig::new(5, 3))
    .unwrap();

    let outcome = chat.run("draft a memo").await;

    match outcome.failure() {
        Some(RunFailure::SelectionFailed(StrategyError::Capability(
            CapabilityError::Request(message),
        ))) => assert_eq!(message, "connection refused"),
        other => panic!("Expected selection capability failure, got {:?}", other),
    }
    assert!(outcome.turns.is_empty());
    assert_eq!(outcome.transcript.len(), 1);
    assert_eq!(writer.calls(), 0);
    assert_eq!(decider.calls(), 1);
}

#[tokio::test]
async fn test_capability_selection_picks_named_agent() {
    let writer = ScriptedCapability::replying(["draft"]);
    let reviewer = ScriptedCapability::replying(["%APPR%"]);
    let decider = ScriptedCapability::replying(["Writer", "\"reviewer\"."]);

    let chat = GroupChat::builder(registry(vec![
        agent("Writer", writer.clone()),
        agent("Reviewer", reviewer.clone()),
    ]))
    .selection(CapabilitySelection::new(decider.clone(), ["Writer", "Reviewer"]))
    .build(RunConfig::new(5, 3))
    .unwrap();

    let outcome = chat.run("draft a memo").await;

    assert_eq!(outcome.status, RunStatus::Terminated);
    let speakers: Vec<_> = outcome.turns.iter().map(|t| t.agent.as_str()).collect();
    assert_eq!(speakers, vec!["Writer", "Reviewer"]);
}

#[tokio::test]
async fn test_termination_failure_is_fatal() {
    let a = ScriptedCapability::replying(["done?"]);
    let judge = ScriptedCapability::new();
    judge.push(Err(CapabilityError::Status {
        code: 503,
        body: "overloaded".to_string(),
    }));

    let chat = GroupChat::builder(registry(vec![agent("A", a.clone())]))
        .termination(CapabilityTermination::new(judge.clone()))
        .build(RunConfig::new(5, 3))
        .unwrap();

    let outcome = chat.run("finish").await;

    assert!(matches!(
        outcome.failure(),
        Some(RunFailure::TerminationCheckFailed(StrategyError::Capability(
            CapabilityError::Status { code: 503, .. }
        )))
    ));
    // The reply was appended before the check ran
    assert_eq!(outcome.turns.len(), 1);
    assert_eq!(outcome.transcript.len(), 2);
}

#[tokio::test]
async fn test_capability_termination_stops_run() {
    let a = ScriptedCapability::replying(["draft", "final"]);
    let judge = ScriptedCapability::replying(["no", "Yes, approved."]);

    let chat = GroupChat::builder(registry(vec![agent("A", a.clone())]))
        .termination(CapabilityTermination::new(judge.clone()))
        .build(RunConfig::new(5, 3))
        .unwrap();

    let outcome = chat.run("finish").await;

    assert_eq!(outcome.status, RunStatus::Terminated);
    assert_eq!(outcome.turns.len(), 2);
    // The judge only sees the latest message
    assert!(judge.views().iter().all(|view| view.len() == 1));
}
