//! Turn streaming, cancellation and concurrent runs

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use groupchat::{
    CancellationToken, FnCapability, GroupChat, Message, RoutingSelection, RunConfig, RunFailure,
    RunStatus, TurnRecord,
};

use super::scripted::{agent, registry, ScriptedCapability, SlowCapability};

fn plan_then_slow_code() -> GroupChat {
    let a = ScriptedCapability::replying(["plan"]);
    let slow = Arc::new(SlowCapability {
        delay: Duration::from_secs(600),
        reply: "too late".to_string(),
    });

    GroupChat::builder(registry(vec![agent("A", a), agent("B", slow)]))
        .selection(RoutingSelection::new("A").route("A", "B"))
        .build(RunConfig::new(10, 3))
        .unwrap()
}

#[tokio::test]
async fn test_streamed_turns_match_outcome() {
    let a = ScriptedCapability::replying(["plan"]);
    let b = ScriptedCapability::new();
    b.push(Err(groupchat::CapabilityError::failed("flaky")));
    b.push(Ok("code %APPR%".to_string()));

    let chat = GroupChat::builder(registry(vec![agent("A", a), agent("B", b)]))
        .selection(RoutingSelection::new("A").route("A", "B"))
        .build(RunConfig::new(10, 3))
        .unwrap();

    let mut handle = chat.start_run("stream it");
    let streamed: Vec<TurnRecord> = (&mut handle).collect().await;
    let run_id = handle.run_id();
    let outcome = handle.finish().await.unwrap();

    assert_eq!(outcome.run_id, run_id);
    assert_eq!(outcome.status, RunStatus::Terminated);
    assert_eq!(streamed, outcome.turns);
    assert_eq!(streamed.len(), 3);
    assert!(streamed[1].is_error);
}

#[tokio::test]
async fn test_next_turn_yields_in_order() {
    let a = ScriptedCapability::replying(["one", "two", "three %APPR%"]);
    let chat = GroupChat::builder(registry(vec![agent("A", a)]))
        .build(RunConfig::new(10, 3))
        .unwrap();

    let mut handle = chat.start_run("count");
    let mut indices = Vec::new();
    while let Some(turn) = handle.next_turn().await {
        indices.push(turn.turn_index);
    }

    assert_eq!(indices, vec![1, 2, 3]);
    let outcome = tokio_test::assert_ok!(handle.finish().await);
    assert!(outcome.status.is_terminated());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_abandons_in_flight_call() {
    let chat = plan_then_slow_code();

    let mut handle = chat.start_run("plan then code");
    let first = handle.next_turn().await.unwrap();
    assert_eq!(first.agent, "A");

    // B is now waiting on its slow capability
    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.cancel();

    let outcome = handle.finish().await.unwrap();
    assert_eq!(outcome.status, RunStatus::Failed(RunFailure::Cancelled));
    assert_eq!(outcome.turns.len(), 1);
    assert_eq!(outcome.transcript.len(), 2);
    assert!(outcome.transcript.iter().all(|m| m.content != "too late"));
}

#[tokio::test(start_paused = true)]
async fn test_run_with_cancel_from_another_task() {
    let chat = plan_then_slow_code();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let outcome = chat.run_with_cancel("plan then code", cancel).await;
    assert_eq!(outcome.failure(), Some(&RunFailure::Cancelled));
    assert_eq!(outcome.transcript.len(), 2);
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let echo = Arc::new(FnCapability::new(|_: &str, view: &[Message]| {
        let request = view.first().map(|m| m.content.clone()).unwrap_or_default();
        Ok(format!("{} %APPR%", request))
    }));
    let chat = GroupChat::builder(registry(vec![agent("A", echo)]))
        .build(RunConfig::new(5, 3))
        .unwrap();

    let first = chat.start_run("alpha");
    let second = chat.start_run("beta");
    assert_ne!(first.run_id(), second.run_id());

    let (first, second) = tokio::join!(first.finish(), second.finish());
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.turns.len(), 1);
    assert_eq!(first.turns[0].content, "alpha %APPR%");
    assert_eq!(second.turns[0].content, "beta %APPR%");
    assert_eq!(first.transcript.len(), 2);
    assert_eq!(second.transcript.len(), 2);
}
