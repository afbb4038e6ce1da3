//! End-to-end routed conversations

use groupchat::{
    ApprovalTermination, Author, GroupChat, RoutingSelection, RunConfig, RunStatus,
    SummarizationReducer,
};

use super::scripted::{agent, registry, ScriptedCapability};

fn calculator_routing() -> RoutingSelection {
    RoutingSelection::new("A")
        .route("user", "A")
        .route("A", "B")
        .route("B", "C")
        .route("C", "B")
}

#[tokio::test]
async fn test_calculator_scenario_terminates_on_approval() {
    let a = ScriptedCapability::replying(["Plan: add, subtract, multiply, divide"]);
    let b = ScriptedCapability::replying(["<html>calc v1</html>", "<html>calc v2</html>"]);
    let c = ScriptedCapability::replying(["Division by zero is unhandled", "%APPR% ship it"]);

    let chat = GroupChat::builder(registry(vec![
        agent("A", a.clone()),
        agent("B", b.clone()),
        agent("C", c.clone()),
    ]))
    .selection(calculator_routing())
    .build(RunConfig::new(25, 3))
    .unwrap();

    let outcome = chat.run("Build a calculator app").await;

    assert_eq!(outcome.status, RunStatus::Terminated);
    let speakers: Vec<_> = outcome.turns.iter().map(|t| t.agent.as_str()).collect();
    assert_eq!(speakers, vec!["A", "B", "C", "B", "C"]);
    assert_eq!(outcome.transcript.len(), 6);
    assert_eq!(outcome.failed_turns(), 0);

    let indices: Vec<_> = outcome.turns.iter().map(|t| t.turn_index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);

    // Sequence numbers increase by exactly one
    let sequences: Vec<_> = outcome.transcript.iter().map(|m| m.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(outcome.transcript.messages()[0].author, Author::User);
}

#[tokio::test]
async fn test_agents_see_bounded_history() {
    let a = ScriptedCapability::replying(["plan"]);
    let b = ScriptedCapability::replying(["v1", "v2", "v3"]);
    let c = ScriptedCapability::replying(["fix", "fix again", "%APPR%"]);

    let chat = GroupChat::builder(registry(vec![
        agent("A", a.clone()),
        agent("B", b.clone()),
        agent("C", c.clone()),
    ]))
    .selection(calculator_routing())
    .build(RunConfig::new(25, 3))
    .unwrap();

    let outcome = chat.run("Build a calculator app").await;
    assert_eq!(outcome.status, RunStatus::Terminated);
    assert_eq!(outcome.turns.len(), 7);

    for view in b.views().iter().chain(c.views().iter()) {
        assert!(view.len() <= 3);
    }

    // The last view ends with the most recent message before C's final turn
    let last_view = c.views().pop().unwrap();
    assert_eq!(last_view.last().unwrap().content, "v3");
    // The reduced view never touches the authoritative transcript
    assert_eq!(outcome.transcript.len(), 8);
}

#[tokio::test]
async fn test_summarized_history_keeps_recent_messages() {
    let summarizer = ScriptedCapability::new();
    for _ in 0..5 {
        summarizer.push(Ok("Summary so far".to_string()));
    }
    let a = ScriptedCapability::replying(["one", "two", "three", "four %APPR%"]);

    let chat = GroupChat::builder(registry(vec![agent("A", a.clone())]))
        .reducer(SummarizationReducer::new(summarizer.clone()))
        .build(RunConfig::new(10, 2))
        .unwrap();

    let outcome = chat.run("count").await;
    assert_eq!(outcome.status, RunStatus::Terminated);

    let views = a.views();
    // Turn 3 sees: summary of the request, then "one", "two"
    assert_eq!(views[2].len(), 3);
    assert_eq!(views[2][0].author, Author::System);
    assert_eq!(views[2][0].content, "Summary so far");
    assert_eq!(views[2][1].content, "one");
    assert!(summarizer.calls() >= 1);
}

#[tokio::test]
async fn test_approval_only_counts_from_reviewer() {
    let a = ScriptedCapability::replying(["%APPR% I approve my own plan"]);
    let b = ScriptedCapability::replying(["code"]);
    let c = ScriptedCapability::replying(["%APPR%"]);

    let chat = GroupChat::builder(registry(vec![
        agent("A", a.clone()),
        agent("B", b.clone()),
        agent("C", c.clone()),
    ]))
    .selection(calculator_routing())
    .termination(ApprovalTermination::default().with_agents(["C"]))
    .build(RunConfig::new(10, 3))
    .unwrap();

    let outcome = chat.run("Build a calculator app").await;
    assert_eq!(outcome.status, RunStatus::Terminated);
    assert_eq!(outcome.turns.len(), 3);
    assert_eq!(outcome.turns[2].agent, "C");
}

#[tokio::test]
async fn test_runs_do_not_share_state() {
    let a = ScriptedCapability::replying(["first %APPR%", "second %APPR%"]);
    let chat = GroupChat::builder(registry(vec![agent("A", a.clone())]))
        .build(RunConfig::new(5, 3))
        .unwrap();

    let first = chat.run("one").await;
    let second = chat.run("two").await;

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.transcript.len(), 2);
    assert_eq!(second.transcript.len(), 2);
    assert_eq!(second.transcript.messages()[0].content, "two");
    assert_eq!(second.turns[0].turn_index, 1);
}
