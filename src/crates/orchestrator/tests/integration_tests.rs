//! End-to-end scenarios for the orchestration runtime
//!
//! These drive the whole stack - facade, graph runtime, scaffold nodes,
//! built-in agents, broadcaster, session store - through realistic
//! conversations and assert the envelope and event-stream contracts.

use agentgraph_checkpoint::SessionStore;
use agentgraph_core::{
    EnvelopeStatus, EventKind, FnNode, GraphSpec, Intent, NodeDescriptor, NodeOutput,
    RetryPolicy, TurnOptions, FINALIZE,
};
use orchestrator::broadcast::EventFilter;
use orchestrator::{Orchestrator, OrchestratorConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn orchestrator() -> Orchestrator {
    Orchestrator::new(OrchestratorConfig::default()).unwrap()
}

/// Scenario: happy-path financial summary
#[tokio::test]
async fn test_happy_path_summary() {
    let orchestrator = orchestrator();
    let session = "happy-path".to_string();
    let events = orchestrator.subscribe_events(EventFilter::session(session.clone()));

    let handle = orchestrator
        .start_turn(
            Some(session.clone()),
            "Give me a full financial summary",
            TurnOptions::default(),
        )
        .await
        .unwrap();

    let envelope = &handle.envelope;
    assert_eq!(envelope.status, EnvelopeStatus::Ok);
    assert_eq!(envelope.intent, Intent::Summary);
    assert_eq!(
        envelope.meta.completed_nodes,
        vec!["intent", "reasoning", "router", "summary", "assemble", "finalize"]
    );
    assert!(envelope.data.metrics["total"].as_f64().unwrap() > 0.0);
    assert!(!envelope.data.message.is_empty());
    assert_eq!(envelope.data.plan.len(), 1);
    assert_eq!(envelope.data.plan[0].target_agent, "summary");

    // Control frames first, then the live stream
    let first = events.try_recv().unwrap();
    assert_eq!(first.kind, EventKind::Connection);
    let second = events.try_recv().unwrap();
    assert_eq!(second.kind, EventKind::History);

    let mut transitions = 0;
    let mut starts = 0;
    let mut ends = 0;
    let mut last_sequence: Option<u64> = None;
    while let Some(event) = events.try_recv() {
        if let Some(prev) = last_sequence {
            assert!(event.sequence > prev, "sequence must strictly increase");
        }
        last_sequence = Some(event.sequence);
        match event.kind {
            EventKind::NodeTransition => transitions += 1,
            EventKind::AgentStart => starts += 1,
            EventKind::AgentEnd => ends += 1,
            _ => {}
        }
    }
    // Six transitions; start/end pairs for every node except finalize
    assert_eq!(transitions, 6);
    assert_eq!(starts, 5);
    assert_eq!(ends, 5);
}

/// Scenario: low-confidence input falls back to smalltalk
#[tokio::test]
async fn test_low_confidence_fallback() {
    let orchestrator = orchestrator();

    let handle = orchestrator
        .start_turn(Some("gibberish".to_string()), "asdf qwer", TurnOptions::default())
        .await
        .unwrap();

    let envelope = &handle.envelope;
    assert_eq!(envelope.status, EnvelopeStatus::Ok);
    assert_eq!(envelope.intent, Intent::Smalltalk);
    assert!(envelope
        .meta
        .completed_nodes
        .ends_with(&["smalltalk".to_string(), "assemble".to_string(), "finalize".to_string()]));
    assert!(!envelope.data.message.is_empty());

    // The persisted state records the routing decision
    let latest = orchestrator.store().get_latest("gibberish").await.unwrap();
    assert_eq!(latest.payload["routing_decision"], json!("smalltalk"));
}

/// Scenario: human gate pause and resume
#[tokio::test]
async fn test_human_gate_pause_and_resume() {
    let orchestrator = orchestrator();
    let session = "gated".to_string();

    let first = orchestrator
        .start_turn(
            Some(session.clone()),
            "Write the summary to a document, overwrite it if it exists",
            TurnOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(first.envelope.status, EnvelopeStatus::AwaitingHuman);
    let gate = first.envelope.meta.human_gate.clone().unwrap();
    assert_eq!(gate.reason, "confirm overwrite");
    assert!(!gate.resume_token.is_empty());
    // No nodes past the gate executed
    assert!(!first
        .envelope
        .meta
        .completed_nodes
        .contains(&"assemble".to_string()));

    let second = orchestrator
        .resume(&session, &gate.resume_token, json!({"approve": true}))
        .await
        .unwrap();

    assert_eq!(second.envelope.status, EnvelopeStatus::Ok);
    let completed = &second.envelope.meta.completed_nodes;
    assert_eq!(
        completed.iter().filter(|n| n.as_str() == "document_write").count(),
        1
    );
    assert_eq!(
        second.envelope.data.agent_results["document_write"]["written"],
        json!(true)
    );
}

/// Scenario: a node that blows its deadline fails the turn with a timeout
#[tokio::test]
async fn test_node_timeout() {
    let orchestrator = orchestrator();

    let sleeper = Arc::new(FnNode::new(|state, _caps, _ctx| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(NodeOutput::new(state))
        })
    }));
    orchestrator
        .register_node(
            NodeDescriptor::agent("sleepy", sleeper)
                .with_timeout_ms(500)
                .with_retry(RetryPolicy::none()),
        )
        .unwrap();
    orchestrator
        .rebuild_graph(GraphSpec::new().set_entry("sleepy").add_edge("sleepy", FINALIZE))
        .unwrap();

    let started = Instant::now();
    let handle = orchestrator
        .start_turn(Some("timeout".to_string()), "hang forever", TurnOptions::default())
        .await
        .unwrap();

    // agent_start to agent_end within deadline + grace, with margin
    assert!(started.elapsed() < Duration::from_millis(3_500));
    assert_eq!(handle.envelope.status, EnvelopeStatus::Failed);
    let error = handle.envelope.meta.error.clone().unwrap();
    assert_eq!(error.kind, "timeout");
    assert_eq!(error.node.as_deref(), Some("sleepy"));
}

/// Scenario: registration mid-flight does not disturb a running session
#[tokio::test]
async fn test_dynamic_registration_mid_flight() {
    let orchestrator = Arc::new(orchestrator());

    let slow_echo = Arc::new(FnNode::new(|state, _caps, _ctx| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            Ok(NodeOutput::new(state))
        })
    }));
    orchestrator
        .register_node(NodeDescriptor::agent("slow_echo", slow_echo).with_retry(RetryPolicy::none()))
        .unwrap();
    orchestrator
        .rebuild_graph(
            GraphSpec::new()
                .set_entry("slow_echo")
                .add_edge("slow_echo", FINALIZE),
        )
        .unwrap();
    let version_a = orchestrator.graph_version().unwrap();

    let session_a = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .start_turn(Some("session-a".to_string()), "slow one", TurnOptions::default())
                .await
        })
    };

    // Let session A enter its node, then swap the implementation
    tokio::time::sleep(Duration::from_millis(100)).await;
    let marker = Arc::new(FnNode::new(|state, _caps, _ctx| {
        Box::pin(async move {
            let mutator = agentgraph_core::StateMutator::new();
            let mut results = serde_json::Map::new();
            results.insert("slow_echo".to_string(), json!({"replaced": true}));
            let state = mutator.merge_mapping(
                &state,
                agentgraph_core::StateField::AgentResults,
                results,
            )?;
            Ok(NodeOutput::new(state))
        })
    }));
    orchestrator
        .register_node(NodeDescriptor::agent("slow_echo", marker).with_retry(RetryPolicy::none()))
        .unwrap();
    let version_b = orchestrator.graph_version().unwrap();
    assert!(version_b > version_a);

    // Session A completed on the pre-swap graph
    let handle_a = session_a.await.unwrap().unwrap();
    assert_eq!(handle_a.envelope.status, EnvelopeStatus::Ok);
    assert_eq!(handle_a.envelope.meta.graph_version, version_a);
    assert!(handle_a.envelope.data.agent_results.is_empty());

    // Session B uses the replacement implementation
    let handle_b = orchestrator
        .start_turn(Some("session-b".to_string()), "fresh one", TurnOptions::default())
        .await
        .unwrap();
    assert_eq!(handle_b.envelope.meta.graph_version, version_b);
    assert_eq!(
        handle_b.envelope.data.agent_results["slow_echo"]["replaced"],
        json!(true)
    );
}

/// Scenario: a stalled subscriber never blocks the stream and keeps the tail
#[tokio::test]
async fn test_broadcaster_backpressure() {
    let orchestrator = orchestrator();
    let slow = orchestrator.subscribe_events(EventFilter::session("bp"));
    let fast = orchestrator.subscribe_events(EventFilter::session("bp"));
    // Drain control frames
    slow.try_recv().unwrap();
    slow.try_recv().unwrap();
    fast.try_recv().unwrap();
    fast.try_recv().unwrap();

    use agentgraph_core::{EventEnvelope, EventSink};
    let mut fast_seen = Vec::new();
    for _ in 0..1000 {
        orchestrator
            .events()
            .publish(EventEnvelope::new(EventKind::AgentProgress, "bp", "trace"));
        fast_seen.push(fast.try_recv().unwrap().sequence);
    }

    assert_eq!(fast_seen.len(), 1000);
    assert!(fast_seen.windows(2).all(|w| w[1] > w[0]));

    assert_eq!(slow.queue_len(), 256);
    assert!(slow.dropped_count() >= 744);
    let mut tail = Vec::new();
    while let Some(event) = slow.try_recv() {
        tail.push(event.sequence);
    }
    assert_eq!(tail.len(), 256);
    assert_eq!(*tail.last().unwrap(), 999);
    assert!(tail.windows(2).all(|w| w[1] > w[0]));

    orchestrator.unsubscribe(&slow);
    orchestrator.unsubscribe(&fast);
}

/// Repeating an identical query serves the cached result without re-running
/// agents
#[tokio::test]
async fn test_repeat_turn_uses_cache() {
    let orchestrator = orchestrator();
    let session = "repeat".to_string();

    let first = orchestrator
        .start_turn(
            Some(session.clone()),
            "Give me a full financial summary",
            TurnOptions::default(),
        )
        .await
        .unwrap();

    let second = orchestrator
        .start_turn(
            Some(session.clone()),
            "give me a FULL financial summary!",
            TurnOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(second.envelope.intent, first.envelope.intent);
    assert_eq!(second.envelope.data.metrics, first.envelope.data.metrics);
    assert_eq!(second.envelope.meta.completed_nodes, vec!["finalize"]);
}

/// Side-effecting turns (document writes) are never served from cache
#[tokio::test]
async fn test_side_effecting_turn_not_cached() {
    let orchestrator = orchestrator();
    let session = "sfx".to_string();
    let message = "Write the summary to a document, overwrite it if it exists";

    for _ in 0..2 {
        let paused = orchestrator
            .start_turn(Some(session.clone()), message, TurnOptions::default())
            .await
            .unwrap();
        assert_eq!(paused.envelope.status, EnvelopeStatus::AwaitingHuman);
        let gate = paused.envelope.meta.human_gate.clone().unwrap();
        let done = orchestrator
            .resume(&session, &gate.resume_token, json!({"approve": true}))
            .await
            .unwrap();
        // The write happened both times; nothing was short-circuited
        assert_eq!(
            done.envelope.data.agent_results["document_write"]["written"],
            json!(true)
        );
    }
}

/// Resume is deterministic: identical decisions produce identical results
#[tokio::test]
async fn test_resume_determinism() {
    let orchestrator = orchestrator();
    let message = "Write the summary to a document, overwrite it if it exists";
    let mut outcomes = Vec::new();

    for session in ["det-a", "det-b"] {
        let paused = orchestrator
            .start_turn(Some(session.to_string()), message, TurnOptions::default())
            .await
            .unwrap();
        let gate = paused.envelope.meta.human_gate.clone().unwrap();
        let done = orchestrator
            .resume(session, &gate.resume_token, json!({"approve": true}))
            .await
            .unwrap();
        outcomes.push(done.envelope);
    }

    assert_eq!(outcomes[0].data, outcomes[1].data);
    assert_eq!(outcomes[0].meta.completed_nodes, outcomes[1].meta.completed_nodes);
}

/// Envelope metadata agrees with the persisted terminal state, and the
/// persisted state round-trips byte-identically
#[tokio::test]
async fn test_envelope_and_checkpoint_agree() {
    let orchestrator = orchestrator();
    let session = "agree".to_string();

    let handle = orchestrator
        .start_turn(
            Some(session.clone()),
            "any anomalies this week?",
            TurnOptions::default(),
        )
        .await
        .unwrap();

    let latest = orchestrator.store().get_latest(&session).await.unwrap();
    let persisted: Vec<String> = latest.payload["completed_nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(handle.envelope.meta.completed_nodes, persisted);

    // serialize -> deserialize -> serialize is byte-stable
    let state = agentgraph_core::GraphState::from_payload(&latest.payload).unwrap();
    let first = serde_json::to_vec(&state).unwrap();
    let reparsed: agentgraph_core::GraphState = serde_json::from_slice(&first).unwrap();
    let second = serde_json::to_vec(&reparsed).unwrap();
    assert_eq!(first, second);
}

/// Late subscribers receive bounded history before the live stream
#[tokio::test]
async fn test_history_replay_bounds() {
    use agentgraph_core::{EventEnvelope, EventSink};
    let orchestrator = orchestrator();

    for _ in 0..10 {
        orchestrator
            .events()
            .publish(EventEnvelope::new(EventKind::AgentProgress, "small", "t"));
    }
    let handle = orchestrator.subscribe_events(EventFilter::session("small"));
    handle.try_recv().unwrap();
    let history = handle.try_recv().unwrap();
    assert_eq!(history.data["events"].as_array().unwrap().len(), 10);

    for _ in 0..150 {
        orchestrator
            .events()
            .publish(EventEnvelope::new(EventKind::AgentProgress, "large", "t"));
    }
    let handle = orchestrator.subscribe_events(EventFilter::session("large"));
    handle.try_recv().unwrap();
    let history = handle.try_recv().unwrap();
    // Capped at broadcast_history (default 100), newest retained
    let replayed = history.data["events"].as_array().unwrap();
    assert_eq!(replayed.len(), 100);
    assert_eq!(replayed.last().unwrap()["sequence"], json!(149));
}

/// Different sessions progress independently through different intents
#[tokio::test]
async fn test_parallel_sessions() {
    let orchestrator = Arc::new(orchestrator());
    let mut turns = Vec::new();

    let prompts = [
        ("p-summary", "Give me a full financial summary", Intent::Summary),
        ("p-branch", "How are the branches doing?", Intent::Branch),
        ("p-anomaly", "Anything suspicious or irregular?", Intent::Anomaly),
    ];
    for (session, message, _) in prompts {
        let orchestrator = orchestrator.clone();
        turns.push(tokio::spawn(async move {
            orchestrator
                .start_turn(Some(session.to_string()), message, TurnOptions::default())
                .await
        }));
    }

    for (task, (_, _, expected_intent)) in turns.into_iter().zip(prompts) {
        let handle = task.await.unwrap().unwrap();
        assert_eq!(handle.envelope.status, EnvelopeStatus::Ok);
        assert_eq!(handle.envelope.intent, expected_intent);
        assert!(handle
            .envelope
            .meta
            .completed_nodes
            .ends_with(&["assemble".to_string(), "finalize".to_string()]));
    }
}

/// Cancel requests are acknowledged and produce a failed envelope
#[tokio::test]
async fn test_cancel_turn() {
    let orchestrator = Arc::new(orchestrator());

    let waiter = Arc::new(FnNode::new(|state, _caps, ctx| {
        Box::pin(async move {
            ctx.cancel_signal().cancelled().await;
            Ok(NodeOutput::new(state))
        })
    }));
    orchestrator
        .register_node(NodeDescriptor::agent("waiter", waiter).with_retry(RetryPolicy::none()))
        .unwrap();
    orchestrator
        .rebuild_graph(GraphSpec::new().set_entry("waiter").add_edge("waiter", FINALIZE))
        .unwrap();

    let events = orchestrator.subscribe_events(EventFilter::session("cancel-me"));
    let turn = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .start_turn(Some("cancel-me".to_string()), "wait", TurnOptions::default())
                .await
        })
    };

    // Find the trace id from the stream, then cancel it
    let trace_id = loop {
        if let Some(event) = events.try_recv() {
            if event.kind == EventKind::AgentStart {
                break event.trace_id;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    assert!(orchestrator.cancel(&trace_id));

    let handle = turn.await.unwrap().unwrap();
    assert_eq!(handle.envelope.status, EnvelopeStatus::Failed);
    assert_eq!(handle.envelope.meta.error.clone().unwrap().kind, "cancelled");
}
