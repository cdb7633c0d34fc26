use agentgraph_checkpoint::{InMemorySessionStore, SessionStore, StateSnapshot};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

fn snapshot(step: u64) -> StateSnapshot {
    StateSnapshot::new(
        step,
        "processing",
        json!({
            "session_id": "bench-session",
            "step": step,
            "agent_results": {"summary": {"total": 125000.50}},
            "completed_nodes": ["intent", "reasoning", "router"],
        }),
    )
}

fn session_put_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("session put", |b| {
        b.to_async(&runtime).iter(|| async {
            let store = InMemorySessionStore::new(32, chrono::Duration::minutes(30));
            store
                .put("bench-session", black_box(snapshot(0)))
                .await
                .unwrap();
        });
    });
}

fn session_get_latest_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("session get_latest", |b| {
        b.to_async(&runtime).iter(|| async {
            let store = InMemorySessionStore::new(32, chrono::Duration::minutes(30));
            for step in 0..8u64 {
                store.put("bench-session", snapshot(step)).await.unwrap();
            }
            store
                .get_latest(black_box("bench-session"))
                .await
                .unwrap();
        });
    });
}

criterion_group!(benches, session_put_benchmark, session_get_latest_benchmark);
criterion_main!(benches);
