//! Dispatch Benchmarks
//!
//! Measures baseline latency of the in-memory send/dispatch hot path:
//! - fire-and-forget `send`
//! - `sendAndReceive` round trip
//! - forwarding through a parent/child edge

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

// Layer 1: Standard library imports
use std::hint::black_box;

// Layer 2: Third-party crate imports
use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::Value;

// Layer 3: Internal module imports
use transept::actor::forward::TopicPattern;
use transept::actor::{ActorConfig, Behavior, TopicMap};
use transept::system::ActorSystem;
use transept::ClientProxy;

fn echo_behavior() -> Box<dyn Behavior> {
    Box::new(TopicMap::new().on("echo", |args, _proxy| async move { Ok(args.into_iter().next().unwrap_or(Value::Null)) }))
}

async fn root_actor() -> ClientProxy {
    let system = ActorSystem::builder().build();
    system
        .root_actor(echo_behavior(), ActorConfig::in_memory())
        .await
        .expect("root actor")
}

fn bench_send(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let proxy = rt.block_on(root_actor());

    c.bench_function("dispatch_send", |b| {
        b.to_async(&rt).iter(|| async {
            proxy.send("echo", vec![Value::from(1)]).await.expect("send");
        });
    });
}

fn bench_send_and_receive(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let proxy = rt.block_on(root_actor());

    c.bench_function("dispatch_send_and_receive", |b| {
        b.to_async(&rt).iter(|| async {
            let reply = proxy.send_and_receive("echo", vec![Value::from(42)]).await.expect("send_and_receive");
            black_box(reply);
        });
    });
}

fn bench_forward_to_parent(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let child = rt.block_on(async {
        let root = root_actor().await;
        let child = root
            .create_child("child", Box::new(TopicMap::new()), ActorConfig::in_memory())
            .await
            .expect("child actor");
        child.forward_to_parent(TopicPattern::Exact("echo".into()));
        child
    });

    c.bench_function("dispatch_forward_to_parent", |b| {
        b.to_async(&rt).iter(|| async {
            let reply = child.send_and_receive("echo", vec![Value::from("hi")]).await.expect("forwarded send_and_receive");
            black_box(reply);
        });
    });
}

criterion_group!(benches, bench_send, bench_send_and_receive, bench_forward_to_parent);
criterion_main!(benches);
