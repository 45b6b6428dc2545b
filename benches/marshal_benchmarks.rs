//! Marshal Benchmarks
//!
//! Measures the cost of the pieces the marshalling subsystem exercises
//! on every cross-boundary send: frame encode/decode (C1) and payload
//! value marshaller round trips (C3 message marshalling).

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

// Layer 1: Standard library imports
use std::hint::black_box;

// Layer 2: Third-party crate imports
use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};
use tokio_util::codec::{Decoder, Encoder};

// Layer 3: Internal module imports
use transept::marshal::ReferenceDescriptor;
use transept::message::frame::bodies::ActorMessageBody;
use transept::message::{Frame, FrameKind, MarshallerRegistry, ValueMarshaller};
use transept::transport::FrameCodec;
use transept::ActorId;

struct UppercaseMarshaller;

impl ValueMarshaller for UppercaseMarshaller {
    fn type_name(&self) -> &str {
        "uppercase-string"
    }

    fn marshall(&self, value: &Value) -> Result<Value, transept::message::marshaller::MarshalError> {
        Ok(Value::String(value.as_str().unwrap_or_default().to_uppercase()))
    }

    fn unmarshall(&self, value: Value) -> Result<Value, transept::message::marshaller::MarshalError> {
        Ok(value)
    }
}

fn bench_frame_round_trip(c: &mut Criterion) {
    let body = ActorMessageBody {
        topic: "hello".to_string(),
        message: json!({ "name": "World", "count": 3 }),
        receive: true,
        marshalled_type: None,
    };
    let frame = Frame::new(FrameKind::ActorMessage).with_body(body).expect("encodable body");

    c.bench_function("marshal_frame_round_trip", |b| {
        b.iter(|| {
            let mut codec = FrameCodec;
            let mut buf = BytesMut::new();
            codec.encode(frame.clone(), &mut buf).expect("encode");
            let decoded = codec.decode(&mut buf).expect("decode").expect("complete frame");
            black_box(decoded);
        });
    });
}

fn bench_value_marshaller_round_trip(c: &mut Criterion) {
    let registry = MarshallerRegistry::new();
    registry.register(Box::new(UppercaseMarshaller));
    let payload = Value::String("hello world".into());

    c.bench_function("marshal_value_round_trip", |b| {
        b.iter(|| {
            let marshalled = registry.marshall("uppercase-string", &payload).expect("marshall");
            let unmarshalled = registry.unmarshall("uppercase-string", marshalled).expect("unmarshall");
            black_box(unmarshalled);
        });
    });
}

fn bench_reference_descriptor_round_trip(c: &mut Criterion) {
    let descriptor = ReferenceDescriptor::inter_host(ActorId::new(), "127.0.0.1", 9000);

    c.bench_function("marshal_reference_descriptor_round_trip", |b| {
        b.iter(|| {
            let json = serde_json::to_string(&descriptor).expect("serialize");
            let back: ReferenceDescriptor = serde_json::from_str(&json).expect("deserialize");
            black_box(back);
        });
    });
}

criterion_group!(
    benches,
    bench_frame_round_trip,
    bench_value_marshaller_round_trip,
    bench_reference_descriptor_round_trip
);
criterion_main!(benches);
