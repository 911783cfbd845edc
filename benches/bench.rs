use cbor_codec::encode::{to_vec, EncOptions};
use cbor_codec::{unmarshal, ReadCbor, WriteCbor};
use criterion::{criterion_group, criterion_main, Criterion};
use rand::{random, thread_rng, Rng};

fn name() -> String {
    let mut arr = [0 as char; 8];
    thread_rng().fill(&mut arr[..]);
    let mut s = String::new();
    s.extend(arr.iter());
    s
}

#[derive(Debug, WriteCbor, ReadCbor)]
struct WorkStopped {
    #[cbor(rename = "type")]
    kind: String,
    by_whom: String,
    pause: bool,
    workers: Vec<String>,
    started: u64,
    stopped: u64,
}

#[derive(Debug, WriteCbor, ReadCbor)]
struct Duration {
    start: u64,
    who: String,
    duration: u64,
}

fn create_event() -> WorkStopped {
    WorkStopped {
        kind: "WorkStopped".into(),
        by_whom: name(),
        pause: false,
        workers: vec![name(), name(), name()],
        started: random(),
        stopped: random(),
    }
}

fn make_new_object(event: &WorkStopped) -> Duration {
    Duration {
        start: event.started,
        who: event.by_whom.clone(),
        duration: event.stopped.wrapping_sub(event.started),
    }
}

fn extract(c: &mut Criterion) {
    let opts = EncOptions::default();
    c.bench_function("encode event", |b| {
        b.iter_batched_ref(create_event, |e| to_vec(e, &opts), criterion::BatchSize::SmallInput)
    });
    c.bench_function("transform event", |b| {
        b.iter_batched_ref(create_event, |e| make_new_object(e), criterion::BatchSize::SmallInput)
    });
    c.bench_function("decode event", |b| {
        b.iter_batched_ref(
            || to_vec(&create_event(), &opts),
            |bytes| {
                let _: WorkStopped = unmarshal(bytes).unwrap();
            },
            criterion::BatchSize::SmallInput,
        )
    });
    c.bench_function("validate event", |b| {
        b.iter_batched_ref(
            || to_vec(&create_event(), &opts),
            |bytes| cbor_codec::valid(bytes).unwrap(),
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, extract);
criterion_main!(benches);
