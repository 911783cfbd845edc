//! Round-trips a hand-built struct through `marshal`/`unmarshal`, then
//! re-parses the same bytes as a dynamic `Value` and checks well-formedness
//! with `valid` alone, without decoding.

use cbor_codec::{marshal, unmarshal, valid, ReadCbor, Value, WriteCbor};

#[derive(Debug, PartialEq, WriteCbor, ReadCbor, Default)]
struct Job {
    #[cbor(rename = "type")]
    kind: String,
    #[cbor(keyasint = 1)]
    priority: u64,
    #[cbor(omitempty)]
    tags: Vec<String>,
}

fn main() {
    let job = Job {
        kind: "WorkStopped".into(),
        priority: 3,
        tags: vec!["urgent".into(), "retry".into()],
    };

    let bytes = marshal(&job);
    println!("encoded {} bytes", bytes.len());

    valid(&bytes).expect("well-formed");

    let back: Job = unmarshal(&bytes).expect("decode");
    assert_eq!(job, back);
    println!("round-tripped: {:?}", back);

    let dynamic: Value = unmarshal(&bytes).expect("decode as Value");
    println!("as Value: {:?}", dynamic);
}
