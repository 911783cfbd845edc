use cbor_codec::decode::{from_slice, unmarshal_into, DecOptions};
use cbor_codec::encode::to_vec_default;
use cbor_codec::{ErrorKind, ReadCbor, WriteCbor};

fn b(mut s: &str) -> Vec<u8> {
    let mut ret = vec![];
    while !s.is_empty() {
        let space = s.find(' ').unwrap_or(s.len());
        ret.push(u8::from_str_radix(&s[..space], 16).unwrap());
        s = &s[(space + 1).min(s.len())..];
    }
    ret
}

#[test]
fn named_struct() {
    #[derive(ReadCbor, WriteCbor, PartialEq, Debug, Default)]
    struct X {
        x: String,
        y: u64,
    }

    impl X {
        fn new(x: impl Into<String>, y: u64) -> Self {
            Self { x: x.into(), y }
        }
    }

    let bytes = to_vec_default(&X::new("hello", 42));
    assert_eq!(bytes.as_slice(), b("a2 61 78 65 68 65 6c 6c 6f 61 79 18 2a"));
    let x: X = from_slice(&bytes, &DecOptions::default()).unwrap();
    assert_eq!(x, X::new("hello", 42));

    // missing field "x" defaults to String::new() rather than erroring
    let x: X = from_slice(&b("a1 61 79 18 2a"), &DecOptions::default()).unwrap();
    assert_eq!(x, X::new("", 42));

    // extra, unknown key is ignored
    let x: X = from_slice(
        &b("a3 61 78 64 68 65 6c 6c 61 79 18 2a 61 41 00"),
        &DecOptions::default(),
    )
    .unwrap();
    assert_eq!(x, X::new("hell", 42));
}

#[test]
fn merge_into_existing_target_keeps_fields_decoded_before_a_failure() {
    #[derive(ReadCbor, WriteCbor, PartialEq, Debug, Default)]
    struct X {
        a: String,
        b: String,
    }

    // {"a": "AA", "b": 1}: "b" fails to unmarshal into a String field, but
    // "a" was already merged into `target` before that happened.
    let bytes = b("a2 61 61 62 41 41 61 62 01");
    let mut target = X::default();
    let err = unmarshal_into(&bytes, &mut target, &DecOptions::default()).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UnmarshalType { .. }));
    assert_eq!(target.a, "AA");
}

#[test]
fn rename_and_keyasint() {
    #[derive(ReadCbor, WriteCbor, PartialEq, Debug, Default)]
    struct X {
        #[cbor(rename = "X")]
        x: String,
        #[cbor(keyasint = 1)]
        y: u64,
    }

    let bytes = to_vec_default(&X {
        x: "hi".into(),
        y: 7,
    });
    // {"X": "hi", 1: 7}
    assert_eq!(bytes.as_slice(), b("a2 61 58 62 68 69 01 07"));
    let x: X = from_slice(&bytes, &DecOptions::default()).unwrap();
    assert_eq!(
        x,
        X {
            x: "hi".into(),
            y: 7
        }
    );
}

#[test]
fn skip_and_omitempty() {
    #[derive(ReadCbor, WriteCbor, PartialEq, Debug, Default)]
    struct X {
        a: u64,
        #[cbor(skip)]
        b: u64,
        #[cbor(omitempty)]
        c: String,
    }

    let bytes = to_vec_default(&X {
        a: 1,
        b: 99,
        c: String::new(),
    });
    // "b" never appears, "c" is omitted because it's empty
    assert_eq!(bytes.as_slice(), b("a1 61 61 01"));
    let x: X = from_slice(&bytes, &DecOptions::default()).unwrap();
    assert_eq!(
        x,
        X {
            a: 1,
            b: 0,
            c: String::new()
        }
    );

    let bytes = to_vec_default(&X {
        a: 1,
        b: 99,
        c: "hi".into(),
    });
    assert_eq!(bytes.as_slice(), b("a2 61 61 01 61 63 62 68 69"));
}

#[test]
fn flatten() {
    #[derive(ReadCbor, WriteCbor, PartialEq, Debug, Default)]
    struct Inner {
        a: u64,
        b: u64,
    }

    #[derive(ReadCbor, WriteCbor, PartialEq, Debug, Default)]
    struct Outer {
        #[cbor(flatten)]
        inner: Inner,
        c: u64,
    }

    // the flattened fields sort after `c`: StructDescriptor::build groups by
    // key-first-seen order, then stable-sorts by depth, and `c` (depth 0)
    // is seen after `inner`'s fields (depth 1) but sorts before them
    let bytes = to_vec_default(&Outer {
        inner: Inner { a: 1, b: 2 },
        c: 3,
    });
    assert_eq!(bytes.as_slice(), b("a3 61 63 03 61 61 01 61 62 02"));
    let x: Outer = from_slice(&bytes, &DecOptions::default()).unwrap();
    assert_eq!(
        x,
        Outer {
            inner: Inner { a: 1, b: 2 },
            c: 3
        }
    );
}

#[test]
fn tuple_struct() {
    #[derive(Debug, PartialEq, WriteCbor, ReadCbor)]
    struct X(u64, String);

    let s = "str".to_string();
    let bytes = to_vec_default(&X(42, s.clone()));
    assert_eq!(bytes.as_slice(), b("82 18 2a 63 73 74 72"));
    let x: X = from_slice(&bytes, &DecOptions::default()).unwrap();
    assert_eq!(x, X(42, s));
}

#[test]
fn single_struct() {
    #[derive(Debug, PartialEq, WriteCbor, ReadCbor)]
    struct X(u64);

    assert_eq!(to_vec_default(&X(3)).as_slice(), b("81 03"));
    let x: X = from_slice(&b("81 03"), &DecOptions::default()).unwrap();
    assert_eq!(x, X(3));

    #[derive(Debug, PartialEq, WriteCbor, ReadCbor)]
    #[cbor(transparent)]
    struct Y(u64);

    assert_eq!(to_vec_default(&Y(3)).as_slice(), b("03"));
    let y: Y = from_slice(&b("03"), &DecOptions::default()).unwrap();
    assert_eq!(y, Y(3));
}

#[test]
fn toarray() {
    #[derive(Debug, PartialEq, WriteCbor, ReadCbor, Default)]
    #[cbor(toarray)]
    struct X {
        a: u64,
        b: String,
    }

    let bytes = to_vec_default(&X {
        a: 1,
        b: "hi".into(),
    });
    assert_eq!(bytes.as_slice(), b("82 01 62 68 69"));
    let x: X = from_slice(&bytes, &DecOptions::default()).unwrap();
    assert_eq!(
        x,
        X {
            a: 1,
            b: "hi".into()
        }
    );
}

#[test]
fn enums() {
    #[derive(Debug, PartialEq, WriteCbor, ReadCbor)]
    enum X {
        Unit,
        One(u64),
        #[cbor(transparent)]
        OnePrime(u64),
        Two(u64, u64),
        Rec { a: u64, b: u64 },
    }

    let bytes = to_vec_default(&X::Unit);
    assert_eq!(bytes.as_slice(), b("a1 64 55 6e 69 74 f6"));
    let x: X = from_slice(&bytes, &DecOptions::default()).unwrap();
    assert_eq!(x, X::Unit);

    let bytes = to_vec_default(&X::One(1));
    assert_eq!(bytes.as_slice(), b("a1 63 4f 6e 65 81 01"));
    let x: X = from_slice(&bytes, &DecOptions::default()).unwrap();
    assert_eq!(x, X::One(1));

    let bytes = to_vec_default(&X::OnePrime(2));
    assert_eq!(bytes.as_slice(), b("a1 68 4f 6e 65 50 72 69 6d 65 02"));
    let x: X = from_slice(&bytes, &DecOptions::default()).unwrap();
    assert_eq!(x, X::OnePrime(2));

    let bytes = to_vec_default(&X::Two(3, 4));
    assert_eq!(bytes.as_slice(), b("a1 63 54 77 6f 82 03 04"));
    let x: X = from_slice(&bytes, &DecOptions::default()).unwrap();
    assert_eq!(x, X::Two(3, 4));

    let bytes = to_vec_default(&X::Rec { a: 5, b: 6 });
    assert_eq!(bytes.as_slice(), b("a1 63 52 65 63 a2 61 61 05 61 62 06"));
    let x: X = from_slice(&bytes, &DecOptions::default()).unwrap();
    assert_eq!(x, X::Rec { a: 5, b: 6 });

    let err = from_slice::<X>(&b("a1 67 55 6e 6b 6e 6f 77 6e f6"), &DecOptions::default())
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Custom(_)));
}
