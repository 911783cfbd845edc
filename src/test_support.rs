//! Hex-literal helper shared by unit tests across modules, avoiding a
//! dependency on an external hex crate for test-only scaffolding.
#![cfg(test)]

pub(crate) fn hex(s: &str) -> Vec<u8> {
    assert_eq!(s.len() % 2, 0, "odd-length hex string");
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).expect("invalid hex digit"))
        .collect()
}
