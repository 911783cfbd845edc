use syn::{parse_macro_input, DeriveInput};

mod attrs;
mod read;
mod write;

/// `#[derive(WriteCbor)]`: generates a `WriteCbor` impl honoring
/// `#[cbor(rename = "..")]`, `#[cbor(keyasint = N)]`, `#[cbor(skip)]`
/// (or `#[cbor(rename = "-")]`), `#[cbor(omitempty)]`, `#[cbor(flatten)]`
/// on fields, and `#[cbor(toarray)]`/`#[cbor(transparent)]` on the
/// struct/enum itself.
#[proc_macro_derive(WriteCbor, attributes(cbor))]
pub fn derive_write_cbor(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match write::derive_write(&input) {
        Ok(code) => code.into(),
        Err(e) => e.into_compile_error().into(),
    }
}

/// `#[derive(ReadCbor)]`: the decode-side counterpart of `WriteCbor`,
/// supporting the same `#[cbor(..)]` grammar.
#[proc_macro_derive(ReadCbor, attributes(cbor))]
pub fn derive_read_cbor(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match read::derive_read(&input) {
        Ok(code) => code.into(),
        Err(e) => e.into_compile_error().into(),
    }
}
