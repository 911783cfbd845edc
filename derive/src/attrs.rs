use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Lit, Meta, NestedMeta};

/// Parsed `#[cbor(..)]` attributes on one struct/enum field.
#[derive(Default, Clone)]
pub struct FieldAttr {
    pub rename: Option<String>,
    pub keyasint: Option<i64>,
    pub skip: bool,
    pub omitempty: bool,
    pub flatten: bool,
    pub transparent: bool,
}

/// Parsed `#[cbor(..)]` attributes on a struct/enum item itself.
#[derive(Default, Clone)]
pub struct ContainerAttr {
    pub to_array: bool,
    pub transparent: bool,
}

fn cbor_metas(attrs: &[Attribute]) -> Vec<NestedMeta> {
    attrs
        .iter()
        .filter_map(|a| match a.parse_meta() {
            Ok(Meta::List(l)) if l.path.is_ident("cbor") => Some(l.nested.into_iter()),
            _ => None,
        })
        .flatten()
        .collect()
}

pub fn field_attr(attrs: &[Attribute]) -> FieldAttr {
    let mut out = FieldAttr::default();
    for meta in cbor_metas(attrs) {
        match meta {
            NestedMeta::Meta(Meta::Path(p)) if p.is_ident("skip") => out.skip = true,
            NestedMeta::Meta(Meta::Path(p)) if p.is_ident("omitempty") => out.omitempty = true,
            NestedMeta::Meta(Meta::Path(p)) if p.is_ident("flatten") => out.flatten = true,
            NestedMeta::Meta(Meta::Path(p)) if p.is_ident("transparent") => out.transparent = true,
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("rename") => {
                if let Lit::Str(s) = nv.lit {
                    if s.value() == "-" {
                        out.skip = true;
                    } else {
                        out.rename = Some(s.value());
                    }
                }
            }
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("keyasint") => {
                if let Lit::Int(n) = nv.lit {
                    out.keyasint = n.base10_parse::<i64>().ok();
                }
            }
            _ => {}
        }
    }
    out
}

/// The on-wire key an attribute set resolves to, as a `FieldKey` constructor
/// expression, plus whether that key was explicitly chosen (drives §4.5
/// dominance over a same-depth, same-key plain field).
pub fn field_key(attr: &FieldAttr, rust_name: &str) -> (TokenStream, bool) {
    if let Some(n) = attr.keyasint {
        (
            quote! { ::cbor_codec::descriptor::FieldKey::Int(#n) },
            true,
        )
    } else if let Some(name) = &attr.rename {
        (
            quote! { ::cbor_codec::descriptor::FieldKey::Name(#name) },
            true,
        )
    } else {
        (
            quote! { ::cbor_codec::descriptor::FieldKey::Name(#rust_name) },
            false,
        )
    }
}

pub fn container_attr(attrs: &[Attribute]) -> ContainerAttr {
    let mut out = ContainerAttr::default();
    for meta in cbor_metas(attrs) {
        match meta {
            NestedMeta::Meta(Meta::Path(p)) if p.is_ident("toarray") => out.to_array = true,
            NestedMeta::Meta(Meta::Path(p)) if p.is_ident("transparent") => out.transparent = true,
            _ => {}
        }
    }
    out
}
