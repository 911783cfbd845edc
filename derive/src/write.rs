use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{DeriveInput, Fields, Index};

use crate::attrs::{container_attr, field_attr, field_key, ContainerAttr};

/// Builds the `WriteCbor` impl plus (for a plain named-field struct) the
/// `__cbor_descriptor`/`__cbor_raw_entries` helpers a sibling struct's
/// `#[cbor(flatten)]` field needs to reach into this one.
pub fn derive_write(input: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;
    let (g_impl, g_type, g_where) = input.generics.split_for_impl();
    let container = container_attr(&input.attrs);

    let (trait_body, helpers) = match &input.data {
        syn::Data::Struct(s) => struct_write(name, &input.generics, &s.fields, &container)?,
        syn::Data::Enum(e) => (enum_write(name, e)?, TokenStream::new()),
        syn::Data::Union(u) => {
            return Err(syn::Error::new_spanned(
                u.union_token,
                "WriteCbor cannot be derived for unions",
            ))
        }
    };

    Ok(quote! {
        impl #g_impl ::cbor_codec::encode::WriteCbor for #name #g_type #g_where {
            fn write_cbor(&self, out: &mut Vec<u8>, opts: &::cbor_codec::encode::EncOptions) {
                #trait_body
            }
        }
        #helpers
    })
}

fn struct_write(
    name: &syn::Ident,
    generics: &syn::Generics,
    fields: &Fields,
    container: &ContainerAttr,
) -> syn::Result<(TokenStream, TokenStream)> {
    if container.transparent {
        return Ok((transparent_write(fields)?, TokenStream::new()));
    }
    match fields {
        Fields::Named(f) if container.to_array => Ok((array_write_named(f)?, TokenStream::new())),
        Fields::Named(f) => dict_write_named(name, generics, f),
        Fields::Unnamed(f) => Ok((array_write_unnamed(f)?, TokenStream::new())),
        Fields::Unit => Ok((
            quote! {
                ::cbor_codec::encode::write_info(out, ::cbor_codec::constants::MAJOR_LIT, ::cbor_codec::constants::LIT_NULL as u64);
            },
            TokenStream::new(),
        )),
    }
}

fn transparent_write(fields: &Fields) -> syn::Result<TokenStream> {
    match fields {
        Fields::Unnamed(f) if f.unnamed.len() == 1 => Ok(quote! { self.0.write_cbor(out, opts); }),
        Fields::Named(f) if f.named.len() == 1 => {
            let ident = f.named.first().unwrap().ident.as_ref().unwrap();
            Ok(quote! { self.#ident.write_cbor(out, opts); })
        }
        _ => Err(syn::Error::new_spanned(
            fields,
            "#[cbor(transparent)] requires exactly one field",
        )),
    }
}

/// Named-field dict encoding. When no field is `#[cbor(flatten)]`, this
/// writes a flat `Vec<(key, value)>` directly; flattening needs the merged,
/// dominance-resolved view from `__cbor_descriptor`/`__cbor_raw_entries`, so
/// those are emitted as a second impl block and the trait body calls them.
/// Always emits the `__cbor_descriptor`/`__cbor_raw_entries` helpers (not
/// only when this struct itself uses `#[cbor(flatten)]`): a sibling struct
/// flattening *this* one needs them to exist regardless.
fn dict_write_named(
    name: &syn::Ident,
    generics: &syn::Generics,
    fields: &syn::FieldsNamed,
) -> syn::Result<(TokenStream, TokenStream)> {
    let (g_impl, g_type, g_where) = generics.split_for_impl();
    let mut specs = Vec::new();
    let mut direct_entries = Vec::new();
    let mut flatten_entries = Vec::new();

    for f in &fields.named {
        let ident = f.ident.as_ref().unwrap();
        let rust_name = ident.to_string();
        let attr = field_attr(&f.attrs);
        if attr.skip {
            continue;
        }
        let (key_expr, explicit) = field_key(&attr, &rust_name);
        let omit_empty = attr.omitempty;

        if attr.flatten {
            let ty = &f.ty;
            specs.push(quote! {
                ::cbor_codec::descriptor::FieldSpec {
                    rust_name: #rust_name,
                    key: ::cbor_codec::descriptor::FieldKey::Name(#rust_name),
                    explicit: false,
                    omit_empty: false,
                    skip: false,
                    flatten: Some(<#ty>::__cbor_descriptor),
                }
            });
            flatten_entries.push(quote! {
                v.extend(self.#ident.__cbor_raw_entries(base_depth + 1, opts));
            });
        } else {
            specs.push(quote! {
                ::cbor_codec::descriptor::FieldSpec {
                    rust_name: #rust_name,
                    key: #key_expr,
                    explicit: #explicit,
                    omit_empty: #omit_empty,
                    skip: false,
                    flatten: None,
                }
            });
            direct_entries.push(quote! {
                if !(#omit_empty && ::cbor_codec::encode::CborEmpty::is_cbor_empty(&self.#ident)) {
                    let mut __v = Vec::new();
                    self.#ident.write_cbor(&mut __v, opts);
                    v.push(::cbor_codec::encode::RawFieldEntry {
                        key: #key_expr,
                        depth: base_depth,
                        value: __v,
                    });
                }
            });
        }
    }

    let trait_body = quote! {
        let raw = self.__cbor_raw_entries(0, opts);
        ::cbor_codec::encode::write_struct_entries(out, Self::__cbor_descriptor(), raw, opts);
    };
    let helpers = quote! {
        impl #g_impl #name #g_type #g_where {
            pub fn __cbor_descriptor() -> &'static ::cbor_codec::descriptor::StructDescriptor {
                static CACHE: ::std::sync::OnceLock<::cbor_codec::descriptor::StructDescriptor> =
                    ::std::sync::OnceLock::new();
                CACHE.get_or_init(|| {
                    let specs = [#(#specs),*];
                    ::cbor_codec::descriptor::StructDescriptor::build(&specs, false)
                })
            }

            pub fn __cbor_raw_entries(
                &self,
                base_depth: usize,
                opts: &::cbor_codec::encode::EncOptions,
            ) -> Vec<::cbor_codec::encode::RawFieldEntry> {
                let mut v = Vec::new();
                #(#direct_entries)*
                #(#flatten_entries)*
                v
            }
        }
    };
    Ok((trait_body, helpers))
}

fn array_write_named(fields: &syn::FieldsNamed) -> syn::Result<TokenStream> {
    let mut idents = Vec::new();
    for f in &fields.named {
        if field_attr(&f.attrs).skip {
            continue;
        }
        idents.push(f.ident.clone().unwrap());
    }
    let n = idents.len() as u64;
    Ok(quote! {
        ::cbor_codec::encode::write_info(out, ::cbor_codec::constants::MAJOR_ARRAY, #n);
        #(self.#idents.write_cbor(out, opts);)*
    })
}

fn array_write_unnamed(fields: &syn::FieldsUnnamed) -> syn::Result<TokenStream> {
    let indices: Vec<Index> = (0..fields.unnamed.len()).map(Index::from).collect();
    let n = indices.len() as u64;
    Ok(quote! {
        ::cbor_codec::encode::write_info(out, ::cbor_codec::constants::MAJOR_ARRAY, #n);
        #(self.#indices.write_cbor(out, opts);)*
    })
}

fn enum_write(name: &syn::Ident, data: &syn::DataEnum) -> syn::Result<TokenStream> {
    if data.variants.is_empty() {
        return Err(syn::Error::new_spanned(
            name,
            "WriteCbor cannot be derived for an enum with no variants",
        ));
    }
    let mut arms = Vec::new();
    for v in &data.variants {
        let vname = &v.ident;
        let key = v.ident.to_string();
        let attr = field_attr(&v.attrs);
        match &v.fields {
            Fields::Unit => {
                arms.push(quote! {
                    Self::#vname => {
                        let mut __v = Vec::new();
                        ::cbor_codec::encode::write_info(&mut __v, ::cbor_codec::constants::MAJOR_LIT, ::cbor_codec::constants::LIT_NULL as u64);
                        let mut __k = Vec::new();
                        ::cbor_codec::encode::write_str(&mut __k, #key);
                        ::cbor_codec::encode::write_map_entries(out, vec![(__k, __v)], opts);
                    }
                });
            }
            Fields::Unnamed(f) if attr.transparent && f.unnamed.len() == 1 => {
                arms.push(quote! {
                    Self::#vname(__x) => {
                        let mut __v = Vec::new();
                        __x.write_cbor(&mut __v, opts);
                        let mut __k = Vec::new();
                        ::cbor_codec::encode::write_str(&mut __k, #key);
                        ::cbor_codec::encode::write_map_entries(out, vec![(__k, __v)], opts);
                    }
                });
            }
            Fields::Unnamed(f) => {
                let binders: Vec<_> = (0..f.unnamed.len()).map(|i| format_ident!("__x{}", i)).collect();
                let n = binders.len() as u64;
                arms.push(quote! {
                    Self::#vname(#(#binders),*) => {
                        let mut __v = Vec::new();
                        ::cbor_codec::encode::write_info(&mut __v, ::cbor_codec::constants::MAJOR_ARRAY, #n);
                        #(#binders.write_cbor(&mut __v, opts);)*
                        let mut __k = Vec::new();
                        ::cbor_codec::encode::write_str(&mut __k, #key);
                        ::cbor_codec::encode::write_map_entries(out, vec![(__k, __v)], opts);
                    }
                });
            }
            Fields::Named(f) => {
                let idents: Vec<_> = f.named.iter().map(|f| f.ident.clone().unwrap()).collect();
                let names: Vec<String> = idents.iter().map(|i| i.to_string()).collect();
                arms.push(quote! {
                    Self::#vname { #(#idents),* } => {
                        let mut __entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
                        #(
                            let mut __k = Vec::new();
                            ::cbor_codec::encode::write_str(&mut __k, #names);
                            let mut __vv = Vec::new();
                            #idents.write_cbor(&mut __vv, opts);
                            __entries.push((__k, __vv));
                        )*
                        let mut __v = Vec::new();
                        ::cbor_codec::encode::write_map_entries(&mut __v, __entries, opts);
                        let mut __k = Vec::new();
                        ::cbor_codec::encode::write_str(&mut __k, #key);
                        ::cbor_codec::encode::write_map_entries(out, vec![(__k, __v)], opts);
                    }
                });
            }
        }
    }
    Ok(quote! {
        match self {
            #(#arms)*
        }
    })
}
