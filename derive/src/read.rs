use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{DeriveInput, Fields};

use crate::attrs::{container_attr, field_attr, field_key, ContainerAttr};

pub fn derive_read(input: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;
    let (g_impl, g_type, g_where) = input.generics.split_for_impl();
    let container = container_attr(&input.attrs);

    let (trait_body, extra_methods, helpers) = match &input.data {
        syn::Data::Struct(s) => struct_read(name, &input.generics, &s.fields, &container)?,
        syn::Data::Enum(e) => (enum_read(name, e)?, TokenStream::new(), TokenStream::new()),
        syn::Data::Union(u) => {
            return Err(syn::Error::new_spanned(
                u.union_token,
                "ReadCbor cannot be derived for unions",
            ))
        }
    };

    Ok(quote! {
        impl #g_impl ::cbor_codec::decode::ReadCbor for #name #g_type #g_where {
            fn read_cbor<'a>(
                bytes: &'a [u8],
                ctx: &mut ::cbor_codec::decode::DecCtx,
            ) -> Result<(Self, &'a [u8]), ::cbor_codec::error::InternalError<'a>> {
                #trait_body
            }
            #extra_methods
        }
        #helpers
    })
}

fn struct_read(
    name: &syn::Ident,
    generics: &syn::Generics,
    fields: &Fields,
    container: &ContainerAttr,
) -> syn::Result<(TokenStream, TokenStream, TokenStream)> {
    if container.transparent {
        return Ok((transparent_read(fields)?, TokenStream::new(), TokenStream::new()));
    }
    match fields {
        Fields::Named(f) if container.to_array => {
            Ok((array_read_named(f)?, TokenStream::new(), TokenStream::new()))
        }
        Fields::Named(f) => dict_read_named(name, generics, f),
        Fields::Unnamed(f) => Ok((array_read_unnamed(f)?, TokenStream::new(), TokenStream::new())),
        Fields::Unit => Ok((
            quote! {
                let (v, rest) = ::cbor_codec::Value::read_cbor(bytes, ctx)?;
                if !v.is_null_or_undefined() {
                    return Err(::cbor_codec::error::InternalError::new(bytes, ::cbor_codec::ErrorKind::UnmarshalType {
                        value: ::cbor_codec::ValueKind::Primitive,
                        target_type: ::std::any::type_name::<Self>(),
                        strct: None,
                        field: None,
                    }));
                }
                Ok((Self, rest))
            },
            TokenStream::new(),
            TokenStream::new(),
        )),
    }
}

fn transparent_read(fields: &Fields) -> syn::Result<TokenStream> {
    match fields {
        Fields::Unnamed(f) if f.unnamed.len() == 1 => {
            let ty = &f.unnamed.first().unwrap().ty;
            Ok(quote! {
                let (v, rest) = <#ty as ::cbor_codec::decode::ReadCbor>::read_cbor(bytes, ctx)?;
                Ok((Self(v), rest))
            })
        }
        Fields::Named(f) if f.named.len() == 1 => {
            let field = f.named.first().unwrap();
            let ident = field.ident.as_ref().unwrap();
            let ty = &field.ty;
            Ok(quote! {
                let (v, rest) = <#ty as ::cbor_codec::decode::ReadCbor>::read_cbor(bytes, ctx)?;
                Ok((Self { #ident: v }, rest))
            })
        }
        _ => Err(syn::Error::new_spanned(
            fields,
            "#[cbor(transparent)] requires exactly one field",
        )),
    }
}

/// Named-field dict decoding. Always generates `__cbor_read_from_entries`
/// (fresh construction) and `__cbor_merge_from_entries` (in-place merge)
/// helpers, not just when this struct itself uses `#[cbor(flatten)]`, so a
/// sibling struct that flattens *this* one has something to call.
fn dict_read_named(
    name: &syn::Ident,
    generics: &syn::Generics,
    fields: &syn::FieldsNamed,
) -> syn::Result<(TokenStream, TokenStream, TokenStream)> {
    let (g_impl, g_type, g_where) = generics.split_for_impl();
    let strct_name = name.to_string();

    let mut field_inits = Vec::new();
    let mut merge_stmts = Vec::new();
    for f in &fields.named {
        let ident = f.ident.as_ref().unwrap();
        let rust_name = ident.to_string();
        let attr = field_attr(&f.attrs);
        let ty = &f.ty;

        if attr.skip {
            field_inits.push(quote! { #ident: <#ty as ::std::default::Default>::default() });
            continue;
        }
        if attr.flatten {
            field_inits.push(quote! {
                #ident: <#ty>::__cbor_read_from_entries(entries, ctx)?
            });
            merge_stmts.push(quote! {
                self.#ident.__cbor_merge_from_entries(entries, ctx)?;
            });
            continue;
        }

        let lookup = if let Some(n) = attr.keyasint {
            quote! { entries.iter().find(|e| e.key.matches_int(#n)).map(|e| e.value) }
        } else if let Some(rename) = &attr.rename {
            quote! {
                entries.iter().find(|e| e.key.matches_name(#rename)).map(|e| e.value)
                    .or_else(|| entries.iter().find(|e| e.key.matches_name_ci(#rename)).map(|e| e.value))
            }
        } else {
            quote! {
                entries.iter().find(|e| e.key.matches_name(#rust_name)).map(|e| e.value)
                    .or_else(|| entries.iter().find(|e| e.key.matches_name_ci(#rust_name)).map(|e| e.value))
            }
        };

        field_inits.push(quote! {
            #ident: match #lookup {
                Some(__b) => ::cbor_codec::decode::read_field::<#ty>(__b, ctx, #strct_name, #rust_name)?,
                None => <#ty as ::std::default::Default>::default(),
            }
        });
        // Merge semantics (§4.3): a present key overwrites the field in
        // place; a key absent from the map leaves the existing value alone.
        // This is what makes `unmarshal_into` on a partially-failed decode
        // retain the fields it already got to, rather than discarding them.
        merge_stmts.push(quote! {
            if let Some(__b) = #lookup {
                self.#ident = ::cbor_codec::decode::read_field::<#ty>(__b, ctx, #strct_name, #rust_name)?;
            }
        });
    }

    let trait_body = quote! {
        let (entries, rest) = ::cbor_codec::decode::read_raw_map_entries(bytes, ctx)?;
        let value = Self::__cbor_read_from_entries(&entries, ctx)?;
        Ok((value, rest))
    };

    let extra_methods = quote! {
        fn read_cbor_into<'a>(
            &mut self,
            bytes: &'a [u8],
            ctx: &mut ::cbor_codec::decode::DecCtx,
        ) -> Result<&'a [u8], ::cbor_codec::error::InternalError<'a>> {
            // null/undefined leaves an existing target untouched, same as any
            // other non-container merge target (§4.3); this struct has no
            // `Default` bound available to erase it to here.
            if ::cbor_codec::decode::is_null_or_undefined(bytes)? {
                let (_, rest) = ::cbor_codec::Value::read_cbor(bytes, ctx)?;
                return Ok(rest);
            }
            let (entries, rest) = ::cbor_codec::decode::read_raw_map_entries(bytes, ctx)?;
            self.__cbor_merge_from_entries(&entries, ctx)?;
            Ok(rest)
        }
    };

    let helpers = quote! {
        impl #g_impl #name #g_type #g_where {
            pub fn __cbor_read_from_entries<'a>(
                entries: &[::cbor_codec::decode::RawEntry<'a>],
                ctx: &mut ::cbor_codec::decode::DecCtx,
            ) -> Result<Self, ::cbor_codec::error::InternalError<'a>> {
                Ok(Self {
                    #(#field_inits),*
                })
            }

            pub fn __cbor_merge_from_entries<'a>(
                &mut self,
                entries: &[::cbor_codec::decode::RawEntry<'a>],
                ctx: &mut ::cbor_codec::decode::DecCtx,
            ) -> Result<(), ::cbor_codec::error::InternalError<'a>> {
                #(#merge_stmts)*
                Ok(())
            }
        }
    };

    Ok((trait_body, extra_methods, helpers))
}

fn array_read_named(fields: &syn::FieldsNamed) -> syn::Result<TokenStream> {
    let idents: Vec<_> = fields.named.iter().map(|f| f.ident.clone().unwrap()).collect();
    let mut reads = Vec::new();
    for f in &fields.named {
        let ident = f.ident.as_ref().unwrap();
        let ty = &f.ty;
        if field_attr(&f.attrs).skip {
            reads.push(quote! { let #ident: #ty = <#ty as ::std::default::Default>::default(); });
        } else {
            reads.push(quote! { let (#ident, bytes): (#ty, _) = ::cbor_codec::decode::ReadCbor::read_cbor(bytes, ctx)?; });
        }
    }
    Ok(quote! {
        #(#reads)*
        Ok((Self { #(#idents),* }, bytes))
    })
}

fn array_read_unnamed(fields: &syn::FieldsUnnamed) -> syn::Result<TokenStream> {
    let binders: Vec<_> = (0..fields.unnamed.len()).map(|i| format_ident!("__f{}", i)).collect();
    let tys: Vec<_> = fields.unnamed.iter().map(|f| f.ty.clone()).collect();
    Ok(quote! {
        #(let (#binders, bytes): (#tys, _) = ::cbor_codec::decode::ReadCbor::read_cbor(bytes, ctx)?;)*
        Ok((Self(#(#binders),*), bytes))
    })
}

fn enum_read(name: &syn::Ident, data: &syn::DataEnum) -> syn::Result<TokenStream> {
    if data.variants.is_empty() {
        return Err(syn::Error::new_spanned(
            name,
            "ReadCbor cannot be derived for an enum with no variants",
        ));
    }
    let strct_name = name.to_string();
    let mut arms = Vec::new();
    let mut known = Vec::new();
    for v in &data.variants {
        let vname = &v.ident;
        let key = v.ident.to_string();
        known.push(key.clone());
        let attr = field_attr(&v.attrs);
        let ctor = match &v.fields {
            Fields::Unit => quote! {
                let (_v, _rest) = ::cbor_codec::Value::read_cbor(__payload, ctx)?;
                Ok(Self::#vname)
            },
            Fields::Unnamed(f) if attr.transparent && f.unnamed.len() == 1 => {
                let ty = &f.unnamed.first().unwrap().ty;
                quote! {
                    let (__x, _rest) = <#ty as ::cbor_codec::decode::ReadCbor>::read_cbor(__payload, ctx)?;
                    Ok(Self::#vname(__x))
                }
            }
            Fields::Unnamed(f) => {
                let binders: Vec<_> = (0..f.unnamed.len()).map(|i| format_ident!("__f{}", i)).collect();
                let tys: Vec<_> = f.unnamed.iter().map(|f| f.ty.clone()).collect();
                quote! {
                    let __rest = __payload;
                    #(let (#binders, __rest): (#tys, _) = ::cbor_codec::decode::ReadCbor::read_cbor(__rest, ctx)?;)*
                    let _ = __rest;
                    Ok(Self::#vname(#(#binders),*))
                }
            }
            Fields::Named(f) => {
                let idents: Vec<_> = f.named.iter().map(|f| f.ident.clone().unwrap()).collect();
                let names: Vec<String> = idents.iter().map(|i| i.to_string()).collect();
                let tys: Vec<_> = f.named.iter().map(|f| f.ty.clone()).collect();
                quote! {
                    let (entries, _rest) = ::cbor_codec::decode::read_raw_map_entries(__payload, ctx)?;
                    #(
                        let #idents: #tys = match entries.iter().find(|e| e.key.matches_name(#names)).map(|e| e.value) {
                            Some(__b) => ::cbor_codec::decode::read_field(__b, ctx, #strct_name, #names)?,
                            None => ::std::default::Default::default(),
                        };
                    )*
                    Ok(Self::#vname { #(#idents),* })
                }
            }
        };
        arms.push(quote! {
            if __key.matches_name(#key) {
                #ctor
            } else
        });
    }
    Ok(quote! {
        let (entries, rest) = ::cbor_codec::decode::read_raw_map_entries(bytes, ctx)?;
        if entries.len() != 1 {
            return Err(::cbor_codec::error::InternalError::new(bytes, ::cbor_codec::ErrorKind::UnmarshalType {
                value: ::cbor_codec::ValueKind::Map,
                target_type: ::std::any::type_name::<Self>(),
                strct: None,
                field: None,
            }));
        }
        let __entry = &entries[0];
        let __key = __entry.key;
        let __payload = __entry.value;
        let value = #(#arms)* {
            return Err(::cbor_codec::error::InternalError::new(bytes, ::cbor_codec::ErrorKind::Custom(
                format!("unknown variant for {}: known variants are {:?}", #strct_name, [#(#known),*])
            )));
        }?;
        Ok((value, rest))
    })
}
