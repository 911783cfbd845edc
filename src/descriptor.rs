//! Type-Descriptor Cache (component E): per-type struct-field metadata used
//! by the derive macros' generated `WriteCbor`/`ReadCbor` impls, with the
//! §4.5 anonymous-embedding dominance rules resolved once and cached.
//!
//! Rust has no field-embedding language feature, so "anonymous embedding" is
//! expressed here as a `#[cbor(flatten)]` field whose own `StructDescriptor`
//! is spliced into the parent's field list at macro-generated-code runtime,
//! the first time the parent type is encoded or decoded.

/// The on-wire key a struct field is written/read under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey {
    Name(&'static str),
    Int(i64),
}

/// One field as declared in source, before dominance resolution. Emitted
/// by the derive macro for every field, including flattened ones (whose
/// `flatten` points at the nested type's own descriptor function).
#[derive(Clone, Copy)]
pub struct FieldSpec {
    pub rust_name: &'static str,
    pub key: FieldKey,
    /// Was the key explicitly renamed (`#[cbor(rename = ..)]`/`#[cbor(keyasint = ..)]`)
    /// rather than defaulted from the Rust field name? Explicit keys dominate
    /// same-depth, same-key plain fields (§4.5).
    pub explicit: bool,
    pub omit_empty: bool,
    pub skip: bool,
    pub flatten: Option<fn() -> &'static StructDescriptor>,
}

/// A field after dominance resolution: always a leaf (never itself flattened).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedField {
    pub rust_name: &'static str,
    pub key: FieldKey,
    pub omit_empty: bool,
    /// Path of flatten hops from the struct root to this field, outermost first.
    /// Empty for a direct field.
    pub depth: usize,
}

/// Resolved, cached metadata for one struct-shaped type.
#[derive(Debug, Clone)]
pub struct StructDescriptor {
    pub fields: Vec<ResolvedField>,
    pub to_array: bool,
}

impl StructDescriptor {
    /// Resolves the dominance rules of §4.5 over the raw field specs
    /// declared on a type (including nested specs reachable through
    /// `#[cbor(flatten)]` fields).
    pub fn build(specs: &[FieldSpec], to_array: bool) -> Self {
        let mut candidates = Vec::new();
        collect(specs, 0, &mut candidates);

        // Group by wire key; within a group, keep the shallowest depth.
        // Same-depth collisions are suppressed entirely unless exactly one
        // candidate at that depth is explicit (explicit dominates implicit).
        let mut by_key: Vec<(FieldKey, Vec<Candidate>)> = Vec::new();
        for c in candidates {
            if let Some(entry) = by_key.iter_mut().find(|(k, _)| *k == c.key) {
                entry.1.push(c);
            } else {
                by_key.push((c.key, vec![c]));
            }
        }

        let mut fields = Vec::new();
        for (key, mut cands) in by_key {
            cands.sort_by_key(|c| c.depth);
            let min_depth = cands[0].depth;
            let mut at_min: Vec<_> = cands.iter().filter(|c| c.depth == min_depth).collect();
            let winner = if at_min.len() == 1 {
                Some(at_min.remove(0))
            } else {
                let explicit: Vec<_> = at_min.iter().filter(|c| c.explicit).collect();
                if explicit.len() == 1 {
                    Some(*explicit[0])
                } else {
                    None // same-depth collision with no single explicit winner: field disappears
                }
            };
            if let Some(w) = winner {
                fields.push(ResolvedField {
                    rust_name: w.rust_name,
                    key,
                    omit_empty: w.omit_empty,
                    depth: w.depth,
                });
            }
        }

        fields.sort_by_key(|f| f.depth);
        StructDescriptor { fields, to_array }
    }
}

#[derive(Clone, Copy)]
struct Candidate {
    rust_name: &'static str,
    key: FieldKey,
    explicit: bool,
    omit_empty: bool,
    depth: usize,
}

impl PartialEq for FieldKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldKey::Name(a), FieldKey::Name(b)) => a == b,
            (FieldKey::Int(a), FieldKey::Int(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for FieldKey {}

fn collect(specs: &[FieldSpec], depth: usize, out: &mut Vec<Candidate>) {
    for spec in specs {
        if spec.skip {
            continue;
        }
        if let Some(nested) = spec.flatten {
            let nested_desc = nested();
            for f in &nested_desc.fields {
                out.push(Candidate {
                    rust_name: f.rust_name,
                    key: f.key,
                    explicit: false,
                    omit_empty: f.omit_empty,
                    depth: depth + 1 + f.depth,
                });
            }
        } else {
            out.push(Candidate {
                rust_name: spec.rust_name,
                key: spec.key,
                explicit: spec.explicit,
                omit_empty: spec.omit_empty,
                depth,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &'static str, explicit: bool) -> FieldSpec {
        FieldSpec {
            rust_name: name,
            key: FieldKey::Name(name),
            explicit,
            omit_empty: false,
            skip: false,
            flatten: None,
        }
    }

    #[test]
    fn plain_fields_pass_through() {
        let d = StructDescriptor::build(&[spec("a", false), spec("b", false)], false);
        assert_eq!(d.fields.len(), 2);
    }

    #[test]
    fn same_depth_collision_suppresses_both_unless_one_explicit() {
        let specs = [spec("a", false), spec("a", false)];
        let d = StructDescriptor::build(&specs, false);
        assert!(d.fields.is_empty());

        let specs = [spec("a", false), spec("a", true)];
        let d = StructDescriptor::build(&specs, false);
        assert_eq!(d.fields.len(), 1);
        assert!(d.fields[0].rust_name == "a");
    }

    #[test]
    fn shallower_field_wins_over_deeper_flattened_duplicate() {
        fn nested() -> &'static StructDescriptor {
            use std::sync::OnceLock;
            static CACHE: OnceLock<StructDescriptor> = OnceLock::new();
            CACHE.get_or_init(|| StructDescriptor::build(&[spec("a", false)], false))
        }
        let specs = [
            spec("a", false),
            FieldSpec {
                rust_name: "inner",
                key: FieldKey::Name("inner"),
                explicit: false,
                omit_empty: false,
                skip: false,
                flatten: Some(nested),
            },
        ];
        let d = StructDescriptor::build(&specs, false);
        assert_eq!(d.fields.len(), 1);
        assert_eq!(d.fields[0].depth, 0);
    }
}
