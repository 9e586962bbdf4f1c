//! The marshaller (spec.md §4.2): converts a guest-side value description
//! into the wire-level `MarshalledValue`, in shape-discriminator order, with
//! cycle detection via transient per-pass identity (spec.md §9 "Cyclic
//! guest graphs").
//!
//! `isolate-engine` is the only crate that ever inspects a real V8 handle;
//! it builds a `GuestValue` tree by walking that handle and hands it here.
//! Keeping the discriminator logic independent of any V8 type is what makes
//! it unit-testable without an embedded engine.

use std::collections::BTreeMap;
use std::rc::Rc;

use isolate_protocol::value::ClassTag;
use isolate_protocol::MarshalledValue;

use crate::error_bridge::{type_error, BridgeError};

/// A guest-side value as the engine layer observes it, ordered the same way
/// as the shape discriminator in spec.md §4.2's docstring.
#[derive(Debug, Clone)]
pub enum GuestValue {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    BigInt(String),
    String(String),
    Bytes { bytes: Vec<u8>, offset: usize, length: usize },
    /// A recognised class-backed object, identified by the guest-side
    /// object's transient identity (used only for cycle detection within
    /// this marshal pass) plus the stable host instance id once assigned.
    ClassInstance {
        transient_id: usize,
        class_name: ClassTag,
        instance_id: u64,
    },
    Sequence(Vec<Rc<GuestValue>>),
    /// A plain record; values here are pre-inspection and may still carry
    /// internal marker keys, which `marshal` strips.
    Record(Vec<(String, Rc<GuestValue>)>),
}

/// Per-pass state: maps a guest value's transient identity (e.g. its V8
/// object pointer) to the back-reference id already emitted for it, so a
/// second encounter in the same pass becomes a `BackRef` instead of an
/// infinite recursion.
#[derive(Debug, Default)]
pub struct MarshalPass {
    seen: BTreeMap<usize, u64>,
    next_back_ref: u64,
}

impl MarshalPass {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Applies the shape discriminator from spec.md §4.2 to convert one guest
/// value into its wire representation.
pub fn marshal(pass: &mut MarshalPass, value: &GuestValue) -> Result<MarshalledValue, BridgeError> {
    match value {
        GuestValue::Null => Ok(MarshalledValue::Null),
        GuestValue::Undefined => Ok(MarshalledValue::Undefined),
        GuestValue::Bool(b) => Ok(MarshalledValue::Bool(*b)),
        GuestValue::Number(n) => Ok(MarshalledValue::Number(*n)),
        GuestValue::BigInt(s) => Ok(MarshalledValue::BigInt(s.clone())),
        GuestValue::String(s) => Ok(MarshalledValue::String(s.clone())),
        GuestValue::Bytes { bytes, offset, length } => Ok(MarshalledValue::Bytes {
            bytes: bytes.clone(),
            offset: *offset,
            length: *length,
        }),
        GuestValue::ClassInstance {
            transient_id,
            class_name,
            instance_id,
        } => {
            if let Some(&back_ref) = pass.seen.get(transient_id) {
                return Ok(MarshalledValue::BackRef(back_ref));
            }
            pass.next_back_ref += 1;
            pass.seen.insert(*transient_id, pass.next_back_ref);
            Ok(MarshalledValue::ClassRef {
                instance_id: *instance_id,
                class_name: *class_name,
            })
        }
        GuestValue::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(marshal(pass, item)?);
            }
            Ok(MarshalledValue::Sequence(out))
        }
        GuestValue::Record(fields) => {
            let mut out = BTreeMap::new();
            for (key, value) in fields {
                // Forbidden leaks: internal marker keys never survive
                // plain-record marshalling (spec.md §4.2).
                if isolate_protocol::value::is_internal_marker(key) {
                    continue;
                }
                out.insert(key.clone(), marshal(pass, value)?);
            }
            Ok(MarshalledValue::record(out))
        }
    }
}

/// Recognises and type-checks an integer typed array view for
/// `getRandomValues` (spec.md §4.3 "type-checks integer typed arrays").
pub fn expect_integer_typed_array(value: &GuestValue) -> Result<(usize, usize), BridgeError> {
    match value {
        GuestValue::Bytes { offset, length, .. } => Ok((*offset, *length)),
        _ => Err(type_error("expected an integer typed array view")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_marshal_to_matching_wire_variants() {
        let mut pass = MarshalPass::new();
        assert_eq!(marshal(&mut pass, &GuestValue::Null).unwrap(), MarshalledValue::Null);
        assert_eq!(
            marshal(&mut pass, &GuestValue::Number(1.5)).unwrap(),
            MarshalledValue::Number(1.5)
        );
        assert_eq!(
            marshal(&mut pass, &GuestValue::String("hi".to_owned())).unwrap(),
            MarshalledValue::String("hi".to_owned())
        );
    }

    #[test]
    fn record_marshalling_strips_internal_markers() {
        let mut pass = MarshalPass::new();
        let record = GuestValue::Record(vec![
            ("content-type".to_owned(), Rc::new(GuestValue::String("text/plain".to_owned()))),
            ("__instanceId__".to_owned(), Rc::new(GuestValue::Number(1.0))),
        ]);
        let MarshalledValue::Record(fields) = marshal(&mut pass, &record).unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(fields.len(), 1);
        assert!(fields.contains_key("content-type"));
    }

    #[test]
    fn repeated_class_instance_in_one_pass_becomes_a_back_reference() {
        let mut pass = MarshalPass::new();
        let instance = Rc::new(GuestValue::ClassInstance {
            transient_id: 42,
            class_name: ClassTag::Headers,
            instance_id: 7,
        });
        let cyclic = GuestValue::Sequence(vec![instance.clone(), instance]);

        let MarshalledValue::Sequence(items) = marshal(&mut pass, &cyclic).unwrap() else {
            panic!("expected a sequence");
        };
        assert!(matches!(items[0], MarshalledValue::ClassRef { .. }));
        assert!(matches!(items[1], MarshalledValue::BackRef(_)));
    }

    #[test]
    fn non_binary_view_is_rejected_for_get_random_values() {
        let result = expect_integer_typed_array(&GuestValue::String("nope".to_owned()));
        assert!(result.is_err());
    }
}
