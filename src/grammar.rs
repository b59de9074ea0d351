// msnrtp - A client/server implementation of Microsoft's .NET Remoting wire format.
// Copyright (C) 2026  driedpampas@proton.me
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Grammar Engine: composes records into a valid
//! `remotingMessage = header *(referenceable) (call|return) *(referenceable)
//! end`, owning the Message Context for the lifetime of one message.
//!
//! Decoding is two passes. The first (this module, `decode_message`) is a
//! single streaming walk that resolves every `MemberReference` into either
//! an already-seen id or a `pending` placeholder, per MS-NRBF order. It
//! leaves every referenceable's member/element slots as a small
//! `MemberSlot` tree (`ResolvedNode`) keyed by object id rather than a fully
//! reconstructed object graph — forward references inside that tree are
//! still bare ids. The second pass (`crate::graph::reconstruct`) looks those
//! ids up in the now-complete map; by then every id has been seen, so the
//! lookup never fails for a well-formed message.

use crate::context::{ClassShape, MessageContext};
use crate::error::{Error, Result};
use crate::primitives::read_primitive_value;
use crate::records::*;
use crate::recordio::decode_record;
use std::collections::HashMap;
use std::io::Read;

/// One member or array-element slot, post per-slot decode.
#[derive(Debug, Clone)]
pub enum MemberSlot {
    Primitive(PrimitiveValue),
    Ref(i32),
    Null,
}

/// What a referenceable object id decoded to, with forward references left
/// as bare ids inside `MemberSlot::Ref`.
#[derive(Debug, Clone)]
pub enum ResolvedNode {
    StringValue(String),
    PrimitiveArray { primitive_type: PrimitiveType, values: Vec<PrimitiveValue> },
    ObjectArray(Vec<MemberSlot>),
    Class {
        library: Option<String>,
        class_name: String,
        member_names: Vec<String>,
        slots: Vec<MemberSlot>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Call,
    Return,
}

pub struct DecodedMessage {
    pub header: SerializationHeaderRecord,
    pub kind: MethodKind,
    pub flags: MessageFlags,
    pub method_name: Option<String>,
    pub type_name: Option<String>,
    /// Object id of the call array's single/positional payload slots, when
    /// an `*InArray` flag required one.
    pub payload_ids: Vec<MemberSlot>,
    pub context: MessageContext,
    pub resolved: HashMap<i32, ResolvedNode>,
}

impl DecodedMessage {
    pub fn resolve(&self, id: i32) -> Option<&ResolvedNode> {
        self.resolved.get(&id)
    }
}

/// Runs the full decode-side ABNF state machine over `r`.
pub fn decode_message<R: Read>(r: &mut R) -> Result<DecodedMessage> {
    let mut ctx = MessageContext::new();
    let mut resolved = HashMap::new();

    let header = match decode_record(r)?.ok_or(Error::TruncatedInput { offset: 0 })? {
        Record::SerializationHeader(h) => h,
        other => {
            return Err(Error::MalformedValue(format!(
                "expected SerializationHeader, got {:?}",
                other.tag()
            )));
        }
    };

    // Leading BinaryLibrary records attach to the following method record;
    // in this flat decode they simply populate the context as encountered.
    let mut next = decode_record(r)?.ok_or(Error::TruncatedInput { offset: 0 })?;
    loop {
        match next {
            Record::BinaryLibrary(lib) => {
                ctx.add_library(lib.library_id, lib.library_name);
                next = decode_record(r)?.ok_or(Error::TruncatedInput { offset: 0 })?;
            }
            _ => break,
        }
    }

    let (kind, flags, method_name, type_name, inline_args) = match next {
        Record::BinaryMethodCall(call) => (
            MethodKind::Call,
            call.flags,
            call.method_name.map(|v| as_string(&v.value)).transpose()?,
            call.type_name.map(|v| as_string(&v.value)).transpose()?,
            call.args,
        ),
        Record::BinaryMethodReturn(ret) => (
            MethodKind::Return,
            ret.flags,
            None,
            None,
            ret.args,
        ),
        other => {
            return Err(Error::MalformedValue(format!(
                "expected BinaryMethodCall/Return, got {:?}",
                other.tag()
            )));
        }
    };

    let mut payload_ids = Vec::new();
    if let Some(args) = inline_args {
        for v in args {
            payload_ids.push(MemberSlot::Primitive(v.value));
        }
    }

    if flags.args_in_array || flags.return_value_in_array || flags.context_in_array || flags.exception_in_array {
        let array = match decode_record(r)?.ok_or(Error::TruncatedInput { offset: 0 })? {
            Record::ArraySingleObject(a) => a,
            other => {
                return Err(Error::MalformedValue(format!(
                    "expected call array (ArraySingleObject), got {:?}",
                    other.tag()
                )));
            }
        };
        let slots = read_elements(r, &mut ctx, &mut resolved, array.length)?;
        ctx.add_refable(array.object_id, Record::ArraySingleObject(array));
        payload_ids = slots;
    }

    // Trailing referenceables: loop while pending references remain or the
    // next tag names a referenceable, draining each via `register_decoded`.
    loop {
        let record = decode_record(r)?.ok_or(Error::TruncatedInput { offset: 0 })?;
        if matches!(record, Record::MessageEnd) {
            break;
        }
        if let Record::BinaryLibrary(lib) = record {
            ctx.add_library(lib.library_id, lib.library_name);
            continue;
        }
        register_decoded(record, r, &mut ctx, &mut resolved)?;
    }

    ctx.finish()?;

    Ok(DecodedMessage {
        header,
        kind,
        flags,
        method_name,
        type_name,
        payload_ids,
        context: ctx,
        resolved,
    })
}

fn as_string(v: &PrimitiveValue) -> Result<String> {
    match v {
        PrimitiveValue::String(s) => Ok(s.clone()),
        other => Err(Error::TypeMismatch { member: format!("expected string, got {other:?}") }),
    }
}

/// Decodes one referenceable-or-reference-or-null slot: reads the next
/// record and dispatches. Used for class members whose declared binary type
/// is not `Primitive`.
fn decode_node<R: Read>(
    r: &mut R,
    ctx: &mut MessageContext,
    resolved: &mut HashMap<i32, ResolvedNode>,
) -> Result<MemberSlot> {
    let mut record = decode_record(r)?.ok_or(Error::TruncatedInput { offset: 0 })?;
    while let Record::BinaryLibrary(lib) = record {
        ctx.add_library(lib.library_id, lib.library_name);
        record = decode_record(r)?.ok_or(Error::TruncatedInput { offset: 0 })?;
    }
    match record {
        Record::MemberReference(m) => {
            ctx.add_reference(m.id_ref);
            Ok(MemberSlot::Ref(m.id_ref))
        }
        Record::ObjectNull => Ok(MemberSlot::Null),
        other => {
            let id = register_decoded(other, r, ctx, resolved)?;
            Ok(MemberSlot::Ref(id))
        }
    }
}

/// Finishes decoding a referenceable record whose header has already been
/// read (`record`), reading its trailing members/elements and registering
/// it in both the context and the resolved-node map. Returns its object id.
fn register_decoded<R: Read>(
    record: Record,
    r: &mut R,
    ctx: &mut MessageContext,
    resolved: &mut HashMap<i32, ResolvedNode>,
) -> Result<i32> {
    match record {
        Record::ClassWithId(rec) => {
            let shape = ctx.class_shape(rec.metadata_id)?.clone();
            let slots = read_member_slots(r, ctx, resolved, &shape.member_type_info)?;
            let library = shape_library_name(ctx, &shape)?;
            resolved.insert(
                rec.object_id,
                ResolvedNode::Class {
                    library,
                    class_name: shape.class_info.name.clone(),
                    member_names: shape.class_info.member_names.clone(),
                    slots,
                },
            );
            let object_id = rec.object_id;
            ctx.add_refable(object_id, Record::ClassWithId(rec));
            Ok(object_id)
        }
        Record::ClassWithMembersAndTypes(rec) => {
            let object_id = rec.class_info.object_id;
            ctx.register_class_shape(
                object_id,
                ClassShape {
                    class_info: rec.class_info.clone(),
                    member_type_info: rec.member_type_info.clone(),
                    library_id: Some(rec.library_id),
                },
            )?;
            let slots = read_member_slots(r, ctx, resolved, &rec.member_type_info)?;
            let library = Some(ctx.library_name(rec.library_id)?.to_string());
            resolved.insert(
                object_id,
                ResolvedNode::Class {
                    library,
                    class_name: rec.class_info.name.clone(),
                    member_names: rec.class_info.member_names.clone(),
                    slots,
                },
            );
            ctx.add_refable(object_id, Record::ClassWithMembersAndTypes(rec));
            Ok(object_id)
        }
        Record::SystemClassWithMembersAndTypes(rec) => {
            let object_id = rec.class_info.object_id;
            ctx.register_class_shape(
                object_id,
                ClassShape {
                    class_info: rec.class_info.clone(),
                    member_type_info: rec.member_type_info.clone(),
                    library_id: None,
                },
            )?;
            let slots = read_member_slots(r, ctx, resolved, &rec.member_type_info)?;
            resolved.insert(
                object_id,
                ResolvedNode::Class {
                    library: None,
                    class_name: rec.class_info.name.clone(),
                    member_names: rec.class_info.member_names.clone(),
                    slots,
                },
            );
            ctx.add_refable(object_id, Record::SystemClassWithMembersAndTypes(rec));
            Ok(object_id)
        }
        Record::ClassWithMembers(rec) => {
            // No declared MemberTypeInfo on the wire for this legacy record:
            // every member is read as a nested referenceable/reference/null.
            let object_id = rec.class_info.object_id;
            let mut slots = Vec::with_capacity(rec.class_info.member_names.len());
            for _ in &rec.class_info.member_names {
                slots.push(decode_node(r, ctx, resolved)?);
            }
            let library = Some(ctx.library_name(rec.library_id)?.to_string());
            resolved.insert(
                object_id,
                ResolvedNode::Class {
                    library,
                    class_name: rec.class_info.name.clone(),
                    member_names: rec.class_info.member_names.clone(),
                    slots,
                },
            );
            ctx.add_refable(object_id, Record::ClassWithMembers(rec));
            Ok(object_id)
        }
        Record::SystemClassWithMembers(rec) => {
            let object_id = rec.class_info.object_id;
            let mut slots = Vec::with_capacity(rec.class_info.member_names.len());
            for _ in &rec.class_info.member_names {
                slots.push(decode_node(r, ctx, resolved)?);
            }
            resolved.insert(
                object_id,
                ResolvedNode::Class {
                    library: None,
                    class_name: rec.class_info.name.clone(),
                    member_names: rec.class_info.member_names.clone(),
                    slots,
                },
            );
            ctx.add_refable(object_id, Record::SystemClassWithMembers(rec));
            Ok(object_id)
        }
        Record::BinaryObjectString(rec) => {
            let object_id = rec.object_id;
            resolved.insert(object_id, ResolvedNode::StringValue(rec.value.clone()));
            ctx.add_refable(object_id, Record::BinaryObjectString(rec));
            Ok(object_id)
        }
        Record::ArraySingleObject(rec) => {
            let object_id = rec.object_id;
            let slots = read_elements(r, ctx, resolved, rec.length)?;
            resolved.insert(object_id, ResolvedNode::ObjectArray(slots));
            ctx.add_refable(object_id, Record::ArraySingleObject(rec));
            Ok(object_id)
        }
        Record::ArraySingleString(rec) => {
            let object_id = rec.object_id;
            let slots = read_elements(r, ctx, resolved, rec.length)?;
            resolved.insert(object_id, ResolvedNode::ObjectArray(slots));
            ctx.add_refable(object_id, Record::ArraySingleString(rec));
            Ok(object_id)
        }
        Record::ArraySinglePrimitive(rec) => {
            let object_id = rec.object_id;
            let mut values = Vec::with_capacity(rec.length.max(0) as usize);
            for _ in 0..rec.length {
                values.push(read_primitive_value(r, rec.primitive_type_enum)?);
            }
            resolved.insert(
                object_id,
                ResolvedNode::PrimitiveArray { primitive_type: rec.primitive_type_enum, values },
            );
            ctx.add_refable(object_id, Record::ArraySinglePrimitive(rec));
            Ok(object_id)
        }
        Record::BinaryArray(rec) => {
            let object_id = rec.object_id;
            let total = rec.total_elements();
            if rec.type_enum == BinaryType::Primitive {
                let pt = match &rec.additional_type_info {
                    AdditionalTypeInfo::Primitive(pt) => *pt,
                    _ => {
                        return Err(Error::MalformedValue(
                            "BinaryArray declares Primitive type with no PrimitiveType".into(),
                        ));
                    }
                };
                let mut values = Vec::with_capacity(total.max(0) as usize);
                for _ in 0..total {
                    values.push(read_primitive_value(r, pt)?);
                }
                resolved.insert(object_id, ResolvedNode::PrimitiveArray { primitive_type: pt, values });
            } else {
                let slots = read_elements(r, ctx, resolved, total)?;
                resolved.insert(object_id, ResolvedNode::ObjectArray(slots));
            }
            ctx.add_refable(object_id, Record::BinaryArray(rec));
            Ok(object_id)
        }
        other => Err(Error::MalformedValue(format!(
            "{:?} is not a referenceable record",
            other.tag()
        ))),
    }
}

fn shape_library_name(ctx: &MessageContext, shape: &ClassShape) -> Result<Option<String>> {
    match shape.library_id {
        Some(id) => Ok(Some(ctx.library_name(id)?.to_string())),
        None => Ok(None),
    }
}

fn read_member_slots<R: Read>(
    r: &mut R,
    ctx: &mut MessageContext,
    resolved: &mut HashMap<i32, ResolvedNode>,
    mti: &MemberTypeInfo,
) -> Result<Vec<MemberSlot>> {
    let mut slots = Vec::with_capacity(mti.entries.len());
    for (bt, additional) in &mti.entries {
        let slot = match bt {
            BinaryType::Primitive => {
                let pt = match additional {
                    AdditionalTypeInfo::Primitive(pt) => *pt,
                    _ => return Err(Error::TypeMismatch { member: "primitive member missing PrimitiveType".into() }),
                };
                MemberSlot::Primitive(read_primitive_value(r, pt)?)
            }
            _ => decode_node(r, ctx, resolved)?,
        };
        slots.push(slot);
    }
    Ok(slots)
}

/// Reads `count` logical array-element slots, collapsing
/// `ObjectNullMultiple[256]` runs into that many `MemberSlot::Null`s without
/// consuming further bytes per run.
fn read_elements<R: Read>(
    r: &mut R,
    ctx: &mut MessageContext,
    resolved: &mut HashMap<i32, ResolvedNode>,
    count: i32,
) -> Result<Vec<MemberSlot>> {
    let mut out = Vec::with_capacity(count.max(0) as usize);
    let mut i = 0;
    while i < count {
        let mut record = decode_record(r)?.ok_or(Error::TruncatedInput { offset: 0 })?;
        while let Record::BinaryLibrary(lib) = record {
            ctx.add_library(lib.library_id, lib.library_name);
            record = decode_record(r)?.ok_or(Error::TruncatedInput { offset: 0 })?;
        }
        match record {
            Record::ObjectNullMultiple(n) => {
                for _ in 0..n.null_count {
                    out.push(MemberSlot::Null);
                    i += 1;
                }
            }
            Record::ObjectNullMultiple256(n) => {
                for _ in 0..n.null_count {
                    out.push(MemberSlot::Null);
                    i += 1;
                }
            }
            Record::ObjectNull => {
                out.push(MemberSlot::Null);
                i += 1;
            }
            Record::MemberReference(m) => {
                ctx.add_reference(m.id_ref);
                out.push(MemberSlot::Ref(m.id_ref));
                i += 1;
            }
            other => {
                let id = register_decoded(other, r, ctx, resolved)?;
                out.push(MemberSlot::Ref(id));
                i += 1;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recordio::encode_record;

    /// Builds the byte stream for a
    /// `BinaryMethodReturn` with `ReturnValueInArray`, wrapping a
    /// `Hashtable` referenceable, then `MessageEnd`.
    #[test]
    fn decode_method_return_with_hashtable() {
        let mut buf = Vec::new();
        encode_record(
            &mut buf,
            &Record::SerializationHeader(SerializationHeaderRecord {
                root_id: 1,
                header_id: -1,
                major_version: 1,
                minor_version: 0,
            }),
        )
        .unwrap();

        let flags = MessageFlags { no_args: true, no_context: true, return_value_in_array: true, ..Default::default() };
        encode_record(
            &mut buf,
            &Record::BinaryMethodReturn(BinaryMethodReturnRecord {
                flags,
                return_value: None,
                call_context: None,
                args: None,
            }),
        )
        .unwrap();

        encode_record(
            &mut buf,
            &Record::ArraySingleObject(ArraySingleObjectRecord { object_id: 2, length: 1 }),
        )
        .unwrap();

        encode_record(
            &mut buf,
            &Record::SystemClassWithMembersAndTypes(SystemClassWithMembersAndTypesRecord {
                class_info: ClassInfo {
                    object_id: 3,
                    name: "System.Collections.Hashtable".into(),
                    member_names: vec!["LoadFactor".into(), "Version".into()],
                },
                member_type_info: MemberTypeInfo {
                    entries: vec![
                        (BinaryType::Primitive, AdditionalTypeInfo::Primitive(PrimitiveType::Single)),
                        (BinaryType::Primitive, AdditionalTypeInfo::Primitive(PrimitiveType::Int32)),
                    ],
                },
            }),
        )
        .unwrap();
        crate::primitives::write_primitive_value(&mut buf, &PrimitiveValue::Single(0.72000002861)).unwrap();
        crate::primitives::write_primitive_value(&mut buf, &PrimitiveValue::Int32(2)).unwrap();

        encode_record(&mut buf, &Record::MessageEnd).unwrap();

        let mut cur = std::io::Cursor::new(buf);
        let msg = decode_message(&mut cur).unwrap();
        assert_eq!(msg.kind, MethodKind::Return);
        assert!(msg.flags.return_value_in_array);
        assert_eq!(msg.payload_ids.len(), 1);
        let id = match msg.payload_ids[0] {
            MemberSlot::Ref(id) => id,
            _ => panic!("expected a class reference"),
        };
        match msg.resolve(id).unwrap() {
            ResolvedNode::Class { class_name, slots, .. } => {
                assert_eq!(class_name, "System.Collections.Hashtable");
                match &slots[0] {
                    MemberSlot::Primitive(PrimitiveValue::Single(v)) => assert_eq!(*v, 0.72000002861),
                    _ => panic!("expected LoadFactor primitive"),
                }
            }
            _ => panic!("expected a class node"),
        }
    }
}
