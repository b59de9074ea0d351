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

//! Graph Builder: the typed object model callers
//! traverse (`RemotingValue`/`RemotingObject`), the decode-side
//! reconstruction pass over `crate::grammar`'s resolved-node map, and the
//! encode-side walk that turns a `RemotingValue` back into wire records.
//!
//! Decode reconstruction is lazy lookup, not recursion depth-limited by the
//! wire's own nesting: by the time `MessageEnd` is reached every
//! referenceable has a `ResolvedNode`, so every `MemberSlot::Ref` resolves
//! on the first lookup regardless of whether the wire declared it before or
//! after the member that points to it.
//!
//! Encode emission walks the value tree depth-first, writing each nested
//! class/array/string inline as soon as it is first seen rather than
//! queueing it for a later breadth-first pass — the record codec does not
//! care which order referenceables appear in, only that every
//! `MemberReference` targets something already on the wire by the time
//! `MessageEnd` is reached, which an inline-first emission trivially
//! satisfies.

use crate::context::MessageContext;
use crate::error::{Error, Result};
use crate::grammar::{DecodedMessage, MemberSlot, MethodKind, ResolvedNode};
use crate::records::*;
use crate::recordio::encode_record;
use crate::registry::{ClassRegistry, SYSTEMLIB};
use std::io::Write;

/// A reconstructed (or yet-to-be-encoded) remoting value.
#[derive(Debug, Clone, PartialEq)]
pub enum RemotingValue {
    Null,
    Primitive(PrimitiveValue),
    Array(Vec<RemotingValue>),
    Object(RemotingObject),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemotingObject {
    pub library: String,
    pub class_name: String,
    /// Members in declared order, as `(wire_name, value)` pairs.
    pub members: Vec<(String, RemotingValue)>,
}

impl RemotingObject {
    pub fn member(&self, wire_name: &str) -> Option<&RemotingValue> {
        self.members.iter().find(|(n, _)| n == wire_name).map(|(_, v)| v)
    }
}

/// Decode-side reconstruction entry point: turns the object id the call
/// array (or a declared root) points at into a full `RemotingValue` tree.
pub fn reconstruct(msg: &DecodedMessage, id: i32) -> Result<RemotingValue> {
    reconstruct_id(msg, id)
}

fn reconstruct_slot(msg: &DecodedMessage, slot: &MemberSlot) -> Result<RemotingValue> {
    match slot {
        MemberSlot::Null => Ok(RemotingValue::Null),
        MemberSlot::Primitive(v) => Ok(RemotingValue::Primitive(v.clone())),
        MemberSlot::Ref(id) => reconstruct_id(msg, *id),
    }
}

fn reconstruct_id(msg: &DecodedMessage, id: i32) -> Result<RemotingValue> {
    let node = msg.resolve(id).ok_or(Error::UnknownClass(id))?;
    match node {
        ResolvedNode::StringValue(s) => Ok(RemotingValue::Primitive(PrimitiveValue::String(s.clone()))),
        ResolvedNode::PrimitiveArray { values, .. } => {
            Ok(RemotingValue::Array(values.iter().cloned().map(RemotingValue::Primitive).collect()))
        }
        ResolvedNode::ObjectArray(slots) => {
            let items = slots.iter().map(|s| reconstruct_slot(msg, s)).collect::<Result<Vec<_>>>()?;
            Ok(RemotingValue::Array(items))
        }
        ResolvedNode::Class { library, class_name, member_names, slots } => {
            let values = slots.iter().map(|s| reconstruct_slot(msg, s)).collect::<Result<Vec<_>>>()?;
            let members = member_names.iter().cloned().zip(values).collect();
            Ok(RemotingValue::Object(RemotingObject {
                library: library.clone().unwrap_or_else(|| SYSTEMLIB.to_string()),
                class_name: class_name.clone(),
                members,
            }))
        }
    }
}

/// Decodes the call array's payload slots into a `Vec<RemotingValue>` (one
/// per logical argument/return slot).
pub fn reconstruct_payload(msg: &DecodedMessage) -> Result<Vec<RemotingValue>> {
    msg.payload_ids.iter().map(|s| reconstruct_slot(msg, s)).collect()
}

/// Encodes a single `BinaryMethodReturn` message carrying either a return
/// value or an exception (never both) as the sole element of a one-length
/// call array, as in the exception-reply worked example.
///
/// `SerializationHeader` is hard-coded to `(root_id=1, header_id=-1,
/// major_version=1, minor_version=0)` — the requirements text and
/// its §9 Open-Questions text disagree on minor_version (1 vs 0); 0 is kept
/// here since the record codec's own decoder rejects any header other than
/// `(1, 0)`, and a value this crate cannot decode back is not a usable
/// constant.
pub fn build_method_return<W: Write>(
    w: &mut W,
    value: Option<&RemotingValue>,
    exception: Option<&RemotingValue>,
) -> Result<()> {
    let (payload, is_exception) = match (value, exception) {
        (Some(v), None) => (v, false),
        (None, Some(e)) => (e, true),
        _ => return Err(Error::Custom("build_method_return needs exactly one of value/exception".into())),
    };

    encode_record(
        w,
        &Record::SerializationHeader(SerializationHeaderRecord {
            root_id: 1,
            header_id: -1,
            major_version: 1,
            minor_version: 0,
        }),
    )?;

    let mut flags = MessageFlags { no_args: true, no_context: true, ..Default::default() };
    if is_exception {
        flags.exception_in_array = true;
        flags.no_return_value = true;
    } else {
        flags.return_value_in_array = true;
    }
    encode_record(
        w,
        &Record::BinaryMethodReturn(BinaryMethodReturnRecord {
            flags,
            return_value: None,
            call_context: None,
            args: None,
        }),
    )?;

    let mut ctx = MessageContext::new();
    let array_id = ctx.next_id();
    encode_record(w, &Record::ArraySingleObject(ArraySingleObjectRecord { object_id: array_id, length: 1 }))?;
    emit_ref_member(w, &mut ctx, payload)?;

    encode_record(w, &Record::MessageEnd)?;
    Ok(())
}

/// Encodes a `BinaryMethodCall` message with inline args packed into a
/// trailing call array, mirroring the shape `build_method_return` uses.
pub fn build_method_call<W: Write>(w: &mut W, method_name: &str, type_name: &str, args: &[RemotingValue]) -> Result<()> {
    encode_record(
        w,
        &Record::SerializationHeader(SerializationHeaderRecord {
            root_id: 1,
            header_id: -1,
            major_version: 1,
            minor_version: 0,
        }),
    )?;

    let flags = MessageFlags { args_in_array: true, no_context: true, ..Default::default() };
    encode_record(
        w,
        &Record::BinaryMethodCall(BinaryMethodCallRecord {
            flags,
            method_name: Some(ValueWithCode::string(method_name)),
            type_name: Some(ValueWithCode::string(type_name)),
            call_context: None,
            args: None,
        }),
    )?;

    let mut ctx = MessageContext::new();
    let array_id = ctx.next_id();
    encode_record(
        w,
        &Record::ArraySingleObject(ArraySingleObjectRecord { object_id: array_id, length: args.len() as i32 }),
    )?;
    for arg in args {
        emit_ref_member(w, &mut ctx, arg)?;
    }

    encode_record(w, &Record::MessageEnd)?;
    Ok(())
}

/// Writes one array-element or class-member slot whose declared binary type
/// is not `Primitive`: a `BinaryObjectString`, a nested class, a nested
/// array, `ObjectNull`, or (on a dedup hit) a `MemberReference`.
fn emit_ref_member<W: Write>(w: &mut W, ctx: &mut MessageContext, value: &RemotingValue) -> Result<()> {
    match value {
        RemotingValue::Null => encode_record(w, &Record::ObjectNull),
        RemotingValue::Primitive(PrimitiveValue::String(s)) => {
            let (id, is_new) = ctx.intern_string(s);
            if is_new {
                encode_record(w, &Record::BinaryObjectString(BinaryObjectStringRecord { object_id: id, value: s.clone() }))
            } else {
                encode_record(w, &Record::MemberReference(MemberReferenceRecord { id_ref: id }))
            }
        }
        RemotingValue::Primitive(p) => {
            // A bare non-string scalar outside a Primitive-typed member slot
            // has no referenceable wire shape; emit it as a typed member.
            encode_record(w, &Record::MemberPrimitiveTyped(MemberPrimitiveTypedRecord { value: p.clone() }))
        }
        RemotingValue::Object(obj) => emit_class(w, ctx, obj),
        RemotingValue::Array(items) => emit_array(w, ctx, items),
    }
}

fn structural_hash(obj: &RemotingObject) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    obj.library.hash(&mut hasher);
    obj.class_name.hash(&mut hasher);
    for (name, value) in &obj.members {
        name.hash(&mut hasher);
        format!("{value:?}").hash(&mut hasher);
    }
    hasher.finish()
}

fn emit_class<W: Write>(w: &mut W, ctx: &mut MessageContext, obj: &RemotingObject) -> Result<()> {
    let (id, is_new) = ctx.intern_class(structural_hash(obj));
    if !is_new {
        return encode_record(w, &Record::MemberReference(MemberReferenceRecord { id_ref: id }));
    }

    if let Some(metadata_id) = ctx.known_class(&obj.library, &obj.class_name) {
        encode_record(w, &Record::ClassWithId(ClassWithIdRecord { object_id: id, metadata_id }))?;
        return emit_members(w, ctx, obj);
    }

    let member_type_info = MemberTypeInfo {
        entries: obj.members.iter().map(|(_, v)| binary_type_of(v)).collect(),
    };
    let class_info = ClassInfo {
        object_id: id,
        name: obj.class_name.clone(),
        member_names: obj.members.iter().map(|(n, _)| n.clone()).collect(),
    };

    if obj.library == SYSTEMLIB {
        encode_record(
            w,
            &Record::SystemClassWithMembersAndTypes(SystemClassWithMembersAndTypesRecord {
                class_info,
                member_type_info,
            }),
        )?;
    } else {
        let library_id = match ctx.library_id_for(&obj.library) {
            Some(id) => id,
            None => {
                let lib_id = ctx.next_id();
                encode_record(
                    w,
                    &Record::BinaryLibrary(BinaryLibraryRecord { library_id: lib_id, library_name: obj.library.clone() }),
                )?;
                ctx.add_library(lib_id, obj.library.clone());
                lib_id
            }
        };
        encode_record(
            w,
            &Record::ClassWithMembersAndTypes(ClassWithMembersAndTypesRecord { class_info, member_type_info, library_id }),
        )?;
    }
    ctx.register_known_class(&obj.library, &obj.class_name, id);

    emit_members(w, ctx, obj)
}

fn emit_members<W: Write>(w: &mut W, ctx: &mut MessageContext, obj: &RemotingObject) -> Result<()> {
    for (_, value) in &obj.members {
        match value {
            RemotingValue::Primitive(p) if p.type_tag() != PrimitiveType::String => {
                crate::primitives::write_primitive_value(w, p)?;
            }
            _ => emit_ref_member(w, ctx, value)?,
        }
    }
    Ok(())
}

fn emit_array<W: Write>(w: &mut W, ctx: &mut MessageContext, items: &[RemotingValue]) -> Result<()> {
    let id = ctx.next_id();
    encode_record(w, &Record::ArraySingleObject(ArraySingleObjectRecord { object_id: id, length: items.len() as i32 }))?;
    for item in items {
        emit_ref_member(w, ctx, item)?;
    }
    Ok(())
}

fn binary_type_of(value: &RemotingValue) -> (BinaryType, AdditionalTypeInfo) {
    match value {
        RemotingValue::Primitive(PrimitiveValue::String(_)) => (BinaryType::String, AdditionalTypeInfo::None),
        RemotingValue::Primitive(p) => (BinaryType::Primitive, AdditionalTypeInfo::Primitive(p.type_tag())),
        RemotingValue::Object(obj) if obj.library == SYSTEMLIB => {
            (BinaryType::SystemClass, AdditionalTypeInfo::SystemClass(obj.class_name.clone()))
        }
        RemotingValue::Object(obj) => (
            BinaryType::Class,
            AdditionalTypeInfo::Class(ClassTypeInfo { type_name: obj.class_name.clone(), library_id: -1 }),
        ),
        RemotingValue::Array(_) => (BinaryType::ObjectArray, AdditionalTypeInfo::None),
        RemotingValue::Null => (BinaryType::Object, AdditionalTypeInfo::None),
    }
}

/// Looks up a declared `RemotingClass` and builds a `RemotingObject` from a
/// sequence of member values in the class's declared order. Convenience for
/// callers building replies from `ClassRegistry` shapes rather than
/// hand-assembling `members`.
pub fn build_object(registry: &ClassRegistry, library: &str, class_name: &str, values: Vec<RemotingValue>) -> Result<RemotingObject> {
    let class = registry
        .lookup(library, class_name)
        .ok_or_else(|| Error::UnregisteredClass { library: library.to_string(), class: class_name.to_string() })?;
    if class.members.len() != values.len() {
        return Err(Error::MalformedValue(format!(
            "{class_name} declares {} members, got {}",
            class.members.len(),
            values.len()
        )));
    }
    let members = class.members.iter().map(|m| m.wire_name.to_string()).zip(values).collect();
    Ok(RemotingObject { library: library.to_string(), class_name: class_name.to_string(), members })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::decode_message;
    use std::io::Cursor;

    #[test]
    fn round_trips_hashtable_return_value() {
        let hashtable = RemotingObject {
            library: SYSTEMLIB.to_string(),
            class_name: "System.Collections.Hashtable".to_string(),
            members: vec![
                ("LoadFactor".to_string(), RemotingValue::Primitive(PrimitiveValue::Single(0.72000002861))),
                ("Version".to_string(), RemotingValue::Primitive(PrimitiveValue::Int32(2))),
            ],
        };

        let mut buf = Vec::new();
        build_method_return(&mut buf, Some(&RemotingValue::Object(hashtable.clone())), None).unwrap();

        let mut cur = Cursor::new(buf);
        let msg = decode_message(&mut cur).unwrap();
        assert_eq!(msg.kind, MethodKind::Return);
        assert!(msg.flags.return_value_in_array);

        let payload = reconstruct_payload(&msg).unwrap();
        assert_eq!(payload.len(), 1);
        match &payload[0] {
            RemotingValue::Object(obj) => {
                assert_eq!(obj.class_name, "System.Collections.Hashtable");
                assert_eq!(obj.member("Version"), Some(&RemotingValue::Primitive(PrimitiveValue::Int32(2))));
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn round_trips_exception_reply() {
        let registry = ClassRegistry::with_system_classes();
        let ex = build_object(
            &registry,
            SYSTEMLIB,
            "System.Runtime.Remoting.RemotingException",
            vec![
                RemotingValue::Primitive(PrimitiveValue::String("System.Runtime.Remoting.RemotingException".into())),
                RemotingValue::Primitive(PrimitiveValue::String("dispatch failed".into())),
                RemotingValue::Null,
                RemotingValue::Primitive(PrimitiveValue::String("System.Exception".into())),
                RemotingValue::Null,
                RemotingValue::Null,
                RemotingValue::Primitive(PrimitiveValue::Int32(0)),
                RemotingValue::Null,
                RemotingValue::Primitive(PrimitiveValue::Int32(-2146233077)),
                RemotingValue::Null,
            ],
        )
        .unwrap();

        let mut buf = Vec::new();
        build_method_return(&mut buf, None, Some(&RemotingValue::Object(ex))).unwrap();

        let mut cur = Cursor::new(buf);
        let msg = decode_message(&mut cur).unwrap();
        assert!(msg.flags.exception_in_array);
        let payload = reconstruct_payload(&msg).unwrap();
        match &payload[0] {
            RemotingValue::Object(obj) => {
                assert_eq!(obj.member("Message"), Some(&RemotingValue::Primitive(PrimitiveValue::String("dispatch failed".into()))));
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn dedups_repeated_object_reference() {
        let shared = RemotingObject {
            library: "App.Shared".to_string(),
            class_name: "App.Shared.Token".to_string(),
            members: vec![("Value".to_string(), RemotingValue::Primitive(PrimitiveValue::Int32(7)))],
        };
        let array = RemotingValue::Array(vec![
            RemotingValue::Object(shared.clone()),
            RemotingValue::Object(shared),
        ]);

        let mut buf = Vec::new();
        build_method_return(&mut buf, Some(&array), None).unwrap();
        let mut cur = Cursor::new(buf);
        let msg = decode_message(&mut cur).unwrap();
        let payload = reconstruct_payload(&msg).unwrap();
        match &payload[0] {
            RemotingValue::Array(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0], items[1]);
            }
            other => panic!("expected array, got {other:?}"),
        }
    }
}
