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

//! Record Codec: `encode(record) -> bytes` and
//! `decode(bytes) -> record`, one pair per record kind, pure — no context
//! lookups happen here. Nested member/element values are never read or
//! written by this module; that composition belongs to `crate::grammar`.

use crate::error::{Error, Result};
use crate::primitives::*;
use crate::records::*;
use std::io::{Read, Write};

pub fn decode_record<R: Read>(r: &mut R) -> Result<Option<Record>> {
    let mut tag_buf = [0u8; 1];
    if r.read_exact(&mut tag_buf).is_err() {
        return Ok(None);
    }
    let tag = RecordType::try_from(tag_buf[0])?;
    Ok(Some(decode_record_body(r, tag)?))
}

fn decode_record_body<R: Read>(r: &mut R, tag: RecordType) -> Result<Record> {
    match tag {
        RecordType::SerializationHeader => {
            let root_id = read_i32(r)?;
            let header_id = read_i32(r)?;
            let major_version = read_i32(r)?;
            let minor_version = read_i32(r)?;
            if (major_version, minor_version) != (1, 0) {
                return Err(Error::UnsupportedVersion { major: major_version, minor: minor_version });
            }
            Ok(Record::SerializationHeader(SerializationHeaderRecord {
                root_id,
                header_id,
                major_version,
                minor_version,
            }))
        }
        RecordType::BinaryLibrary => Ok(Record::BinaryLibrary(BinaryLibraryRecord {
            library_id: read_i32(r)?,
            library_name: read_length_prefixed_string(r)?,
        })),
        RecordType::ClassWithId => Ok(Record::ClassWithId(ClassWithIdRecord {
            object_id: read_i32(r)?,
            metadata_id: read_i32(r)?,
        })),
        RecordType::ClassWithMembers => {
            let class_info = read_class_info(r)?;
            let library_id = read_i32(r)?;
            Ok(Record::ClassWithMembers(ClassWithMembersRecord { class_info, library_id }))
        }
        RecordType::SystemClassWithMembers => {
            let class_info = read_class_info(r)?;
            Ok(Record::SystemClassWithMembers(SystemClassWithMembersRecord { class_info }))
        }
        RecordType::ClassWithMembersAndTypes => {
            let class_info = read_class_info(r)?;
            let member_type_info = read_member_type_info(r, class_info.member_count())?;
            let library_id = read_i32(r)?;
            Ok(Record::ClassWithMembersAndTypes(ClassWithMembersAndTypesRecord {
                class_info,
                member_type_info,
                library_id,
            }))
        }
        RecordType::SystemClassWithMembersAndTypes => {
            let class_info = read_class_info(r)?;
            let member_type_info = read_member_type_info(r, class_info.member_count())?;
            Ok(Record::SystemClassWithMembersAndTypes(SystemClassWithMembersAndTypesRecord {
                class_info,
                member_type_info,
            }))
        }
        RecordType::BinaryObjectString => Ok(Record::BinaryObjectString(BinaryObjectStringRecord {
            object_id: read_i32(r)?,
            value: read_length_prefixed_string(r)?,
        })),
        RecordType::BinaryArray => Ok(Record::BinaryArray(read_binary_array_header(r)?)),
        RecordType::MemberPrimitiveTyped => {
            let pt = PrimitiveType::try_from(read_u8(r)?)?;
            Ok(Record::MemberPrimitiveTyped(MemberPrimitiveTypedRecord {
                value: read_primitive_value(r, pt)?,
            }))
        }
        RecordType::MemberReference => Ok(Record::MemberReference(MemberReferenceRecord {
            id_ref: read_i32(r)?,
        })),
        RecordType::ObjectNull => Ok(Record::ObjectNull),
        RecordType::MessageEnd => Ok(Record::MessageEnd),
        RecordType::ObjectNullMultiple256 => {
            Ok(Record::ObjectNullMultiple256(ObjectNullMultiple256Record { null_count: read_u8(r)? }))
        }
        RecordType::ObjectNullMultiple => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Ok(Record::ObjectNullMultiple(ObjectNullMultipleRecord {
                null_count: u32::from_le_bytes(buf),
            }))
        }
        RecordType::ArraySinglePrimitive => {
            let object_id = read_i32(r)?;
            let length = read_i32(r)?;
            let primitive_type_enum = PrimitiveType::try_from(read_u8(r)?)?;
            Ok(Record::ArraySinglePrimitive(ArraySinglePrimitiveRecord {
                object_id,
                length,
                primitive_type_enum,
            }))
        }
        RecordType::ArraySingleObject => Ok(Record::ArraySingleObject(ArraySingleObjectRecord {
            object_id: read_i32(r)?,
            length: read_i32(r)?,
        })),
        RecordType::ArraySingleString => Ok(Record::ArraySingleString(ArraySingleStringRecord {
            object_id: read_i32(r)?,
            length: read_i32(r)?,
        })),
        RecordType::BinaryMethodCall => Ok(Record::BinaryMethodCall(read_binary_method_call(r)?)),
        RecordType::BinaryMethodReturn => Ok(Record::BinaryMethodReturn(read_binary_method_return(r)?)),
    }
}

fn read_class_info<R: Read>(r: &mut R) -> Result<ClassInfo> {
    let object_id = read_i32(r)?;
    let name = read_length_prefixed_string(r)?;
    let member_count = read_i32(r)?;
    let mut member_names = Vec::with_capacity(member_count.max(0) as usize);
    for _ in 0..member_count {
        member_names.push(read_length_prefixed_string(r)?);
    }
    Ok(ClassInfo { object_id, name, member_names })
}

fn write_class_info<W: Write>(w: &mut W, info: &ClassInfo) -> Result<()> {
    write_i32(w, info.object_id)?;
    write_length_prefixed_string(w, &info.name)?;
    write_i32(w, info.member_count())?;
    for name in &info.member_names {
        write_length_prefixed_string(w, name)?;
    }
    Ok(())
}

fn read_member_type_info<R: Read>(r: &mut R, count: i32) -> Result<MemberTypeInfo> {
    let mut types = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        types.push(BinaryType::try_from(read_u8(r)?)?);
    }
    let mut entries = Vec::with_capacity(count.max(0) as usize);
    for bt in types {
        let additional = match bt {
            BinaryType::Primitive => AdditionalTypeInfo::Primitive(PrimitiveType::try_from(read_u8(r)?)?),
            BinaryType::SystemClass => AdditionalTypeInfo::SystemClass(read_length_prefixed_string(r)?),
            BinaryType::Class => AdditionalTypeInfo::Class(ClassTypeInfo {
                type_name: read_length_prefixed_string(r)?,
                library_id: read_i32(r)?,
            }),
            _ => AdditionalTypeInfo::None,
        };
        entries.push((bt, additional));
    }
    Ok(MemberTypeInfo { entries })
}

fn write_member_type_info<W: Write>(w: &mut W, info: &MemberTypeInfo) -> Result<()> {
    for (bt, _) in &info.entries {
        write_u8(w, *bt as u8)?;
    }
    for (_, additional) in &info.entries {
        match additional {
            AdditionalTypeInfo::Primitive(pt) => write_u8(w, *pt as u8)?,
            AdditionalTypeInfo::SystemClass(s) => write_length_prefixed_string(w, s)?,
            AdditionalTypeInfo::Class(c) => {
                write_length_prefixed_string(w, &c.type_name)?;
                write_i32(w, c.library_id)?;
            }
            AdditionalTypeInfo::None => {}
        }
    }
    Ok(())
}

fn read_additional_type_info<R: Read>(r: &mut R, bt: BinaryType) -> Result<AdditionalTypeInfo> {
    match bt {
        BinaryType::Primitive => Ok(AdditionalTypeInfo::Primitive(PrimitiveType::try_from(read_u8(r)?)?)),
        BinaryType::SystemClass => Ok(AdditionalTypeInfo::SystemClass(read_length_prefixed_string(r)?)),
        BinaryType::Class => Ok(AdditionalTypeInfo::Class(ClassTypeInfo {
            type_name: read_length_prefixed_string(r)?,
            library_id: read_i32(r)?,
        })),
        _ => Ok(AdditionalTypeInfo::None),
    }
}

fn write_additional_type_info<W: Write>(w: &mut W, info: &AdditionalTypeInfo) -> Result<()> {
    match info {
        AdditionalTypeInfo::Primitive(pt) => write_u8(w, *pt as u8)?,
        AdditionalTypeInfo::SystemClass(s) => write_length_prefixed_string(w, s)?,
        AdditionalTypeInfo::Class(c) => {
            write_length_prefixed_string(w, &c.type_name)?;
            write_i32(w, c.library_id)?;
        }
        AdditionalTypeInfo::None => {}
    }
    Ok(())
}

fn read_binary_array_header<R: Read>(r: &mut R) -> Result<BinaryArrayRecord> {
    let object_id = read_i32(r)?;
    let binary_array_type_enum = read_u8(r)?;
    let rank = read_i32(r)?;
    let mut lengths = Vec::with_capacity(rank.max(0) as usize);
    for _ in 0..rank {
        lengths.push(read_i32(r)?);
    }
    let lower_bounds = if matches!(binary_array_type_enum, 3 | 4 | 5) {
        let mut bounds = Vec::with_capacity(rank.max(0) as usize);
        for _ in 0..rank {
            bounds.push(read_i32(r)?);
        }
        Some(bounds)
    } else {
        None
    };
    let type_enum = BinaryType::try_from(read_u8(r)?)?;
    let additional_type_info = read_additional_type_info(r, type_enum)?;
    Ok(BinaryArrayRecord {
        object_id,
        binary_array_type_enum,
        rank,
        lengths,
        lower_bounds,
        type_enum,
        additional_type_info,
    })
}

fn write_binary_array_header<W: Write>(w: &mut W, rec: &BinaryArrayRecord) -> Result<()> {
    write_i32(w, rec.object_id)?;
    write_u8(w, rec.binary_array_type_enum)?;
    write_i32(w, rec.rank)?;
    for len in &rec.lengths {
        write_i32(w, *len)?;
    }
    if let Some(bounds) = &rec.lower_bounds {
        for bound in bounds {
            write_i32(w, *bound)?;
        }
    }
    write_u8(w, rec.type_enum as u8)?;
    write_additional_type_info(w, &rec.additional_type_info)?;
    Ok(())
}

fn read_value_with_code<R: Read>(r: &mut R) -> Result<ValueWithCode> {
    let pt = PrimitiveType::try_from(read_u8(r)?)?;
    Ok(ValueWithCode { value: read_primitive_value(r, pt)? })
}

fn write_value_with_code<W: Write>(w: &mut W, v: &ValueWithCode) -> Result<()> {
    write_u8(w, v.value.type_tag() as u8)?;
    write_primitive_value(w, &v.value)?;
    Ok(())
}

fn read_array_of_value_with_code<R: Read>(r: &mut R) -> Result<Vec<ValueWithCode>> {
    let length = read_i32(r)?;
    let mut values = Vec::with_capacity(length.max(0) as usize);
    for _ in 0..length {
        values.push(read_value_with_code(r)?);
    }
    Ok(values)
}

fn write_array_of_value_with_code<W: Write>(w: &mut W, values: &[ValueWithCode]) -> Result<()> {
    write_i32(w, values.len() as i32)?;
    for v in values {
        write_value_with_code(w, v)?;
    }
    Ok(())
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn read_binary_method_call<R: Read>(r: &mut R) -> Result<BinaryMethodCallRecord> {
    let flags = MessageFlags::from_bits(read_u32(r)?);
    flags.validate()?;
    let method_name = Some(read_value_with_code(r)?);
    let type_name = Some(read_value_with_code(r)?);
    let call_context = if !flags.no_context && flags.context_inline {
        Some(read_value_with_code(r)?)
    } else {
        None
    };
    let args = if !flags.no_args && flags.args_inline {
        Some(read_array_of_value_with_code(r)?)
    } else {
        None
    };
    Ok(BinaryMethodCallRecord { flags, method_name, type_name, call_context, args })
}

fn write_binary_method_call<W: Write>(w: &mut W, rec: &BinaryMethodCallRecord) -> Result<()> {
    write_u32(w, rec.flags.to_bits())?;
    if let Some(m) = &rec.method_name {
        write_value_with_code(w, m)?;
    }
    if let Some(t) = &rec.type_name {
        write_value_with_code(w, t)?;
    }
    if let Some(ctx) = &rec.call_context {
        write_value_with_code(w, ctx)?;
    }
    if let Some(args) = &rec.args {
        write_array_of_value_with_code(w, args)?;
    }
    Ok(())
}

fn read_binary_method_return<R: Read>(r: &mut R) -> Result<BinaryMethodReturnRecord> {
    let flags = MessageFlags::from_bits(read_u32(r)?);
    flags.validate()?;
    let return_value = if !flags.no_return_value && !flags.return_value_void && flags.return_value_inline {
        Some(read_value_with_code(r)?)
    } else {
        None
    };
    let call_context = if !flags.no_context && flags.context_inline {
        Some(read_value_with_code(r)?)
    } else {
        None
    };
    let args = if !flags.no_args && flags.args_inline {
        Some(read_array_of_value_with_code(r)?)
    } else {
        None
    };
    Ok(BinaryMethodReturnRecord { flags, return_value, call_context, args })
}

fn write_binary_method_return<W: Write>(w: &mut W, rec: &BinaryMethodReturnRecord) -> Result<()> {
    write_u32(w, rec.flags.to_bits())?;
    if let Some(v) = &rec.return_value {
        write_value_with_code(w, v)?;
    }
    if let Some(ctx) = &rec.call_context {
        write_value_with_code(w, ctx)?;
    }
    if let Some(args) = &rec.args {
        write_array_of_value_with_code(w, args)?;
    }
    Ok(())
}

pub fn encode_record<W: Write>(w: &mut W, record: &Record) -> Result<()> {
    write_u8(w, record.tag() as u8)?;
    match record {
        Record::SerializationHeader(rec) => {
            write_i32(w, rec.root_id)?;
            write_i32(w, rec.header_id)?;
            write_i32(w, rec.major_version)?;
            write_i32(w, rec.minor_version)?;
        }
        Record::BinaryLibrary(rec) => {
            write_i32(w, rec.library_id)?;
            write_length_prefixed_string(w, &rec.library_name)?;
        }
        Record::ClassWithId(rec) => {
            write_i32(w, rec.object_id)?;
            write_i32(w, rec.metadata_id)?;
        }
        Record::ClassWithMembers(rec) => {
            write_class_info(w, &rec.class_info)?;
            write_i32(w, rec.library_id)?;
        }
        Record::SystemClassWithMembers(rec) => {
            write_class_info(w, &rec.class_info)?;
        }
        Record::ClassWithMembersAndTypes(rec) => {
            write_class_info(w, &rec.class_info)?;
            write_member_type_info(w, &rec.member_type_info)?;
            write_i32(w, rec.library_id)?;
        }
        Record::SystemClassWithMembersAndTypes(rec) => {
            write_class_info(w, &rec.class_info)?;
            write_member_type_info(w, &rec.member_type_info)?;
        }
        Record::BinaryObjectString(rec) => {
            write_i32(w, rec.object_id)?;
            write_length_prefixed_string(w, &rec.value)?;
        }
        Record::BinaryArray(rec) => write_binary_array_header(w, rec)?,
        Record::MemberPrimitiveTyped(rec) => {
            write_u8(w, rec.value.type_tag() as u8)?;
            write_primitive_value(w, &rec.value)?;
        }
        Record::MemberReference(rec) => write_i32(w, rec.id_ref)?,
        Record::ObjectNull => {}
        Record::MessageEnd => {}
        Record::ObjectNullMultiple256(rec) => write_u8(w, rec.null_count)?,
        Record::ObjectNullMultiple(rec) => w.write_all(&rec.null_count.to_le_bytes())?,
        Record::ArraySinglePrimitive(rec) => {
            write_i32(w, rec.object_id)?;
            write_i32(w, rec.length)?;
            write_u8(w, rec.primitive_type_enum as u8)?;
        }
        Record::ArraySingleObject(rec) => {
            write_i32(w, rec.object_id)?;
            write_i32(w, rec.length)?;
        }
        Record::ArraySingleString(rec) => {
            write_i32(w, rec.object_id)?;
            write_i32(w, rec.length)?;
        }
        Record::BinaryMethodCall(rec) => write_binary_method_call(w, rec)?,
        Record::BinaryMethodReturn(rec) => write_binary_method_return(w, rec)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(record: Record) {
        let mut buf = Vec::new();
        encode_record(&mut buf, &record).unwrap();
        let mut cur = Cursor::new(buf);
        let decoded = decode_record(&mut cur).unwrap().unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn serialization_header_round_trip() {
        round_trip(Record::SerializationHeader(SerializationHeaderRecord {
            root_id: 1,
            header_id: -1,
            major_version: 1,
            minor_version: 0,
        }));
    }

    #[test]
    fn serialization_header_rejects_bad_version() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 1).unwrap();
        write_i32(&mut buf, -1).unwrap();
        write_i32(&mut buf, 2).unwrap();
        write_i32(&mut buf, 0).unwrap();
        let mut cur = Cursor::new(buf);
        assert!(matches!(
            decode_record_body(&mut cur, RecordType::SerializationHeader),
            Err(Error::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn member_reference_round_trip() {
        round_trip(Record::MemberReference(MemberReferenceRecord { id_ref: 42 }));
    }

    #[test]
    fn binary_object_string_round_trip() {
        round_trip(Record::BinaryObjectString(BinaryObjectStringRecord {
            object_id: 3,
            value: "hello".into(),
        }));
    }

    #[test]
    fn class_with_members_and_types_round_trip() {
        round_trip(Record::ClassWithMembersAndTypes(ClassWithMembersAndTypesRecord {
            class_info: ClassInfo {
                object_id: 1,
                name: "System.Collections.Hashtable".into(),
                member_names: vec!["LoadFactor".into(), "Version".into()],
            },
            member_type_info: MemberTypeInfo {
                entries: vec![
                    (BinaryType::Primitive, AdditionalTypeInfo::Primitive(PrimitiveType::Single)),
                    (BinaryType::Primitive, AdditionalTypeInfo::Primitive(PrimitiveType::Int32)),
                ],
            },
            library_id: -1,
        }));
    }

    #[test]
    fn binary_method_return_in_array_round_trip() {
        let flags = MessageFlags {
            no_args: true,
            no_context: true,
            return_value_in_array: true,
            ..Default::default()
        };
        round_trip(Record::BinaryMethodReturn(BinaryMethodReturnRecord {
            flags,
            return_value: None,
            call_context: None,
            args: None,
        }));
    }
}
