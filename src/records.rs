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

//! The MS-NRBF record grammar: tag enumerations and the per-record field
//! layouts from MS-NRBF sections 2.3/2.4/2.5/2.6. Records here are "flat" —
//! a `ClassWithMembersAndTypes` carries its own metadata but not its
//! members' decoded values. Composing records into a tree (resolving
//! `ClassWithId.metadata_id`, member slots, forward references) is the
//! Grammar Engine's job (`crate::grammar`), not this module's.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    SerializationHeader = 0,
    ClassWithId = 1,
    SystemClassWithMembers = 2,
    ClassWithMembers = 3,
    SystemClassWithMembersAndTypes = 4,
    ClassWithMembersAndTypes = 5,
    BinaryObjectString = 6,
    BinaryArray = 7,
    MemberPrimitiveTyped = 8,
    MemberReference = 9,
    ObjectNull = 10,
    MessageEnd = 11,
    BinaryLibrary = 12,
    ObjectNullMultiple256 = 13,
    ObjectNullMultiple = 14,
    ArraySinglePrimitive = 15,
    ArraySingleObject = 16,
    ArraySingleString = 17,
    BinaryMethodCall = 21,
    BinaryMethodReturn = 22,
}

impl TryFrom<u8> for RecordType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(RecordType::SerializationHeader),
            1 => Ok(RecordType::ClassWithId),
            2 => Ok(RecordType::SystemClassWithMembers),
            3 => Ok(RecordType::ClassWithMembers),
            4 => Ok(RecordType::SystemClassWithMembersAndTypes),
            5 => Ok(RecordType::ClassWithMembersAndTypes),
            6 => Ok(RecordType::BinaryObjectString),
            7 => Ok(RecordType::BinaryArray),
            8 => Ok(RecordType::MemberPrimitiveTyped),
            9 => Ok(RecordType::MemberReference),
            10 => Ok(RecordType::ObjectNull),
            11 => Ok(RecordType::MessageEnd),
            12 => Ok(RecordType::BinaryLibrary),
            13 => Ok(RecordType::ObjectNullMultiple256),
            14 => Ok(RecordType::ObjectNullMultiple),
            15 => Ok(RecordType::ArraySinglePrimitive),
            16 => Ok(RecordType::ArraySingleObject),
            17 => Ok(RecordType::ArraySingleString),
            21 => Ok(RecordType::BinaryMethodCall),
            22 => Ok(RecordType::BinaryMethodReturn),
            _ => Err(Error::UnknownRecordTag(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryType {
    Primitive = 0,
    String = 1,
    Object = 2,
    SystemClass = 3,
    Class = 4,
    ObjectArray = 5,
    StringArray = 6,
    PrimitiveArray = 7,
}

impl TryFrom<u8> for BinaryType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(BinaryType::Primitive),
            1 => Ok(BinaryType::String),
            2 => Ok(BinaryType::Object),
            3 => Ok(BinaryType::SystemClass),
            4 => Ok(BinaryType::Class),
            5 => Ok(BinaryType::ObjectArray),
            6 => Ok(BinaryType::StringArray),
            7 => Ok(BinaryType::PrimitiveArray),
            _ => Err(Error::UnknownBinaryType(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveType {
    Boolean = 1,
    Byte = 2,
    Char = 3,
    Decimal = 5,
    Double = 6,
    Int16 = 7,
    Int32 = 8,
    Int64 = 9,
    SByte = 10,
    Single = 11,
    TimeSpan = 12,
    DateTime = 13,
    UInt16 = 14,
    UInt32 = 15,
    UInt64 = 16,
    Null = 17,
    String = 18,
}

impl TryFrom<u8> for PrimitiveType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(PrimitiveType::Boolean),
            2 => Ok(PrimitiveType::Byte),
            3 => Ok(PrimitiveType::Char),
            5 => Ok(PrimitiveType::Decimal),
            6 => Ok(PrimitiveType::Double),
            7 => Ok(PrimitiveType::Int16),
            8 => Ok(PrimitiveType::Int32),
            9 => Ok(PrimitiveType::Int64),
            10 => Ok(PrimitiveType::SByte),
            11 => Ok(PrimitiveType::Single),
            12 => Ok(PrimitiveType::TimeSpan),
            13 => Ok(PrimitiveType::DateTime),
            14 => Ok(PrimitiveType::UInt16),
            15 => Ok(PrimitiveType::UInt32),
            16 => Ok(PrimitiveType::UInt64),
            17 => Ok(PrimitiveType::Null),
            18 => Ok(PrimitiveType::String),
            _ => Err(Error::UnknownPrimitiveType(value)),
        }
    }
}

/// A .NET `DateTime`: the wire format packs 62 bits of ticks and a 2-bit
/// `DateTimeKind` into a single little-endian `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeValue {
    pub ticks: u64,
    pub kind: u8,
}

impl DateTimeValue {
    pub fn from_wire(raw: u64) -> Self {
        DateTimeValue {
            ticks: raw >> 2,
            kind: (raw & 0b11) as u8,
        }
    }

    pub fn to_wire(self) -> u64 {
        (self.ticks << 2) | (self.kind as u64 & 0b11)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrimitiveValue {
    Boolean(bool),
    Byte(u8),
    Char(char),
    Decimal(String),
    Double(f64),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    SByte(i8),
    Single(f32),
    TimeSpan(i64),
    DateTime(DateTimeValue),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    String(String),
    Null,
}

impl PrimitiveValue {
    pub fn type_tag(&self) -> PrimitiveType {
        match self {
            PrimitiveValue::Boolean(_) => PrimitiveType::Boolean,
            PrimitiveValue::Byte(_) => PrimitiveType::Byte,
            PrimitiveValue::Char(_) => PrimitiveType::Char,
            PrimitiveValue::Decimal(_) => PrimitiveType::Decimal,
            PrimitiveValue::Double(_) => PrimitiveType::Double,
            PrimitiveValue::Int16(_) => PrimitiveType::Int16,
            PrimitiveValue::Int32(_) => PrimitiveType::Int32,
            PrimitiveValue::Int64(_) => PrimitiveType::Int64,
            PrimitiveValue::SByte(_) => PrimitiveType::SByte,
            PrimitiveValue::Single(_) => PrimitiveType::Single,
            PrimitiveValue::TimeSpan(_) => PrimitiveType::TimeSpan,
            PrimitiveValue::DateTime(_) => PrimitiveType::DateTime,
            PrimitiveValue::UInt16(_) => PrimitiveType::UInt16,
            PrimitiveValue::UInt32(_) => PrimitiveType::UInt32,
            PrimitiveValue::UInt64(_) => PrimitiveType::UInt64,
            PrimitiveValue::String(_) => PrimitiveType::String,
            PrimitiveValue::Null => PrimitiveType::Null,
        }
    }
}

/// `ValueWithCode`: a one-byte `PrimitiveTypeEnumeration` tag followed by the
/// value it describes. A `StringValueWithCode` is the special case where the
/// tag is always `PrimitiveType::String`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueWithCode {
    pub value: PrimitiveValue,
}

impl ValueWithCode {
    pub fn string(s: impl Into<String>) -> Self {
        ValueWithCode {
            value: PrimitiveValue::String(s.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassTypeInfo {
    pub type_name: String,
    pub library_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdditionalTypeInfo {
    None,
    Primitive(PrimitiveType),
    SystemClass(String),
    Class(ClassTypeInfo),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub object_id: i32,
    pub name: String,
    pub member_names: Vec<String>,
}

impl ClassInfo {
    pub fn member_count(&self) -> i32 {
        self.member_names.len() as i32
    }
}

/// `MemberTypeInfo`: declared binary/primitive tags for a class's members.
/// Wire layout is strict: all `BinaryType` tags first, then all additional
/// infos in the same order (MS-NRBF 2.3.1.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberTypeInfo {
    pub entries: Vec<(BinaryType, AdditionalTypeInfo)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayInfo {
    pub object_id: i32,
    pub length: i32,
}

/// A 32-bit bitfield; see MS-NRBF 2.2.1.8 `MessageFlags`. Named accessors
/// replace the source's ctypes bitfield union; field order is preserved so
/// `from_bits`/`to_bits` round-trip byte-for-byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    pub no_args: bool,
    pub args_inline: bool,
    pub args_is_array: bool,
    pub args_in_array: bool,
    pub no_context: bool,
    pub context_inline: bool,
    pub context_in_array: bool,
    pub method_signature_in_array: bool,
    pub property_in_array: bool,
    pub no_return_value: bool,
    pub return_value_void: bool,
    pub return_value_inline: bool,
    pub return_value_in_array: bool,
    pub exception_in_array: bool,
    pub generic_method: bool,
}

impl MessageFlags {
    const BITS: [fn(&MessageFlags) -> bool; 15] = [
        |f| f.no_args,
        |f| f.args_inline,
        |f| f.args_is_array,
        |f| f.args_in_array,
        |f| f.no_context,
        |f| f.context_inline,
        |f| f.context_in_array,
        |f| f.method_signature_in_array,
        |f| f.property_in_array,
        |f| f.no_return_value,
        |f| f.return_value_void,
        |f| f.return_value_inline,
        |f| f.return_value_in_array,
        |f| f.exception_in_array,
        |f| f.generic_method,
    ];

    pub fn from_bits(word: u32) -> Self {
        let bit = |n: u32| word & (1 << n) != 0;
        MessageFlags {
            no_args: bit(0),
            args_inline: bit(1),
            args_is_array: bit(2),
            args_in_array: bit(3),
            no_context: bit(4),
            context_inline: bit(5),
            context_in_array: bit(6),
            method_signature_in_array: bit(7),
            property_in_array: bit(8),
            no_return_value: bit(9),
            return_value_void: bit(10),
            return_value_inline: bit(11),
            return_value_in_array: bit(12),
            exception_in_array: bit(13),
            generic_method: bit(14),
        }
    }

    pub fn to_bits(self) -> u32 {
        let mut word = 0u32;
        for (n, getter) in Self::BITS.iter().enumerate() {
            if getter(&self) {
                word |= 1 << n;
            }
        }
        word
    }

    /// Rejects mutually exclusive combinations within the same family, per
    /// (e.g. both `ArgsInline` and `ArgsInArray` set).
    pub fn validate(self) -> Result<()> {
        let args = [self.no_args, self.args_inline, self.args_is_array, self.args_in_array];
        let context = [self.no_context, self.context_inline, self.context_in_array];
        let retval = [
            self.no_return_value,
            self.return_value_void,
            self.return_value_inline,
            self.return_value_in_array,
        ];
        for family in [&args[..], &context[..], &retval[..]] {
            if family.iter().filter(|b| **b).count() > 1 {
                return Err(Error::MalformedValue(
                    "MessageFlags sets more than one flag in the same family".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializationHeaderRecord {
    pub root_id: i32,
    pub header_id: i32,
    pub major_version: i32,
    pub minor_version: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryLibraryRecord {
    pub library_id: i32,
    pub library_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassWithIdRecord {
    pub object_id: i32,
    pub metadata_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassWithMembersRecord {
    pub class_info: ClassInfo,
    pub library_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemClassWithMembersRecord {
    pub class_info: ClassInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassWithMembersAndTypesRecord {
    pub class_info: ClassInfo,
    pub member_type_info: MemberTypeInfo,
    pub library_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemClassWithMembersAndTypesRecord {
    pub class_info: ClassInfo,
    pub member_type_info: MemberTypeInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryObjectStringRecord {
    pub object_id: i32,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryArrayRecord {
    pub object_id: i32,
    pub binary_array_type_enum: u8,
    pub rank: i32,
    pub lengths: Vec<i32>,
    pub lower_bounds: Option<Vec<i32>>,
    pub type_enum: BinaryType,
    pub additional_type_info: AdditionalTypeInfo,
}

impl BinaryArrayRecord {
    pub fn total_elements(&self) -> i32 {
        self.lengths.iter().product()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArraySingleObjectRecord {
    pub object_id: i32,
    pub length: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArraySinglePrimitiveRecord {
    pub object_id: i32,
    pub length: i32,
    pub primitive_type_enum: PrimitiveType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArraySingleStringRecord {
    pub object_id: i32,
    pub length: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberPrimitiveTypedRecord {
    pub value: PrimitiveValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemberReferenceRecord {
    pub id_ref: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectNullMultipleRecord {
    pub null_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectNullMultiple256Record {
    pub null_count: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryMethodCallRecord {
    pub flags: MessageFlags,
    pub method_name: Option<ValueWithCode>,
    pub type_name: Option<ValueWithCode>,
    pub call_context: Option<ValueWithCode>,
    pub args: Option<Vec<ValueWithCode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryMethodReturnRecord {
    pub flags: MessageFlags,
    pub return_value: Option<ValueWithCode>,
    pub call_context: Option<ValueWithCode>,
    pub args: Option<Vec<ValueWithCode>>,
}

/// The closed union over every wire record, pattern-matched (never
/// subtyped) by the grammar engine and record codec alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    SerializationHeader(SerializationHeaderRecord),
    BinaryLibrary(BinaryLibraryRecord),
    ClassWithId(ClassWithIdRecord),
    ClassWithMembers(ClassWithMembersRecord),
    SystemClassWithMembers(SystemClassWithMembersRecord),
    ClassWithMembersAndTypes(ClassWithMembersAndTypesRecord),
    SystemClassWithMembersAndTypes(SystemClassWithMembersAndTypesRecord),
    BinaryObjectString(BinaryObjectStringRecord),
    BinaryArray(BinaryArrayRecord),
    MemberPrimitiveTyped(MemberPrimitiveTypedRecord),
    MemberReference(MemberReferenceRecord),
    ObjectNull,
    MessageEnd,
    ObjectNullMultiple256(ObjectNullMultiple256Record),
    ObjectNullMultiple(ObjectNullMultipleRecord),
    ArraySinglePrimitive(ArraySinglePrimitiveRecord),
    ArraySingleObject(ArraySingleObjectRecord),
    ArraySingleString(ArraySingleStringRecord),
    BinaryMethodCall(BinaryMethodCallRecord),
    BinaryMethodReturn(BinaryMethodReturnRecord),
}

impl Record {
    pub fn tag(&self) -> RecordType {
        match self {
            Record::SerializationHeader(_) => RecordType::SerializationHeader,
            Record::BinaryLibrary(_) => RecordType::BinaryLibrary,
            Record::ClassWithId(_) => RecordType::ClassWithId,
            Record::ClassWithMembers(_) => RecordType::ClassWithMembers,
            Record::SystemClassWithMembers(_) => RecordType::SystemClassWithMembers,
            Record::ClassWithMembersAndTypes(_) => RecordType::ClassWithMembersAndTypes,
            Record::SystemClassWithMembersAndTypes(_) => {
                RecordType::SystemClassWithMembersAndTypes
            }
            Record::BinaryObjectString(_) => RecordType::BinaryObjectString,
            Record::BinaryArray(_) => RecordType::BinaryArray,
            Record::MemberPrimitiveTyped(_) => RecordType::MemberPrimitiveTyped,
            Record::MemberReference(_) => RecordType::MemberReference,
            Record::ObjectNull => RecordType::ObjectNull,
            Record::MessageEnd => RecordType::MessageEnd,
            Record::ObjectNullMultiple256(_) => RecordType::ObjectNullMultiple256,
            Record::ObjectNullMultiple(_) => RecordType::ObjectNullMultiple,
            Record::ArraySinglePrimitive(_) => RecordType::ArraySinglePrimitive,
            Record::ArraySingleObject(_) => RecordType::ArraySingleObject,
            Record::ArraySingleString(_) => RecordType::ArraySingleString,
            Record::BinaryMethodCall(_) => RecordType::BinaryMethodCall,
            Record::BinaryMethodReturn(_) => RecordType::BinaryMethodReturn,
        }
    }

    /// Whether a `MemberReference` may target this record once it is
    /// registered in the context (distilled GLOSSARY: Referenceable).
    pub fn is_referenceable(&self) -> bool {
        matches!(
            self,
            Record::ClassWithId(_)
                | Record::ClassWithMembers(_)
                | Record::SystemClassWithMembers(_)
                | Record::ClassWithMembersAndTypes(_)
                | Record::SystemClassWithMembersAndTypes(_)
                | Record::BinaryObjectString(_)
                | Record::BinaryArray(_)
                | Record::ArraySinglePrimitive(_)
                | Record::ArraySingleObject(_)
                | Record::ArraySingleString(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_flags_round_trip() {
        let flags = MessageFlags {
            args_in_array: true,
            return_value_in_array: true,
            ..Default::default()
        };
        let bits = flags.to_bits();
        assert_eq!(MessageFlags::from_bits(bits), flags);
        assert!(flags.validate().is_ok());
    }

    #[test]
    fn message_flags_rejects_conflicting_family() {
        let flags = MessageFlags {
            args_inline: true,
            args_in_array: true,
            ..Default::default()
        };
        assert!(flags.validate().is_err());
    }

    #[test]
    fn datetime_wire_round_trip() {
        // worked example 3
        let raw = u64::from_le_bytes([0x00, 0x00, 0xD0, 0x1C, 0xBC, 0xE6, 0x72, 0xD1]);
        let dt = DateTimeValue::from_wire(raw);
        assert_eq!(dt.ticks, 0xD172E6BC1CD00000u64 >> 2);
        assert_eq!(dt.kind, 0);
        assert_eq!(dt.to_wire(), raw);
    }

    #[test]
    fn record_tags_match_mnrbf_enumeration() {
        assert_eq!(RecordType::try_from(21).unwrap(), RecordType::BinaryMethodCall);
        assert_eq!(RecordType::try_from(22).unwrap(), RecordType::BinaryMethodReturn);
        assert!(RecordType::try_from(18).is_err());
        assert!(RecordType::try_from(19).is_err());
        assert!(RecordType::try_from(20).is_err());
    }
}
