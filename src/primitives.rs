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

//! Primitive codec: the 7-bit variable-length length prefix, fixed-width
//! little-endian primitive encode/decode, and `LengthPrefixedString`.

use crate::error::{Error, Result};
use crate::records::{DateTimeValue, PrimitiveType, PrimitiveValue};
use std::io::{Read, Write};

pub fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> Result<()> {
    w.write_all(&[v])?;
    Ok(())
}

pub fn read_i32<R: Read>(r: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

pub fn write_i32<W: Write>(w: &mut W, v: i32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Reads a 7-bit variable-length integer: each byte carries 7 value bits,
/// high bit set means "another byte follows". Up to 5 bytes (35 bits of
/// shift) are permitted.
pub fn read_variable_length_int<R: Read>(r: &mut R) -> Result<i32> {
    let mut value: i32 = 0;
    let mut shift = 0;
    loop {
        let b = read_u8(r)?;
        value |= ((b & 0x7F) as i32) << shift;
        if (b & 0x80) == 0 {
            break;
        }
        shift += 7;
        if shift >= 35 {
            return Err(Error::MalformedValue("variable length int too long".into()));
        }
    }
    Ok(value)
}

pub fn write_variable_length_int<W: Write>(w: &mut W, mut value: i32) -> Result<()> {
    loop {
        let mut b = (value & 0x7F) as u8;
        value = ((value as u32) >> 7) as i32;
        if value > 0 {
            b |= 0x80;
            write_u8(w, b)?;
        } else {
            write_u8(w, b)?;
            break;
        }
    }
    Ok(())
}

pub fn read_length_prefixed_string<R: Read>(r: &mut R) -> Result<String> {
    let length = read_variable_length_int(r)?;
    if length < 0 {
        return Err(Error::MalformedValue(format!("negative string length {length}")));
    }
    if length == 0 {
        return Ok(String::new());
    }
    let mut buf = vec![0u8; length as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| Error::MalformedValue(format!("invalid UTF-8 in length-prefixed string: {e}")))
}

pub fn write_length_prefixed_string<W: Write>(w: &mut W, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    write_variable_length_int(w, bytes.len() as i32)?;
    w.write_all(bytes)?;
    Ok(())
}

pub fn read_primitive_value<R: Read>(r: &mut R, pt: PrimitiveType) -> Result<PrimitiveValue> {
    match pt {
        PrimitiveType::Boolean => {
            let b = read_u8(r)?;
            match b {
                0 => Ok(PrimitiveValue::Boolean(false)),
                1 => Ok(PrimitiveValue::Boolean(true)),
                other => Err(Error::MalformedValue(format!("invalid boolean byte {other}"))),
            }
        }
        PrimitiveType::Byte => Ok(PrimitiveValue::Byte(read_u8(r)?)),
        PrimitiveType::Char => Ok(PrimitiveValue::Char(read_u8(r)? as char)),
        PrimitiveType::Int16 => {
            let mut buf = [0u8; 2];
            r.read_exact(&mut buf)?;
            Ok(PrimitiveValue::Int16(i16::from_le_bytes(buf)))
        }
        PrimitiveType::Int32 => Ok(PrimitiveValue::Int32(read_i32(r)?)),
        PrimitiveType::Int64 => {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf)?;
            Ok(PrimitiveValue::Int64(i64::from_le_bytes(buf)))
        }
        PrimitiveType::TimeSpan => {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf)?;
            Ok(PrimitiveValue::TimeSpan(i64::from_le_bytes(buf)))
        }
        PrimitiveType::DateTime => {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf)?;
            Ok(PrimitiveValue::DateTime(DateTimeValue::from_wire(u64::from_le_bytes(buf))))
        }
        PrimitiveType::SByte => Ok(PrimitiveValue::SByte(read_u8(r)? as i8)),
        PrimitiveType::Single => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Ok(PrimitiveValue::Single(f32::from_le_bytes(buf)))
        }
        PrimitiveType::Double => {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf)?;
            Ok(PrimitiveValue::Double(f64::from_le_bytes(buf)))
        }
        PrimitiveType::Decimal => {
            let mut buf = [0u8; 16];
            r.read_exact(&mut buf)?;
            Ok(PrimitiveValue::Decimal(hex::encode(buf)))
        }
        PrimitiveType::UInt16 => {
            let mut buf = [0u8; 2];
            r.read_exact(&mut buf)?;
            Ok(PrimitiveValue::UInt16(u16::from_le_bytes(buf)))
        }
        PrimitiveType::UInt32 => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Ok(PrimitiveValue::UInt32(u32::from_le_bytes(buf)))
        }
        PrimitiveType::UInt64 => {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf)?;
            Ok(PrimitiveValue::UInt64(u64::from_le_bytes(buf)))
        }
        PrimitiveType::String => Ok(PrimitiveValue::String(read_length_prefixed_string(r)?)),
        PrimitiveType::Null => Ok(PrimitiveValue::Null),
    }
}

pub fn write_primitive_value<W: Write>(w: &mut W, val: &PrimitiveValue) -> Result<()> {
    match val {
        PrimitiveValue::Boolean(b) => write_u8(w, if *b { 1 } else { 0 })?,
        PrimitiveValue::Byte(b) => write_u8(w, *b)?,
        PrimitiveValue::Char(c) => write_u8(w, *c as u8)?,
        PrimitiveValue::Int16(v) => w.write_all(&v.to_le_bytes())?,
        PrimitiveValue::Int32(v) => write_i32(w, *v)?,
        PrimitiveValue::Int64(v) => w.write_all(&v.to_le_bytes())?,
        PrimitiveValue::SByte(v) => write_u8(w, *v as u8)?,
        PrimitiveValue::Single(v) => w.write_all(&v.to_le_bytes())?,
        PrimitiveValue::Double(v) => w.write_all(&v.to_le_bytes())?,
        PrimitiveValue::TimeSpan(v) => w.write_all(&v.to_le_bytes())?,
        PrimitiveValue::DateTime(v) => w.write_all(&v.to_wire().to_le_bytes())?,
        PrimitiveValue::UInt16(v) => w.write_all(&v.to_le_bytes())?,
        PrimitiveValue::UInt32(v) => w.write_all(&v.to_le_bytes())?,
        PrimitiveValue::UInt64(v) => w.write_all(&v.to_le_bytes())?,
        PrimitiveValue::String(s) => write_length_prefixed_string(w, s)?,
        PrimitiveValue::Decimal(s) => {
            let bytes = hex::decode(s)
                .map_err(|e| Error::MalformedValue(format!("invalid hex for Decimal: {e}")))?;
            if bytes.len() != 16 {
                return Err(Error::MalformedValue(format!(
                    "Decimal must be 16 bytes, got {}",
                    bytes.len()
                )));
            }
            w.write_all(&bytes)?;
        }
        PrimitiveValue::Null => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn varint_scenarios() {
        // worked example 1
        let cases = [(256i32, vec![0x80, 0x02]), (127, vec![0x7F]), (134, vec![0x86, 0x01])];
        for (n, expected) in cases {
            let mut buf = Vec::new();
            write_variable_length_int(&mut buf, n).unwrap();
            assert_eq!(buf, expected, "encoding {n}");
            let mut cur = Cursor::new(buf);
            assert_eq!(read_variable_length_int(&mut cur).unwrap(), n);
        }
    }

    #[test]
    fn varint_round_trip_range() {
        for n in (0..(1 << 21)).step_by(997) {
            let mut buf = Vec::new();
            write_variable_length_int(&mut buf, n).unwrap();
            let mut cur = Cursor::new(buf);
            assert_eq!(read_variable_length_int(&mut cur).unwrap(), n);
        }
    }

    #[test]
    fn length_prefixed_string_scenario() {
        // worked example 2
        let s = "Security.ISecurityQuery, Security.Client_v1.0.2.1, Version=1.1.870.17051, Culture=neutral, PublicKeyToken=a05d8f63989cf1d1";
        assert_eq!(s.len(), 110);
        let mut buf = Vec::new();
        write_length_prefixed_string(&mut buf, s).unwrap();
        assert_eq!(&buf[..2], &[0x86, 0x01]);
        let mut cur = Cursor::new(buf);
        assert_eq!(read_length_prefixed_string(&mut cur).unwrap(), s);
    }

    #[test]
    fn boolean_rejects_other_bytes() {
        let mut cur = Cursor::new(vec![2u8]);
        assert!(read_primitive_value(&mut cur, PrimitiveType::Boolean).is_err());
    }

    #[test]
    fn datetime_scenario() {
        // worked example 3
        let bytes = [0x00u8, 0x00, 0xD0, 0x1C, 0xBC, 0xE6, 0x72, 0xD1];
        let mut cur = Cursor::new(bytes.to_vec());
        let v = read_primitive_value(&mut cur, PrimitiveType::DateTime).unwrap();
        match v {
            PrimitiveValue::DateTime(dt) => {
                assert_eq!(dt.ticks, 0xD172E6BC1CD00000u64 >> 2);
                assert_eq!(dt.kind, 0);
            }
            _ => panic!("expected DateTime"),
        }
        let mut out = Vec::new();
        write_primitive_value(&mut out, &v).unwrap();
        assert_eq!(out, bytes);
    }
}
