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

//! Frame Codec: the outer MS-NRTP `SingleMessage`
//! framing that wraps an MS-NRBF payload for transport over TCP — a 14-byte
//! preamble, zero or more headers terminated by `EndHeader`, then the
//! payload bytes verbatim.

use crate::error::{Error, Result};
use std::io::{Read, Write};

pub const PROTOCOL_ID: u32 = 0x54454E2E;
pub const DEFAULT_PORT: u16 = 7431;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Request = 0,
    OneWayRequest = 1,
    Reply = 2,
}

impl TryFrom<u16> for OperationType {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(OperationType::Request),
            1 => Ok(OperationType::OneWayRequest),
            2 => Ok(OperationType::Reply),
            other => Err(Error::MalformedValue(format!("unknown NRTP operation type {other}"))),
        }
    }
}

/// `CountedString`: a one-byte encoding tag (always ASCII, `0x00`) followed
/// by an `i32` byte length and the bytes themselves.
fn read_counted_string<R: Read>(r: &mut R) -> Result<String> {
    let mut enc = [0u8; 1];
    r.read_exact(&mut enc)?;
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = i32::from_le_bytes(len_buf);
    if len < 0 {
        return Err(Error::MalformedValue(format!("negative CountedString length {len}")));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| Error::MalformedValue(format!("invalid UTF-8 in CountedString: {e}")))
}

fn write_counted_string<W: Write>(w: &mut W, s: &str) -> Result<()> {
    w.write_all(&[0x00])?;
    w.write_all(&(s.len() as i32).to_le_bytes())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

/// One of the six NRTP header records (MS-NRTP §2.2.3). `EndHeader`
/// (`token = 0`) terminates the header list.
#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    End,
    StatusCode(i32),
    StatusPhrase(String),
    RequestUri(String),
    CloseConnection,
    ContentType(String),
}

impl Header {
    fn token(&self) -> u8 {
        match self {
            Header::End => 0,
            Header::StatusCode(_) => 2,
            Header::StatusPhrase(_) => 3,
            Header::RequestUri(_) => 4,
            Header::CloseConnection => 5,
            Header::ContentType(_) => 6,
        }
    }
}

fn read_header<R: Read>(r: &mut R) -> Result<Header> {
    let mut token_buf = [0u8; 1];
    r.read_exact(&mut token_buf)?;
    match token_buf[0] {
        0 => Ok(Header::End),
        2 => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Ok(Header::StatusCode(i32::from_le_bytes(buf)))
        }
        3 => Ok(Header::StatusPhrase(read_counted_string(r)?)),
        4 => Ok(Header::RequestUri(read_counted_string(r)?)),
        5 => Ok(Header::CloseConnection),
        6 => Ok(Header::ContentType(read_counted_string(r)?)),
        other => Err(Error::MalformedValue(format!("unknown NRTP header token {other}"))),
    }
}

fn write_header<W: Write>(w: &mut W, header: &Header) -> Result<()> {
    w.write_all(&[header.token()])?;
    match header {
        Header::End | Header::CloseConnection => {}
        Header::StatusCode(code) => w.write_all(&code.to_le_bytes())?,
        Header::StatusPhrase(s) | Header::RequestUri(s) | Header::ContentType(s) => write_counted_string(w, s)?,
    }
    Ok(())
}

/// One framed NRTP message: preamble, header list, and the raw NRBF payload
/// bytes (decoded separately by `crate::grammar::decode_message`).
#[derive(Debug, Clone, PartialEq)]
pub struct SingleMessage {
    pub major_version: u8,
    pub minor_version: u8,
    pub operation_type: OperationType,
    pub content_distribution: u8,
    pub headers: Vec<Header>,
    pub payload: Vec<u8>,
}

impl SingleMessage {
    pub fn new(operation_type: OperationType, headers: Vec<Header>, payload: Vec<u8>) -> Self {
        SingleMessage {
            major_version: 1,
            minor_version: 0,
            operation_type,
            content_distribution: 0,
            headers,
            payload,
        }
    }

    pub fn request_uri(&self) -> Option<&str> {
        self.headers.iter().find_map(|h| match h {
            Header::RequestUri(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.iter().find_map(|h| match h {
            Header::ContentType(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn status_code(&self) -> Option<i32> {
        self.headers.iter().find_map(|h| match h {
            Header::StatusCode(c) => Some(*c),
            _ => None,
        })
    }
}

/// Reads one full `SingleMessage` frame: preamble, headers (until
/// `EndHeader`), then exactly `content_length` payload bytes.
pub fn read_frame<R: Read>(r: &mut R) -> Result<SingleMessage> {
    let mut protocol_id_buf = [0u8; 4];
    r.read_exact(&mut protocol_id_buf)?;
    let protocol_id = u32::from_le_bytes(protocol_id_buf);
    if protocol_id != PROTOCOL_ID {
        return Err(Error::MalformedValue(format!("bad NRTP protocol id 0x{protocol_id:08x}")));
    }

    let mut version_buf = [0u8; 2];
    r.read_exact(&mut version_buf)?;
    let major_version = version_buf[0];
    let minor_version = version_buf[1];

    let mut op_buf = [0u8; 2];
    r.read_exact(&mut op_buf)?;
    let operation_type = OperationType::try_from(u16::from_le_bytes(op_buf))?;

    let mut dist_buf = [0u8; 1];
    r.read_exact(&mut dist_buf)?;
    let content_distribution = dist_buf[0];

    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let content_length = u32::from_le_bytes(len_buf);

    let mut headers = Vec::new();
    loop {
        let header = read_header(r)?;
        let is_end = header == Header::End;
        headers.push(header);
        if is_end {
            break;
        }
    }

    let mut payload = vec![0u8; content_length as usize];
    r.read_exact(&mut payload)?;

    Ok(SingleMessage {
        major_version,
        minor_version,
        operation_type,
        content_distribution,
        headers,
        payload,
    })
}

const PREAMBLE_LEN: usize = 4 + 1 + 1 + 2 + 1 + 4;

/// Computes how many more bytes a reader would need to append to `buf`
/// before a full `SingleMessage` frame (preamble, headers, payload) could be
/// read out of it — `0` once `buf` already holds a complete frame. Lets a
/// caller buffer incoming bytes off a socket without blocking on
/// `read_frame` until enough data has arrived.
///
/// Once the header list is wholly present, the result is exact:
/// `bytes_needed(buf) + buf.len() == total frame length`. While still
/// inside a truncated header it instead reports the deficit to finish
/// parsing just that header — a valid lower bound to request next, not the
/// full remaining total, since later headers aren't visible yet.
pub fn bytes_needed(buf: &[u8]) -> usize {
    if buf.len() < PREAMBLE_LEN {
        return PREAMBLE_LEN - buf.len();
    }
    let content_length = u32::from_le_bytes(buf[9..13].try_into().unwrap()) as usize;

    let mut pos = PREAMBLE_LEN;
    loop {
        if pos >= buf.len() {
            return 1;
        }
        match buf[pos] {
            0 => {
                pos += 1;
                break;
            }
            5 => pos += 1,
            2 => {
                let end = pos + 5;
                if end > buf.len() {
                    return end - buf.len();
                }
                pos = end;
            }
            3 | 4 | 6 => {
                let len_end = pos + 6;
                if len_end > buf.len() {
                    return len_end - buf.len();
                }
                let len = i32::from_le_bytes(buf[pos + 2..pos + 6].try_into().unwrap());
                if len < 0 {
                    return 0;
                }
                let end = len_end + len as usize;
                if end > buf.len() {
                    return end - buf.len();
                }
                pos = end;
            }
            _ => return 0,
        }
    }

    let total = pos + content_length;
    total.saturating_sub(buf.len())
}

/// Writes a full `SingleMessage` frame, appending a trailing `EndHeader` if
/// `msg.headers` does not already end with one.
pub fn write_frame<W: Write>(w: &mut W, msg: &SingleMessage) -> Result<()> {
    w.write_all(&PROTOCOL_ID.to_le_bytes())?;
    w.write_all(&[msg.major_version, msg.minor_version])?;
    w.write_all(&(msg.operation_type as u16).to_le_bytes())?;
    w.write_all(&[msg.content_distribution])?;
    w.write_all(&(msg.payload.len() as u32).to_le_bytes())?;

    for header in &msg.headers {
        write_header(w, header)?;
    }
    if msg.headers.last() != Some(&Header::End) {
        write_header(w, &Header::End)?;
    }

    w.write_all(&msg.payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_round_trip_with_headers() {
        let msg = SingleMessage::new(
            OperationType::Request,
            vec![Header::RequestUri("/RemoteObject.rem".into()), Header::ContentType("application/octet-stream".into())],
            vec![1, 2, 3, 4],
        );
        let mut buf = Vec::new();
        write_frame(&mut buf, &msg).unwrap();
        let mut cur = Cursor::new(buf);
        let decoded = read_frame(&mut cur).unwrap();
        assert_eq!(decoded.operation_type, OperationType::Request);
        assert_eq!(decoded.request_uri(), Some("/RemoteObject.rem"));
        assert_eq!(decoded.content_type(), Some("application/octet-stream"));
        assert_eq!(decoded.payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn reply_round_trip_with_status() {
        let msg = SingleMessage::new(
            OperationType::Reply,
            vec![Header::StatusCode(200), Header::StatusPhrase("OK".into())],
            vec![9, 9],
        );
        let mut buf = Vec::new();
        write_frame(&mut buf, &msg).unwrap();
        let mut cur = Cursor::new(buf);
        let decoded = read_frame(&mut cur).unwrap();
        assert_eq!(decoded.status_code(), Some(200));
    }

    #[test]
    fn rejects_bad_protocol_id() {
        let mut cur = Cursor::new(vec![0u8; 20]);
        assert!(read_frame(&mut cur).is_err());
    }

    #[test]
    fn bytes_needed_exact_once_headers_are_intact() {
        let msg = SingleMessage::new(
            OperationType::Request,
            vec![Header::RequestUri("/RemoteObject.rem".into()), Header::ContentType("application/octet-stream".into())],
            vec![1, 2, 3, 4, 5],
        );
        let mut full = Vec::new();
        write_frame(&mut full, &msg).unwrap();
        let headers_end = full.len() - msg.payload.len();

        // Once the header section is wholly present, bytesNeeded(prefix) +
        // len(prefix) == totalMessageLen for every payload-truncation point.
        for prefix_len in headers_end..=full.len() {
            let prefix = &full[..prefix_len];
            assert_eq!(bytes_needed(prefix) + prefix.len(), full.len(), "prefix_len={prefix_len}");
        }
    }

    #[test]
    fn bytes_needed_reports_preamble_deficit() {
        let msg = SingleMessage::new(OperationType::Request, vec![], vec![1, 2, 3]);
        let mut full = Vec::new();
        write_frame(&mut full, &msg).unwrap();
        assert_eq!(bytes_needed(&full[..5]), PREAMBLE_LEN - 5);
    }

    #[test]
    fn bytes_needed_zero_once_frame_complete() {
        let msg = SingleMessage::new(OperationType::Reply, vec![Header::StatusCode(200)], vec![7, 7, 7]);
        let mut full = Vec::new();
        write_frame(&mut full, &msg).unwrap();
        assert_eq!(bytes_needed(&full), 0);
    }
}
