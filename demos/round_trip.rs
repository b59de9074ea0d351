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

//! Builds a `Hashtable` return-value message, decodes it back, and checks
//! the reconstructed value matches what went in — a sanity check for the
//! Grammar Engine and Graph Builder working together end to end.

use msnrtp::grammar::decode_message;
use msnrtp::graph::{build_method_return, reconstruct_payload, RemotingObject, RemotingValue};
use msnrtp::records::PrimitiveValue;
use msnrtp::registry::SYSTEMLIB;
use std::io::Cursor;

fn main() -> msnrtp::Result<()> {
    let hashtable = RemotingObject {
        library: SYSTEMLIB.to_string(),
        class_name: "System.Collections.Hashtable".to_string(),
        members: vec![
            ("LoadFactor".to_string(), RemotingValue::Primitive(PrimitiveValue::Single(0.72000002861))),
            ("Version".to_string(), RemotingValue::Primitive(PrimitiveValue::Int32(2))),
        ],
    };

    let mut buf = Vec::new();
    build_method_return(&mut buf, Some(&RemotingValue::Object(hashtable.clone())), None)?;
    println!("encoded {} bytes", buf.len());

    let mut cur = Cursor::new(buf);
    let msg = decode_message(&mut cur)?;
    let payload = reconstruct_payload(&msg)?;

    match &payload[0] {
        RemotingValue::Object(obj) if obj == &hashtable => println!("round trip OK: {obj:#?}"),
        other => {
            eprintln!("round trip mismatch: {other:#?}");
            std::process::exit(1);
        }
    }

    Ok(())
}
