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

//! Decodes a raw MS-NRBF payload file (the bytes between an NRTP frame's
//! headers and its end, or a standalone `.nrbf`/`.meta` capture) and prints
//! its reconstructed object graph.

use msnrtp::graph::reconstruct_payload;
use msnrtp::grammar::decode_message;
use std::env;
use std::fs::File;
use std::io::BufReader;

fn main() -> msnrtp::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <nrbf_payload_file>", args[0]);
        std::process::exit(1);
    }

    let file = File::open(&args[1])?;
    let mut reader = BufReader::new(file);
    let msg = decode_message(&mut reader)?;

    println!("kind: {:?}", msg.kind);
    println!("flags: {:?}", msg.flags);
    if let Some(method) = &msg.method_name {
        println!("method: {method}");
    }
    if let Some(type_name) = &msg.type_name {
        println!("type: {type_name}");
    }

    let payload = reconstruct_payload(&msg)?;
    for (i, value) in payload.iter().enumerate() {
        println!("payload[{i}] = {value:#?}");
    }

    Ok(())
}
