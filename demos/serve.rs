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

//! Starts an echo server on a loopback port, sends it one `BinaryMethodCall`
//! as a client, and prints the decoded reply — a minimal end-to-end smoke
//! check of `frame.rs`, `grammar.rs`, `graph.rs` and `server.rs` together.

use msnrtp::config::ServerConfig;
use msnrtp::frame::{read_frame, write_frame, Header, OperationType, SingleMessage};
use msnrtp::grammar::decode_message;
use msnrtp::graph::{build_method_call, reconstruct_payload, RemotingValue};
use msnrtp::records::PrimitiveValue;
use msnrtp::server::{self, Dispatch};
use std::io::Cursor;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct EchoDispatch;

impl Dispatch for EchoDispatch {
    fn dispatch(&self, _type_name: &str, _method_name: &str, args: Vec<RemotingValue>) -> Result<RemotingValue, RemotingValue> {
        Ok(RemotingValue::Array(args))
    }
}

fn main() -> msnrtp::Result<()> {
    let mut config = ServerConfig::default();
    config.workers = 1;

    // Bind an ephemeral port ourselves so the client below knows exactly
    // where to connect, then hand that same address to the server.
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    config.listen_addr = addr.to_string();

    let server_addr = config.listen_addr.clone();
    thread::spawn(move || {
        if let Err(e) = server::run(config, Arc::new(EchoDispatch)) {
            eprintln!("server exited: {e}");
        }
    });

    // Give the listener a moment to bind before the client connects.
    thread::sleep(Duration::from_millis(50));

    let mut payload = Vec::new();
    let args = vec![RemotingValue::Primitive(PrimitiveValue::String("hello".into())), RemotingValue::Primitive(PrimitiveValue::Int32(42))];
    build_method_call(&mut payload, "Echo", "RemoteObject", &args)?;

    let request = SingleMessage::new(
        OperationType::Request,
        vec![Header::RequestUri("/RemoteObject.rem".into()), Header::ContentType("application/octet-stream".into()), Header::CloseConnection],
        payload,
    );

    let mut stream = TcpStream::connect(&server_addr)?;
    write_frame(&mut stream, &request)?;
    let reply = read_frame(&mut stream)?;

    let mut cur = Cursor::new(&reply.payload);
    let msg = decode_message(&mut cur)?;
    let values = reconstruct_payload(&msg)?;
    println!("reply status: {:?}", reply.status_code());
    for (i, value) in values.iter().enumerate() {
        println!("reply[{i}] = {value:#?}");
    }

    Ok(())
}
