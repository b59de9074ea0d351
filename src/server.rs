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

//! TCP server: a listener feeding a fixed-size `std::thread` worker pool,
//! mirroring the original's `ThreadPoolExecutor` rather than reaching for
//! an async runtime — none of this crate's ancestry uses one for this
//! class of server.

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame, Header, OperationType, SingleMessage};
use crate::grammar::{decode_message, MethodKind};
use crate::graph::{build_method_return, reconstruct_payload, RemotingObject, RemotingValue};
use crate::registry::{ClassRegistry, SYSTEMLIB};
use std::io::Cursor;
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

/// Implemented by callers to handle a decoded `BinaryMethodCall`. `Err`
/// carries the exception value to send back as-is (build it with
/// `remoting_exception` for a plain-message `RemotingException`, or
/// construct any other object the caller's protocol expects).
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, type_name: &str, method_name: &str, args: Vec<RemotingValue>) -> std::result::Result<RemotingValue, RemotingValue>;
}

/// Runs the listener loop on the calling thread until the socket errors.
/// Spawns `config.workers` long-lived worker threads up front and fans
/// incoming connections out to them over an `mpsc` channel.
pub fn run(config: ServerConfig, dispatch: Arc<dyn Dispatch>) -> Result<()> {
    let listener = TcpListener::bind(&config.listen_addr)?;
    info!(addr = %config.listen_addr, workers = config.workers, "msnrtp server listening");

    let (tx, rx) = mpsc::channel::<TcpStream>();
    let rx = Arc::new(std::sync::Mutex::new(rx));

    for worker_id in 0..config.workers.max(1) {
        let rx = Arc::clone(&rx);
        let dispatch = Arc::clone(&dispatch);
        thread::spawn(move || {
            loop {
                let stream = {
                    let rx = rx.lock().expect("worker channel mutex poisoned");
                    rx.recv()
                };
                match stream {
                    Ok(stream) => {
                        if let Err(e) = handle_connection(stream, dispatch.as_ref()) {
                            warn!(worker_id, error = %e, "connection handling failed");
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }

    for conn in listener.incoming() {
        match conn {
            Ok(stream) => {
                if tx.send(stream).is_err() {
                    break;
                }
            }
            Err(e) => error!(error = %e, "failed to accept connection"),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, dispatch: &dyn Dispatch) -> Result<()> {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
    loop {
        let request = match read_frame(&mut stream) {
            Ok(req) => req,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        let close_after = request.headers.iter().any(|h| *h == Header::CloseConnection);
        let reply = handle_request(&request, dispatch).unwrap_or_else(|e| {
            warn!(peer = %peer, error = %e, "request handling failed");
            error_reply(&e.to_string())
        });

        write_frame(&mut stream, &reply)?;
        if close_after {
            return Ok(());
        }
    }
}

fn handle_request(request: &SingleMessage, dispatch: &dyn Dispatch) -> Result<SingleMessage> {
    let mut cur = Cursor::new(&request.payload);
    let msg = decode_message(&mut cur)?;
    if msg.kind != MethodKind::Call {
        return Err(Error::MalformedValue("expected a BinaryMethodCall on the request path".into()));
    }
    let method_name = msg.method_name.clone().ok_or_else(|| Error::MalformedValue("missing method name".into()))?;
    let type_name = msg.type_name.clone().ok_or_else(|| Error::MalformedValue("missing type name".into()))?;
    let args = reconstruct_payload(&msg)?;

    let reply_payload = match dispatch.dispatch(&type_name, &method_name, args) {
        Ok(value) => {
            let mut buf = Vec::new();
            build_method_return(&mut buf, Some(&value), None)?;
            buf
        }
        Err(exception) => {
            let mut buf = Vec::new();
            build_method_return(&mut buf, None, Some(&exception))?;
            buf
        }
    };

    Ok(SingleMessage::new(OperationType::Reply, vec![Header::ContentType("application/octet-stream".into())], reply_payload))
}

/// Builds a frame-level error reply for failures that happen before a
/// `BinaryMethodCall` could even be decoded (malformed NRBF, IO errors).
fn error_reply(message: &str) -> SingleMessage {
    let mut buf = Vec::new();
    let exception = RemotingValue::Object(remoting_exception(message));
    // Best-effort: if even this fails to encode there is nothing more to do
    // than send an empty reply body.
    let _ = build_method_return(&mut buf, None, Some(&exception));
    SingleMessage::new(
        OperationType::Reply,
        vec![Header::StatusCode(500), Header::ContentType("application/octet-stream".into())],
        buf,
    )
}

/// Builds a `System.Runtime.Remoting.RemotingException` object carrying
/// `message`, with every other member set from its registered default (or
/// `Null` where none is registered). Available for `Dispatch` implementors
/// that want to report a failure without hand-assembling the object.
pub fn remoting_exception(message: &str) -> RemotingObject {
    let registry = ClassRegistry::with_system_classes();
    let class = registry
        .lookup(SYSTEMLIB, "System.Runtime.Remoting.RemotingException")
        .expect("RemotingException is always registered");
    let members = class
        .members
        .iter()
        .map(|m| {
            let value = if m.wire_name == "Message" {
                RemotingValue::Primitive(crate::records::PrimitiveValue::String(message.to_string()))
            } else if let Some(default) = &m.default {
                RemotingValue::Primitive(default.clone())
            } else if m.binary_type == crate::records::BinaryType::String {
                RemotingValue::Null
            } else {
                RemotingValue::Null
            };
            (m.wire_name.to_string(), value)
        })
        .collect();
    RemotingObject { library: SYSTEMLIB.to_string(), class_name: class.name.to_string(), members }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remoting_exception_carries_message() {
        let obj = remoting_exception("dispatch failed");
        assert_eq!(
            obj.member("Message"),
            Some(&RemotingValue::Primitive(crate::records::PrimitiveValue::String("dispatch failed".into())))
        );
        assert_eq!(
            obj.member("HResult"),
            Some(&RemotingValue::Primitive(crate::records::PrimitiveValue::Int32(-2146233077)))
        );
    }
}
