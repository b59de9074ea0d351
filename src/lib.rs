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

//! A client/server implementation of Microsoft's .NET Remoting wire format:
//! the MS-NRTP transport framing and the MS-NRBF binary serialization
//! format it carries.
//!
//! The stack is layered bottom-up:
//! - [`primitives`] — the 7-bit varint, length-prefixed strings, fixed-width
//!   primitive encode/decode.
//! - [`records`] — the flat MS-NRBF record grammar (tags, enums, per-record
//!   field layouts), with no knowledge of how records compose into a tree.
//! - [`recordio`] — pure per-record encode/decode over [`records`] types.
//! - [`context`] — the Message Context: libraries, class shapes, the
//!   forward-reference resolver, and object-identity interning.
//! - [`registry`] — the static [`registry::ClassRegistry`] of declared
//!   remoting classes.
//! - [`grammar`] — the Grammar Engine: composes [`recordio`] and
//!   [`context`] into a full message decode/encode.
//! - [`graph`] — the Graph Builder: the typed [`graph::RemotingValue`]
//!   object model callers traverse, and the encode-side walk back to wire
//!   records.
//! - [`frame`] — the outer MS-NRTP `SingleMessage` transport framing.
//! - [`server`] — a TCP listener and worker pool dispatching decoded calls.
//! - [`config`] — server configuration.

pub mod config;
pub mod context;
pub mod error;
pub mod frame;
pub mod grammar;
pub mod graph;
pub mod primitives;
pub mod recordio;
pub mod records;
pub mod registry;
pub mod server;

pub use error::{Error, Result};
pub use grammar::{decode_message, DecodedMessage};
pub use graph::{build_method_call, build_method_return, reconstruct, reconstruct_payload, RemotingObject, RemotingValue};
pub use records::Record;
