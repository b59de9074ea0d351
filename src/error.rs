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

use std::io;
use thiserror::Error;

/// Result type used throughout the codec and grammar engine.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("buffer ended mid-record at offset {offset}")]
    TruncatedInput { offset: usize },

    #[error("unknown record tag 0x{0:02x}")]
    UnknownRecordTag(u8),

    #[error("unknown binary type tag 0x{0:02x}")]
    UnknownBinaryType(u8),

    #[error("unknown primitive type tag 0x{0:02x}")]
    UnknownPrimitiveType(u8),

    #[error("unsupported header version {major}.{minor}")]
    UnsupportedVersion { major: i32, minor: i32 },

    #[error("malformed value: {0}")]
    MalformedValue(String),

    #[error("member reference {id_ref} never resolved before MessageEnd")]
    UnresolvedReference { id_ref: i32 },

    #[error("ClassWithId metadata id {0} not found in context")]
    UnknownClass(i32),

    #[error("library id {0} was never declared in this message")]
    UnknownLibrary(i32),

    #[error("declared member tag does not match decoded binary tag for member {member}")]
    TypeMismatch { member: String },

    #[error("duplicate object id {0} registered as a class record")]
    DuplicateClassId(i32),

    #[error("no remoting class registered for ({library}, {class})")]
    UnregisteredClass { library: String, class: String },

    #[error("custom error: {0}")]
    Custom(String),
}
