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

//! The Message Context: per-message mutable bookkeeping threaded through
//! decode and encode — a library table, a class-metadata table, a
//! forward-reference resolver, and an object-identity interning table
//! (Message Context invariants).
//!
//! Lifecycle is one message: a fresh `MessageContext` is created per decode
//! or encode and thread-confined.

use crate::error::{Error, Result};
use crate::records::{ClassInfo, MemberTypeInfo, Record};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// The declared shape backing a `*WithMembersAndTypes` record, looked up by
/// `ClassWithId.metadata_id`.
#[derive(Debug, Clone)]
pub struct ClassShape {
    pub class_info: ClassInfo,
    pub member_type_info: MemberTypeInfo,
    pub library_id: Option<i32>,
}

#[derive(Debug, Default)]
pub struct MessageContext {
    libraries: HashMap<i32, String>,
    classes: HashMap<i32, ClassShape>,
    refables: HashMap<i32, Record>,
    pending: HashSet<i32>,
    referenceable_order: Vec<i32>,
    string_intern: HashMap<u64, i32>,
    class_intern: HashMap<u64, i32>,
    known_classes: HashMap<(String, String), i32>,
    next_id: i32,
}

pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

impl MessageContext {
    pub fn new() -> Self {
        MessageContext { next_id: 1, ..Default::default() }
    }

    pub fn add_library(&mut self, id: i32, name: String) {
        self.libraries.insert(id, name);
    }

    pub fn library_name(&self, id: i32) -> Result<&str> {
        self.libraries.get(&id).map(String::as_str).ok_or(Error::UnknownLibrary(id))
    }

    pub fn library_id_for(&self, name: &str) -> Option<i32> {
        self.libraries.iter().find(|(_, v)| v.as_str() == name).map(|(k, _)| *k)
    }

    /// Registers a declared class shape, e.g. from a `*WithMembersAndTypes`
    /// record, under its `object_id` so a later `ClassWithId` can find it.
    pub fn register_class_shape(&mut self, object_id: i32, shape: ClassShape) -> Result<()> {
        if self.classes.contains_key(&object_id) {
            return Err(Error::DuplicateClassId(object_id));
        }
        self.classes.insert(object_id, shape);
        Ok(())
    }

    pub fn class_shape(&self, metadata_id: i32) -> Result<&ClassShape> {
        self.classes.get(&metadata_id).ok_or(Error::UnknownClass(metadata_id))
    }

    /// Registers a referenceable record under its object id, draining any
    /// pending forward references that targeted it (
    /// "`add_refable` drains pending on arrival").
    pub fn add_refable(&mut self, object_id: i32, record: Record) {
        self.referenceable_order.push(object_id);
        self.refables.insert(object_id, record);
        self.pending.remove(&object_id);
    }

    /// Registers a `MemberReference.id_ref` observed during decode. Binds
    /// immediately if the target is already known; otherwise parks it in
    /// `pending` until `add_refable` (or `finish`) resolves it.
    pub fn add_reference(&mut self, id_ref: i32) {
        if !self.refables.contains_key(&id_ref) {
            self.pending.insert(id_ref);
        }
    }

    pub fn resolve(&self, id: i32) -> Option<&Record> {
        self.refables.get(&id)
    }

    /// Call once after `MessageEnd`. Fails if any reference never resolved.
    pub fn finish(&self) -> Result<()> {
        if let Some(id) = self.pending.iter().next() {
            return Err(Error::UnresolvedReference { id_ref: *id });
        }
        Ok(())
    }

    pub fn next_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Encode-side string interning: returns `(object_id, is_new)`. A hit
    /// means the caller should emit a `MemberReference` instead of a new
    /// `BinaryObjectString`.
    pub fn intern_string(&mut self, s: &str) -> (i32, bool) {
        let hash = hash_bytes(s.as_bytes());
        if let Some(id) = self.string_intern.get(&hash) {
            return (*id, false);
        }
        let id = self.next_id();
        self.string_intern.insert(hash, id);
        (id, true)
    }

    /// Encode-side structural dedup for class instances: returns
    /// `(object_id, is_new)` keyed by a caller-supplied structural hash of
    /// the instance's current member values.
    pub fn intern_class(&mut self, structural_hash: u64) -> (i32, bool) {
        if let Some(id) = self.class_intern.get(&structural_hash) {
            return (*id, false);
        }
        let id = self.next_id();
        self.class_intern.insert(structural_hash, id);
        (id, true)
    }

    /// Encode-side class-identity lookup: the `object_id` of the first
    /// emitted instance of `(library, class_name)`'s full metadata record,
    /// if any, for a later same-shape-but-different-values instance to
    /// reference via `ClassWithId`.
    pub fn known_class(&self, library: &str, class_name: &str) -> Option<i32> {
        self.known_classes.get(&(library.to_string(), class_name.to_string())).copied()
    }

    pub fn register_known_class(&mut self, library: &str, class_name: &str, object_id: i32) {
        self.known_classes.insert((library.to_string(), class_name.to_string()), object_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ClassWithIdRecord;

    #[test]
    fn forward_reference_resolves_on_later_refable() {
        let mut ctx = MessageContext::new();
        ctx.add_reference(5);
        assert!(ctx.finish().is_err());
        ctx.add_refable(5, Record::ClassWithId(ClassWithIdRecord { object_id: 5, metadata_id: 1 }));
        assert!(ctx.finish().is_ok());
        assert!(ctx.resolve(5).is_some());
    }

    #[test]
    fn backward_reference_binds_immediately() {
        let mut ctx = MessageContext::new();
        ctx.add_refable(1, Record::ObjectNull);
        ctx.add_reference(1);
        assert!(ctx.finish().is_ok());
    }

    #[test]
    fn duplicate_class_id_rejected() {
        let mut ctx = MessageContext::new();
        let shape = ClassShape {
            class_info: ClassInfo { object_id: 1, name: "X".into(), member_names: vec![] },
            member_type_info: MemberTypeInfo { entries: vec![] },
            library_id: None,
        };
        ctx.register_class_shape(1, shape.clone()).unwrap();
        assert!(ctx.register_class_shape(1, shape).is_err());
    }

    #[test]
    fn string_interning_dedups() {
        let mut ctx = MessageContext::new();
        let (id1, fresh1) = ctx.intern_string("x");
        let (id2, fresh2) = ctx.intern_string("x");
        assert_eq!(id1, id2);
        assert!(fresh1 && !fresh2);
    }
}
