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

//! Type Registry: user-declared remoting classes,
//! named once with an ordered member list, driving both decode (shape
//! lookup) and encode (metadata emission).
//!
//! The source declared these dynamically via descriptors and a metaclass
//! (`remoting_types.py`'s `ObjectFactory`); this is re-architected as a
//! static registry ("classes as shapes"): declare a
//! `RemotingClass` value once, look instances up by `(library, class)`.

use crate::records::{BinaryType, PrimitiveType, PrimitiveValue};
use std::collections::HashMap;

/// Sentinel library name for the .NET framework's built-in classes; system
/// classes never carry a library id on the wire.
pub const SYSTEMLIB: &str = "SYSTEMLIB";

#[derive(Debug, Clone)]
pub struct MemberSpec {
    /// The attribute name a handler addresses this member by.
    pub attr_name: &'static str,
    /// The name emitted on the wire in `ClassInfo.member_names`.
    pub wire_name: &'static str,
    pub binary_type: BinaryType,
    pub primitive_type: Option<PrimitiveType>,
    /// Referenced class name, for `BinaryType::Class`/`SystemClass` members.
    pub class_name: Option<&'static str>,
    pub default: Option<PrimitiveValue>,
}

impl MemberSpec {
    const fn primitive(attr_name: &'static str, wire_name: &'static str, pt: PrimitiveType) -> Self {
        MemberSpec {
            attr_name,
            wire_name,
            binary_type: BinaryType::Primitive,
            primitive_type: Some(pt),
            class_name: None,
            default: None,
        }
    }

    const fn string(attr_name: &'static str, wire_name: &'static str) -> Self {
        MemberSpec {
            attr_name,
            wire_name,
            binary_type: BinaryType::String,
            primitive_type: None,
            class_name: None,
            default: None,
        }
    }

    const fn system_class(attr_name: &'static str, wire_name: &'static str, class_name: &'static str) -> Self {
        MemberSpec {
            attr_name,
            wire_name,
            binary_type: BinaryType::SystemClass,
            primitive_type: None,
            class_name: Some(class_name),
            default: None,
        }
    }

    const fn object_array(attr_name: &'static str, wire_name: &'static str) -> Self {
        MemberSpec {
            attr_name,
            wire_name,
            binary_type: BinaryType::ObjectArray,
            primitive_type: None,
            class_name: None,
            default: None,
        }
    }

    fn with_default(mut self, v: PrimitiveValue) -> Self {
        self.default = Some(v);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RemotingClass {
    pub library: &'static str,
    pub name: &'static str,
    pub members: Vec<MemberSpec>,
}

impl RemotingClass {
    pub fn is_system(&self) -> bool {
        self.library == SYSTEMLIB
    }

    pub fn member_names(&self) -> Vec<&'static str> {
        self.members.iter().map(|m| m.wire_name).collect()
    }
}

/// Read-only once built; safe for concurrent reads across worker threads
/// (the registry is read-only at steady state).
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    classes: HashMap<(String, String), RemotingClass>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        ClassRegistry::default()
    }

    pub fn register(&mut self, class: RemotingClass) {
        self.classes.insert((class.library.to_string(), class.name.to_string()), class);
    }

    pub fn lookup(&self, library: &str, class_name: &str) -> Option<&RemotingClass> {
        self.classes.get(&(library.to_string(), class_name.to_string()))
    }

    /// Builds a registry pre-populated with the six SYSTEMLIB classes
    /// required for interop, with their exact member
    /// schemas supplemented from the original source's `system_classes.py`.
    pub fn with_system_classes() -> Self {
        let mut reg = ClassRegistry::new();
        for class in system_classes() {
            reg.register(class);
        }
        reg
    }
}

fn system_classes() -> Vec<RemotingClass> {
    vec![
        RemotingClass {
            library: SYSTEMLIB,
            name: "System.Runtime.Remoting.RemotingException",
            members: vec![
                MemberSpec::string("class_name", "ClassName")
                    .with_default(PrimitiveValue::String(
                        "System.Runtime.Remoting.RemotingException".into(),
                    )),
                MemberSpec::string("message", "Message"),
                MemberSpec::string("help_url", "HelpUrl"),
                MemberSpec::string("inner_exception", "InnerException")
                    .with_default(PrimitiveValue::String("System.Exception".into())),
                MemberSpec::string("stack_trace_string", "StackTraceString"),
                MemberSpec::string("remote_stack_trace_string", "RemoteStackTraceString"),
                MemberSpec::primitive("remote_stack_index", "RemoteStackIndex", PrimitiveType::Int32)
                    .with_default(PrimitiveValue::Int32(0)),
                MemberSpec::string("exception_method", "ExceptionMethod"),
                MemberSpec::primitive("hresult", "HResult", PrimitiveType::Int32)
                    .with_default(PrimitiveValue::Int32(-2146233077)),
                MemberSpec::string("source", "Source"),
            ],
        },
        RemotingClass {
            library: SYSTEMLIB,
            name: "System.Globalization.CompareInfo",
            members: vec![
                MemberSpec::primitive("win32_lcid", "win32LCID", PrimitiveType::Int32),
                MemberSpec::primitive("culture", "culture", PrimitiveType::Int32),
            ],
        },
        RemotingClass {
            library: SYSTEMLIB,
            name: "System.Globalization.TextInfo",
            members: vec![
                MemberSpec::primitive("m_n_data_item", "m_nDataItem", PrimitiveType::Int32),
                MemberSpec::primitive("m_user_user_override", "m_userUserOverride", PrimitiveType::Boolean),
                MemberSpec::primitive("m_win32_lang_id", "m_win32LangID", PrimitiveType::Int32),
            ],
        },
        RemotingClass {
            library: SYSTEMLIB,
            name: "System.Collections.CaseInsensitiveComparer",
            members: vec![MemberSpec::system_class(
                "m_compare_info",
                "m_compareInfo",
                "System.Globalization.CompareInfo",
            )],
        },
        RemotingClass {
            library: SYSTEMLIB,
            name: "System.Collections.CaseInsensitiveHashCodeProvider",
            members: vec![MemberSpec::system_class(
                "m_text",
                "m_text",
                "System.Globalization.TextInfo",
            )],
        },
        RemotingClass {
            library: SYSTEMLIB,
            name: "System.Collections.Hashtable",
            members: vec![
                MemberSpec::primitive("load_factor", "LoadFactor", PrimitiveType::Single)
                    .with_default(PrimitiveValue::Single(0.72000002861)),
                MemberSpec::primitive("version", "Version", PrimitiveType::Int32)
                    .with_default(PrimitiveValue::Int32(2)),
                MemberSpec::system_class(
                    "comparer",
                    "Comparer",
                    "System.Collections.CaseInsensitiveComparer",
                ),
                MemberSpec::system_class(
                    "hash_code_provider",
                    "HashCodeProvider",
                    "System.Collections.CaseInsensitiveHashCodeProvider",
                ),
                MemberSpec::primitive("hash_size", "HashSize", PrimitiveType::Int32),
                MemberSpec::object_array("keys", "Keys"),
                MemberSpec::object_array("values", "Values"),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashtable_has_documented_defaults() {
        let reg = ClassRegistry::with_system_classes();
        let ht = reg.lookup(SYSTEMLIB, "System.Collections.Hashtable").unwrap();
        assert_eq!(ht.members.len(), 7);
        assert_eq!(ht.members[0].default, Some(PrimitiveValue::Single(0.72000002861)));
        assert_eq!(ht.members[1].default, Some(PrimitiveValue::Int32(2)));
    }

    #[test]
    fn remoting_exception_has_ten_members() {
        let reg = ClassRegistry::with_system_classes();
        let ex = reg
            .lookup(SYSTEMLIB, "System.Runtime.Remoting.RemotingException")
            .unwrap();
        assert_eq!(ex.members.len(), 10);
        assert_eq!(ex.members[8].default, Some(PrimitiveValue::Int32(-2146233077)));
    }

    #[test]
    fn unregistered_class_is_none() {
        let reg = ClassRegistry::with_system_classes();
        assert!(reg.lookup("Some.Library", "Nope").is_none());
    }
}
