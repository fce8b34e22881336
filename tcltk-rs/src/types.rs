//! Symbolic object type tags.
//!
//! The native layer identifies an object's internal representation by the
//! address of a type descriptor.  Descriptors are registered lazily by the
//! library, so tags are resolved by name the first time an address is seen
//! and cached in a process-wide append-only table.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use crate::sys::ObjType;

/// Type of an object's current internal representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// The handle is null.
    Null,
    /// Pure string, no internal representation.
    String,
    Int,
    WideInt,
    Double,
    Boolean,
    ByteArray,
    List,
    /// A native type this crate has no dedicated tag for.
    Other(&'static str),
}

impl TypeTag {
    fn from_name(name: &'static str) -> Self {
        match name {
            "int" => TypeTag::Int,
            "wideInt" => TypeTag::WideInt,
            "double" => TypeTag::Double,
            "boolean" | "booleanString" => TypeTag::Boolean,
            "bytearray" => TypeTag::ByteArray,
            "list" => TypeTag::List,
            other => TypeTag::Other(other),
        }
    }

    /// The native name of the tag.
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Null => "null",
            TypeTag::String => "string",
            TypeTag::Int => "int",
            TypeTag::WideInt => "wideInt",
            TypeTag::Double => "double",
            TypeTag::Boolean => "boolean",
            TypeTag::ByteArray => "bytearray",
            TypeTag::List => "list",
            TypeTag::Other(name) => name,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static CACHE: RwLock<Vec<(usize, TypeTag)>> = RwLock::new(Vec::new());

/// Resolve a native type descriptor to its tag.  `None` is a pure string.
pub(crate) fn tag_of(ty: Option<&'static ObjType>) -> TypeTag {
    let Some(ty) = ty else {
        return TypeTag::String;
    };
    let addr = ty as *const ObjType as usize;
    {
        let cache = CACHE.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(&(_, tag)) = cache.iter().find(|(a, _)| *a == addr) {
            return tag;
        }
    }
    let mut cache = CACHE.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(&(_, tag)) = cache.iter().find(|(a, _)| *a == addr) {
        return tag;
    }
    let tag = TypeTag::from_name(ty.name);
    tracing::trace!(name = ty.name, %tag, "registered object type");
    cache.push((addr, tag));
    tag
}

/// Number of distinct native types seen so far.
pub fn known_types() -> usize {
    CACHE.read().unwrap_or_else(PoisonError::into_inner).len()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
