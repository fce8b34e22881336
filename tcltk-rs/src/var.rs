//! Interpreter variable access.
//!
//! Variables are addressed by a [`VarName`]: a single name (which may itself
//! use `arr(index)` syntax) or an explicit array/element pair.  Lookups
//! follow the native ownership rules:
//!
//! | Operation | Name parts              | Value                        |
//! |-----------|-------------------------|------------------------------|
//! | get       | borrowed (count 0)      | borrowed from the variable   |
//! | set       | borrowed                | variable takes a reference   |
//! | unset     | plain strings           | released by the interpreter  |
//!
//! Scratch name objects are released on every path by [`NameParts`].

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use crate::error::{Error, Result};
use crate::interp::Interp;
use crate::obj::{FromObj, TclObj, Value};
use crate::sys::{self, ObjPtr};

// ── Names ─────────────────────────────────────────────────────────────────────

/// A variable reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarName {
    Scalar(String),
    Element(String, String),
}

impl VarName {
    fn parts(&self) -> (&str, Option<&str>) {
        match self {
            VarName::Scalar(name) => (name, None),
            VarName::Element(array, index) => (array, Some(index)),
        }
    }
}

impl From<&str> for VarName {
    fn from(name: &str) -> Self {
        VarName::Scalar(name.to_owned())
    }
}

impl From<String> for VarName {
    fn from(name: String) -> Self {
        VarName::Scalar(name)
    }
}

impl<A: Into<String>, I: Into<String>> From<(A, I)> for VarName {
    fn from((array, index): (A, I)) -> Self {
        VarName::Element(array.into(), index.into())
    }
}

impl fmt::Display for VarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarName::Scalar(name) => f.write_str(name),
            VarName::Element(array, index) => write!(f, "{array}({index})"),
        }
    }
}

// ── Flags ─────────────────────────────────────────────────────────────────────

/// Lookup and write behaviour for variable operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VarFlags(u32);

impl VarFlags {
    pub const NONE: Self = Self(0);

    // ── Scope ───────────────────────────────────────────────────────────────
    pub const GLOBAL_ONLY: Self = Self(sys::GLOBAL_ONLY);
    pub const NAMESPACE_ONLY: Self = Self(sys::NAMESPACE_ONLY);

    // ── Writes ──────────────────────────────────────────────────────────────
    pub const APPEND_VALUE: Self = Self(sys::APPEND_VALUE);
    pub const LIST_ELEMENT: Self = Self(sys::LIST_ELEMENT);

    /// Leave the native error message in the interpreter result and report it.
    pub const LEAVE_ERR_MSG: Self = Self(sys::LEAVE_ERR_MSG);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for VarFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for VarFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for VarFlags {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

// ── Scratch names ─────────────────────────────────────────────────────────────

/// Unreferenced name objects lent to a native lookup, freed on drop.
struct NameParts {
    part1: ObjPtr,
    part2: Option<ObjPtr>,
}

impl NameParts {
    fn new(name: &VarName) -> Self {
        let (p1, p2) = name.parts();
        Self { part1: sys::new_string_obj(p1), part2: p2.map(sys::new_string_obj) }
    }
}

impl Drop for NameParts {
    fn drop(&mut self) {
        sys::decr_ref_count(self.part1);
        if let Some(p) = self.part2 {
            sys::decr_ref_count(p);
        }
    }
}

// ── Operations ────────────────────────────────────────────────────────────────

impl Interp {
    fn var_failure(&self, verb: &str, name: &VarName, flags: VarFlags) -> Error {
        if flags.contains(VarFlags::LEAVE_ERR_MSG) {
            match self.result::<String>() {
                Ok(msg) if !msg.is_empty() => return Error::Variable(msg),
                Ok(_) => {}
                Err(e) => return e,
            }
        }
        Error::Variable(format!("can't {verb} \"{name}\": no such variable"))
    }

    fn lookup(&self, name: &VarName, flags: VarFlags) -> Result<Option<TclObj>> {
        let ptr = self.check()?;
        let parts = NameParts::new(name);
        let found = sys::obj_get_var2(ptr, parts.part1, parts.part2, flags.bits());
        Ok(found.map(TclObj::from_raw))
    }

    /// True if the variable is set.
    pub fn exists(&self, name: impl Into<VarName>) -> Result<bool> {
        self.exists_with(name, VarFlags::NONE)
    }

    pub fn exists_with(&self, name: impl Into<VarName>, flags: VarFlags) -> Result<bool> {
        let flags = flags & !VarFlags::LEAVE_ERR_MSG;
        Ok(self.lookup(&name.into(), flags)?.is_some())
    }

    /// Read a variable and convert its value.
    pub fn get<T: FromObj>(&self, name: impl Into<VarName>) -> Result<T> {
        self.get_with(name, VarFlags::NONE)
    }

    pub fn get_with<T: FromObj>(&self, name: impl Into<VarName>, flags: VarFlags) -> Result<T> {
        let name = name.into();
        match self.lookup(&name, flags)? {
            Some(obj) => obj.get(),
            None => Err(self.var_failure("read", &name, flags)),
        }
    }

    /// Write a variable.  Returns the value it holds afterwards, which
    /// differs from `value` for appends.  [`Value::Unset`] removes it.
    pub fn set(&self, name: impl Into<VarName>, value: impl Into<Value>) -> Result<TclObj> {
        self.set_with(name, value, VarFlags::NONE)
    }

    pub fn set_with(
        &self,
        name: impl Into<VarName>,
        value: impl Into<Value>,
        flags: VarFlags,
    ) -> Result<TclObj> {
        let name = name.into();
        let value = value.into();
        if matches!(value, Value::Unset) {
            self.unset_nocomplain(name)?;
            return Ok(TclObj::null());
        }
        let ptr = self.check()?;
        let (p1, p2) = name.parts();
        let part1 = TclObj::new(p1)?;
        let part2 = p2.map(TclObj::new).transpose()?;
        let value = TclObj::new(value)?;
        let written = sys::obj_set_var2(
            ptr,
            part1.non_null()?,
            part2.as_ref().map(TclObj::non_null).transpose()?,
            value.non_null()?,
            flags.bits(),
        );
        match written {
            Some(p) => Ok(TclObj::from_raw(p)),
            None => {
                if flags.contains(VarFlags::LEAVE_ERR_MSG) {
                    return Err(self.var_failure("set", &name, flags));
                }
                Err(Error::Variable(format!("can't set \"{name}\"")))
            }
        }
    }

    /// Remove a variable; fails if it does not exist.
    pub fn unset(&self, name: impl Into<VarName>) -> Result<()> {
        self.unset_with(name, VarFlags::NONE)
    }

    /// Remove a variable if it exists.
    pub fn unset_nocomplain(&self, name: impl Into<VarName>) -> Result<()> {
        match self.unset(name) {
            Err(Error::Variable(_)) => Ok(()),
            other => other,
        }
    }

    pub fn unset_with(&self, name: impl Into<VarName>, flags: VarFlags) -> Result<()> {
        let ptr = self.check()?;
        let name = name.into();
        let (p1, p2) = name.parts();
        match sys::unset_var2(ptr, p1, p2, flags.bits()) {
            sys::Status::Ok => Ok(()),
            _ => Err(self.var_failure("unset", &name, flags)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
