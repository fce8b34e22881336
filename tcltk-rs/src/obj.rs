//! Reference-counted object handles.
//!
//! A [`TclObj`] holds one reference to a native object for as long as it
//! lives.  Cloning aliases the same object (count + 1); mutation goes through
//! copy-on-write so a shared object is never changed in place.
//!
//! | Rust source                          | Native representation          |
//! |--------------------------------------|--------------------------------|
//! | `&str`, `String`                     | string                         |
//! | `bool`, integers up to `i64::MAX`    | wide integer                   |
//! | `u64` above `i64::MAX`               | decimal string                 |
//! | `f32`, `f64`                         | double                         |
//! | `&[u8]`, [`Bytes`]                   | bytearray                      |
//! | `Vec<T>`, tuples of 2–4              | list, elements converted       |
//! | `TclObj`                             | the same object, aliased       |

use std::fmt;

use crate::error::{Error, Result};
use crate::sys::{self, ObjPtr};
use crate::types::{tag_of, TypeTag};

// ── Values ────────────────────────────────────────────────────────────────────

/// Owned binary payload, stored natively as a bytearray.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bytes(pub Vec<u8>);

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Bytes(v)
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A Rust value about to become a native object.
#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    Bool(bool),
    Int(i64),
    Double(f64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// An existing object, passed through as an alias.
    Obj(TclObj),
    /// Marker meaning "no value".  Setting a variable to it unsets the
    /// variable; it cannot become an object.
    Unset,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {$(
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        }
    )*};
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<isize> for Value {
    fn from(v: isize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Str(v.to_string()),
        }
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::from(v as u64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Double(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b.0)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

macro_rules! value_from_tuple {
    ($($name:ident),+) => {
        impl<$($name: Into<Value>),+> From<($($name,)+)> for Value {
            #[allow(non_snake_case)]
            fn from(($($name,)+): ($($name,)+)) -> Self {
                Value::List(vec![$($name.into()),+])
            }
        }
    };
}

value_from_tuple!(A, B);
value_from_tuple!(A, B, C);
value_from_tuple!(A, B, C, D);

impl From<TclObj> for Value {
    fn from(o: TclObj) -> Self {
        Value::Obj(o)
    }
}

impl From<&TclObj> for Value {
    fn from(o: &TclObj) -> Self {
        Value::Obj(o.clone())
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Owning handle to a native object, or the null handle.
pub struct TclObj {
    ptr: Option<ObjPtr>,
}

impl TclObj {
    /// Build a new object from `value`.
    pub fn new(value: impl Into<Value>) -> Result<Self> {
        Self::from_value(value.into())
    }

    fn from_value(value: Value) -> Result<Self> {
        let ptr = match value {
            Value::Str(s) => sys::new_string_obj(&s),
            Value::Bool(b) => sys::new_boolean_obj(b),
            Value::Int(i) => sys::new_wide_int_obj(i),
            Value::Double(d) => sys::new_double_obj(d),
            Value::Bytes(b) => sys::new_byte_array_obj(&b),
            Value::List(items) => {
                // Elements are held until the list owns them; an early return
                // drops (and frees) whatever was already built.
                let elems = items
                    .into_iter()
                    .map(Self::from_value)
                    .collect::<Result<Vec<_>>>()?;
                let ptrs: Vec<ObjPtr> = elems.iter().filter_map(TclObj::as_ptr).collect();
                sys::new_list_obj(&ptrs)
            }
            Value::Obj(o) => return o.non_null().map(|_| o),
            Value::Unset => {
                return Err(Error::Construct("the unset marker has no object form".to_owned()))
            }
        };
        Ok(Self::from_raw(ptr))
    }

    /// The null handle.
    pub const fn null() -> Self {
        Self { ptr: None }
    }

    /// Take a new reference to a native object.
    pub fn from_raw(ptr: ObjPtr) -> Self {
        sys::incr_ref_count(ptr);
        Self { ptr: Some(ptr) }
    }

    /// The native pointer, borrowed.
    pub fn as_ptr(&self) -> Option<ObjPtr> {
        self.ptr
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    pub(crate) fn non_null(&self) -> Result<ObjPtr> {
        self.ptr.ok_or(Error::NullHandle("object"))
    }

    /// Native reference count, or −1 for the null handle.
    pub fn ref_count(&self) -> i32 {
        self.ptr.map_or(-1, sys::ref_count)
    }

    /// True if another holder shares the object.
    pub fn is_shared(&self) -> bool {
        self.ref_count() > 1
    }

    /// Current internal representation.
    pub fn type_tag(&self) -> TypeTag {
        match self.ptr {
            None => TypeTag::Null,
            Some(p) => tag_of(sys::obj_type(p)),
        }
    }

    /// Convert to a Rust value.
    pub fn get<T: FromObj>(&self) -> Result<T> {
        T::from_obj(self)
    }

    /// Independent copy with the same representation.
    pub fn duplicate(&self) -> Result<Self> {
        let p = self.non_null()?;
        Ok(Self::from_raw(sys::duplicate_obj(p)))
    }

    /// Independent copy if shared, otherwise another alias.
    pub fn duplicate_if_shared(&self) -> Result<Self> {
        if self.is_shared() {
            self.duplicate()
        } else {
            self.non_null()?;
            Ok(self.clone())
        }
    }

    /// Release the reference now.  Idempotent.
    pub fn dispose(&mut self) {
        if let Some(p) = self.ptr.take() {
            sys::decr_ref_count(p);
        }
    }

    /// Make `self` the sole holder before an in-place change.
    fn make_unshared(&mut self) -> Result<ObjPtr> {
        if self.is_shared() {
            *self = self.duplicate()?;
        }
        self.non_null()
    }

    // ── Lists ─────────────────────────────────────────────────────────────

    fn list_err(&self, p: ObjPtr) -> Error {
        Error::conversion(&sys::get_string(p), "list")
    }

    /// Number of list elements.
    pub fn llength(&self) -> Result<usize> {
        let p = self.non_null()?;
        sys::list_length(p).map_err(|_| self.list_err(p))
    }

    /// Element at 0-based `index`; `None` when out of range.
    pub fn lindex(&self, index: i64) -> Result<Option<TclObj>> {
        let p = self.non_null()?;
        let Ok(i) = usize::try_from(index) else {
            sys::list_length(p).map_err(|_| self.list_err(p))?;
            return Ok(None);
        };
        let elem = sys::list_index(p, i).map_err(|_| self.list_err(p))?;
        Ok(elem.map(TclObj::from_raw))
    }

    /// Elements `first..=last`.  Positions outside the list are skipped.
    pub fn lrange(&self, first: i64, last: i64) -> Result<Vec<TclObj>> {
        let p = self.non_null()?;
        let elems = sys::list_elements(p).map_err(|_| self.list_err(p))?;
        Ok((first.max(0)..=last)
            .filter_map(|i| usize::try_from(i).ok())
            .map_while(|i| elems.get(i).copied())
            .map(TclObj::from_raw)
            .collect())
    }

    /// All elements.
    pub fn elements(&self) -> Result<Vec<TclObj>> {
        let p = self.non_null()?;
        let elems = sys::list_elements(p).map_err(|_| self.list_err(p))?;
        Ok(elems.into_iter().map(TclObj::from_raw).collect())
    }

    /// Append a list element, duplicating first if shared.
    pub fn lappend(&mut self, value: impl Into<Value>) -> Result<()> {
        let elem = TclObj::new(value)?;
        let p = self.make_unshared()?;
        sys::list_append_element(p, elem.non_null()?).map_err(|_| self.list_err(p))
    }

    /// Append text to the string form, duplicating first if shared.
    pub fn append_str(&mut self, text: &str) -> Result<()> {
        let p = self.make_unshared()?;
        sys::append_to_obj(p, text);
        Ok(())
    }
}

impl Default for TclObj {
    fn default() -> Self {
        Self::null()
    }
}

impl Clone for TclObj {
    fn clone(&self) -> Self {
        match self.ptr {
            Some(p) => Self::from_raw(p),
            None => Self::null(),
        }
    }
}

impl Drop for TclObj {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Display for TclObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ptr {
            Some(p) => f.write_str(&sys::get_string(p)),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for TclObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ptr {
            Some(p) => write!(f, "TclObj({} {:?})", self.type_tag(), sys::get_string(p)),
            None => f.write_str("TclObj(null)"),
        }
    }
}

impl PartialEq for TclObj {
    fn eq(&self, other: &Self) -> bool {
        match (self.ptr, other.ptr) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b || sys::get_string(a) == sys::get_string(b),
            _ => false,
        }
    }
}

impl PartialEq<str> for TclObj {
    fn eq(&self, other: &str) -> bool {
        self.ptr.is_some_and(|p| sys::get_string(p) == other)
    }
}

impl PartialEq<&str> for TclObj {
    fn eq(&self, other: &&str) -> bool {
        *self == **other
    }
}

/// Quote `s` so it is read back as exactly one word.
pub fn quote(s: &str) -> String {
    sys::quote_element(s)
}

// ── Conversion ────────────────────────────────────────────────────────────────

/// Types an object can be converted to.
pub trait FromObj: Sized {
    /// Name used in conversion errors.
    const TYPE_NAME: &'static str;

    fn from_obj(obj: &TclObj) -> Result<Self>;
}

fn conversion_failed<T: FromObj>(p: ObjPtr) -> Error {
    Error::conversion(&sys::get_string(p), T::TYPE_NAME)
}

impl FromObj for () {
    const TYPE_NAME: &'static str = "nothing";

    fn from_obj(_: &TclObj) -> Result<Self> {
        Ok(())
    }
}

impl FromObj for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_obj(obj: &TclObj) -> Result<Self> {
        let p = obj.non_null()?;
        sys::get_boolean(p).map_err(|_| conversion_failed::<Self>(p))
    }
}

macro_rules! from_obj_int {
    ($($t:ty),*) => {$(
        impl FromObj for $t {
            const TYPE_NAME: &'static str = stringify!($t);

            fn from_obj(obj: &TclObj) -> Result<Self> {
                let p = obj.non_null()?;
                sys::get_wide_int(p)
                    .ok()
                    .and_then(|v| <$t>::try_from(v).ok())
                    .ok_or_else(|| conversion_failed::<Self>(p))
            }
        }
    )*};
}

from_obj_int!(i8, i16, i32, i64, isize, u8, u16, u32, usize);

impl FromObj for u64 {
    const TYPE_NAME: &'static str = "u64";

    fn from_obj(obj: &TclObj) -> Result<Self> {
        let p = obj.non_null()?;
        if let Ok(v) = sys::get_wide_int(p) {
            return u64::try_from(v).map_err(|_| conversion_failed::<Self>(p));
        }
        sys::get_string(p)
            .trim()
            .parse()
            .map_err(|_| conversion_failed::<Self>(p))
    }
}

impl FromObj for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn from_obj(obj: &TclObj) -> Result<Self> {
        let p = obj.non_null()?;
        sys::get_double(p).map_err(|_| conversion_failed::<Self>(p))
    }
}

impl FromObj for f32 {
    const TYPE_NAME: &'static str = "f32";

    fn from_obj(obj: &TclObj) -> Result<Self> {
        let p = obj.non_null()?;
        sys::get_double(p)
            .map(|v| v as f32)
            .map_err(|_| conversion_failed::<Self>(p))
    }
}

impl FromObj for String {
    const TYPE_NAME: &'static str = "string";

    fn from_obj(obj: &TclObj) -> Result<Self> {
        Ok(sys::get_string(obj.non_null()?))
    }
}

impl FromObj for Bytes {
    const TYPE_NAME: &'static str = "bytes";

    fn from_obj(obj: &TclObj) -> Result<Self> {
        let p = obj.non_null()?;
        if obj.type_tag() == TypeTag::ByteArray {
            Ok(Bytes(sys::get_byte_array(p)))
        } else {
            Ok(Bytes(sys::get_string(p).into_bytes()))
        }
    }
}

impl<T: FromObj> FromObj for Vec<T> {
    const TYPE_NAME: &'static str = "list";

    fn from_obj(obj: &TclObj) -> Result<Self> {
        obj.elements()?.iter().map(T::from_obj).collect()
    }
}

impl FromObj for TclObj {
    const TYPE_NAME: &'static str = "object";

    fn from_obj(obj: &TclObj) -> Result<Self> {
        obj.non_null()?;
        Ok(obj.clone())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_holds_one_reference() {
        let o = TclObj::new("hello").unwrap();
        assert_eq!(o.ref_count(), 1);
        assert_eq!(o.type_tag(), TypeTag::String);
        let alias = o.clone();
        assert_eq!(o.ref_count(), 2);
        assert!(alias.is_shared());
    }

    #[test]
    fn scalar_round_trips() {
        assert!(TclObj::new(true).unwrap().get::<bool>().unwrap());
        assert_eq!(TclObj::new(-5i32).unwrap().get::<i64>().unwrap(), -5);
        assert_eq!(TclObj::new(2.5f64).unwrap().get::<f64>().unwrap(), 2.5);
        assert_eq!(TclObj::new("x y").unwrap().get::<String>().unwrap(), "x y");
    }

    #[test]
    fn big_u64_is_decimal_string() {
        let o = TclObj::new(u64::MAX).unwrap();
        assert_eq!(o.type_tag(), TypeTag::String);
        assert_eq!(o.get::<u64>().unwrap(), u64::MAX);
        assert!(o.get::<i64>().is_err());
    }

    #[test]
    fn integer_range_is_checked() {
        let o = TclObj::new(300).unwrap();
        assert!(matches!(o.get::<u8>(), Err(Error::Conversion { target: "u8", .. })));
        assert_eq!(o.get::<u16>().unwrap(), 300);
        assert!(TclObj::new(-1).unwrap().get::<u32>().is_err());
    }

    #[test]
    fn fractional_string_rejected_as_integer() {
        let o = TclObj::new("-17.0").unwrap();
        assert!(o.get::<i32>().is_err());
        assert_eq!(o.get::<f64>().unwrap(), -17.0);
    }

    #[test]
    fn conversion_leaves_count_alone() {
        let o = TclObj::new("42").unwrap();
        let _: i64 = o.get().unwrap();
        let _: Vec<String> = o.get().unwrap();
        assert_eq!(o.ref_count(), 1);
    }

    #[test]
    fn null_handle_cannot_convert() {
        let o = TclObj::null();
        assert_eq!(o.ref_count(), -1);
        assert_eq!(o.type_tag(), TypeTag::Null);
        assert!(matches!(o.get::<String>(), Err(Error::NullHandle(_))));
        assert!(o.get::<()>().is_ok());
    }

    #[test]
    fn dispose_is_idempotent() {
        let before = sys::live_objects();
        let mut o = TclObj::new("gone").unwrap();
        o.dispose();
        o.dispose();
        assert!(o.is_null());
        assert_eq!(sys::live_objects(), before);
        assert!(matches!(o.get::<i64>(), Err(Error::NullHandle(_))));
    }

    #[test]
    fn unset_marker_is_not_an_object() {
        assert!(matches!(TclObj::new(Value::Unset), Err(Error::Construct(_))));
    }

    #[test]
    fn failed_list_build_releases_elements() {
        let before = sys::live_objects();
        let value = Value::List(vec![Value::from("a"), Value::from(1), Value::Unset]);
        assert!(TclObj::new(value).is_err());
        assert_eq!(sys::live_objects(), before);
    }

    #[test]
    fn tuples_and_vectors_become_lists() {
        let o = TclObj::new(("a b", 2, 3.5)).unwrap();
        assert_eq!(o.type_tag(), TypeTag::List);
        assert_eq!(o.to_string(), "{a b} 2 3.5");
        let v: Vec<i64> = TclObj::new(vec![1, 2, 3]).unwrap().get().unwrap();
        assert_eq!(v, [1, 2, 3]);
    }

    #[test]
    fn bytes_payload() {
        let raw: &[u8] = &[0, 159, 255];
        let o = TclObj::new(raw).unwrap();
        assert_eq!(o.type_tag(), TypeTag::ByteArray);
        assert_eq!(o.get::<Bytes>().unwrap().0, raw);
        let s = TclObj::new("hé").unwrap();
        assert_eq!(s.get::<Bytes>().unwrap().0, "hé".as_bytes());
    }

    #[test]
    fn equality_by_string_form() {
        let a = TclObj::new(10).unwrap();
        let b = TclObj::new("10").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "10");
        assert!(a != TclObj::null());
    }

    #[test]
    fn list_indexing() {
        let o = TclObj::new(vec!["a", "b", "c"]).unwrap();
        assert_eq!(o.llength().unwrap(), 3);
        assert_eq!(o.lindex(1).unwrap().unwrap(), "b");
        assert!(o.lindex(3).unwrap().is_none());
        assert!(o.lindex(-1).unwrap().is_none());
        let r = o.lrange(-2, 7).unwrap();
        assert_eq!(r.len(), 3);
        assert!(o.lrange(2, 1).unwrap().is_empty());
    }

    #[test]
    fn lappend_copies_shared() {
        let mut a = TclObj::new(vec!["x"]).unwrap();
        let b = a.clone();
        a.lappend("y").unwrap();
        assert_eq!(a.to_string(), "x y");
        assert_eq!(b.to_string(), "x");
        assert_eq!(b.ref_count(), 1);
        assert_eq!(a.ref_count(), 1);
    }

    #[test]
    fn append_str_in_place_when_unshared() {
        let mut a = TclObj::new("ab").unwrap();
        let before = a.as_ptr();
        a.append_str("cd").unwrap();
        assert_eq!(a.as_ptr(), before);
        assert_eq!(a, "abcd");
    }

    #[test]
    fn duplicate_if_shared() {
        let a = TclObj::new(1).unwrap();
        let alias = a.duplicate_if_shared().unwrap();
        assert_eq!(alias.as_ptr(), a.as_ptr());
        let copy = a.duplicate_if_shared().unwrap();
        assert_ne!(copy.as_ptr(), a.as_ptr());
        assert_eq!(copy.type_tag(), TypeTag::Int);
    }

    #[test]
    fn quote_words() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("two words"), "{two words}");
    }
}
