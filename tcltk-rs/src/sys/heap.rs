//! Native object heap.
//!
//! Corresponds to `Tcl_Obj` and the object API in `tclObj.c`.  Each object
//! carries a reference count, an optional string representation and an
//! optional internal representation tagged by an [`ObjType`].  Objects start
//! at count 0 and are freed when a decrement leaves the count at or below
//! zero.  Slots are generation-checked so a stale [`ObjPtr`] is detected
//! instead of silently reading a recycled object.

use std::cell::Cell;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use super::enter;
use super::parse::{quote_element, split_list};

/// Opaque pointer to a native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjPtr {
    index: u32,
    generation: u32,
}

/// Native type descriptor (`Tcl_ObjType`).  Compared by address.
#[derive(Debug)]
pub struct ObjType {
    pub name: &'static str,
}

pub static INT_TYPE: ObjType = ObjType { name: "int" };
pub static DOUBLE_TYPE: ObjType = ObjType { name: "double" };
pub static BOOLEAN_TYPE: ObjType = ObjType { name: "booleanString" };
pub static BYTE_ARRAY_TYPE: ObjType = ObjType { name: "bytearray" };
pub static LIST_TYPE: ObjType = ObjType { name: "list" };
pub static CMD_NAME_TYPE: ObjType = ObjType { name: "cmdName" };

#[derive(Debug, Clone)]
enum Rep {
    None,
    Int(i64),
    Double(f64),
    Boolean(bool),
    ByteArray(Vec<u8>),
    List(Vec<ObjPtr>),
    CmdName,
}

#[derive(Debug)]
struct Obj {
    ref_count: i32,
    bytes: Option<String>,
    rep: Rep,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    obj: Option<Obj>,
}

#[derive(Debug, Default)]
struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

static HEAP: OnceLock<Mutex<Heap>> = OnceLock::new();

thread_local! {
    static LIVE: Cell<i64> = const { Cell::new(0) };
}

fn heap() -> MutexGuard<'static, Heap> {
    HEAP.get_or_init(Mutex::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

impl Heap {
    fn alloc(&mut self, bytes: Option<String>, rep: Rep) -> ObjPtr {
        LIVE.with(|c| c.set(c.get() + 1));
        let obj = Obj { ref_count: 0, bytes, rep };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.obj = Some(obj);
            ObjPtr { index, generation: slot.generation }
        } else {
            let index = u32::try_from(self.slots.len()).expect("tcl: object heap exhausted");
            self.slots.push(Slot { generation: 0, obj: Some(obj) });
            ObjPtr { index, generation: 0 }
        }
    }

    fn obj(&self, p: ObjPtr) -> &Obj {
        self.slots
            .get(p.index as usize)
            .filter(|s| s.generation == p.generation)
            .and_then(|s| s.obj.as_ref())
            .unwrap_or_else(|| panic!("tcl: use of freed object {p:?}"))
    }

    fn obj_mut(&mut self, p: ObjPtr) -> &mut Obj {
        self.slots
            .get_mut(p.index as usize)
            .filter(|s| s.generation == p.generation)
            .and_then(|s| s.obj.as_mut())
            .unwrap_or_else(|| panic!("tcl: use of freed object {p:?}"))
    }

    fn incr(&mut self, p: ObjPtr) {
        self.obj_mut(p).ref_count += 1;
    }

    /// Decrement, freeing the object (and releasing list elements) at ≤ 0.
    fn decr(&mut self, p: ObjPtr) {
        let mut pending = vec![p];
        while let Some(p) = pending.pop() {
            let obj = self.obj_mut(p);
            obj.ref_count -= 1;
            if obj.ref_count > 0 {
                continue;
            }
            let slot = &mut self.slots[p.index as usize];
            let freed = slot.obj.take();
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(p.index);
            LIVE.with(|c| c.set(c.get() - 1));
            if let Some(Obj { rep: Rep::List(elems), .. }) = freed {
                pending.extend(elems);
            }
        }
    }

    /// Replace the internal rep, releasing list elements held by the old one.
    fn set_rep(&mut self, p: ObjPtr, rep: Rep) {
        let old = std::mem::replace(&mut self.obj_mut(p).rep, rep);
        if let Rep::List(elems) = old {
            for e in elems {
                self.decr(e);
            }
        }
    }

    fn string_of(&mut self, p: ObjPtr) -> String {
        if let Some(bytes) = &self.obj(p).bytes {
            return bytes.clone();
        }
        let s = match self.obj(p).rep.clone() {
            Rep::None | Rep::CmdName => String::new(),
            Rep::Int(v) => v.to_string(),
            Rep::Double(v) => format_double(v),
            Rep::Boolean(b) => u8::from(b).to_string(),
            Rep::ByteArray(bytes) => bytes.iter().map(|&b| char::from(b)).collect(),
            Rep::List(elems) => {
                let parts: Vec<String> = elems
                    .iter()
                    .map(|&e| quote_element(&self.string_of(e)))
                    .collect();
                parts.join(" ")
            }
        };
        self.obj_mut(p).bytes = Some(s.clone());
        s
    }

    fn set_list_from_any(&mut self, p: ObjPtr) -> Result<(), String> {
        if matches!(self.obj(p).rep, Rep::List(_)) {
            return Ok(());
        }
        let s = self.string_of(p);
        let elems = split_list(&s)?
            .into_iter()
            .map(|e| {
                let ptr = self.alloc(Some(e), Rep::None);
                self.incr(ptr);
                ptr
            })
            .collect();
        self.set_rep(p, Rep::List(elems));
        Ok(())
    }

    /// Converts `p` to a list if needed and borrows its elements.
    fn list_of(&mut self, p: ObjPtr) -> Result<&[ObjPtr], String> {
        self.set_list_from_any(p)?;
        match &self.obj(p).rep {
            Rep::List(elems) => Ok(elems.as_slice()),
            _ => Err("expected list value".to_owned()),
        }
    }

    fn assert_unshared(&self, p: ObjPtr, what: &str) {
        if self.obj(p).ref_count > 1 {
            panic!("tcl: {what} called with shared object");
        }
    }
}

/// Format a double the way the string rep does: shortest round-trip digits,
/// always recognisable as floating point.
fn format_double(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_owned()
    } else if v.is_infinite() {
        let s = if v > 0.0 { "Inf" } else { "-Inf" };
        s.to_owned()
    } else {
        format!("{v:?}")
    }
}

pub(super) fn parse_wide(s: &str) -> Option<i64> {
    let t = s.trim();
    let (negative, digits) = match t.as_bytes().first()? {
        b'-' => (true, &t[1..]),
        b'+' => (false, &t[1..]),
        _ => (false, t),
    };
    let (radix, body) = match digits.get(..2) {
        Some("0x" | "0X") => (16, &digits[2..]),
        Some("0o" | "0O") => (8, &digits[2..]),
        Some("0b" | "0B") => (2, &digits[2..]),
        _ => (10, digits),
    };
    if body.is_empty() || !body.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = u64::from_str_radix(body, radix).ok()?;
    if negative {
        if magnitude == 1 << 63 {
            Some(i64::MIN)
        } else {
            i64::try_from(magnitude).ok().map(|m| -m)
        }
    } else {
        i64::try_from(magnitude).ok()
    }
}

fn parse_double(s: &str) -> Option<f64> {
    if let Some(v) = parse_wide(s) {
        return Some(v as f64);
    }
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok()
}

fn parse_boolean(s: &str) -> Option<bool> {
    if let Some(v) = parse_double(s) {
        return if v.is_nan() { None } else { Some(v != 0.0) };
    }
    let lower = s.trim().to_ascii_lowercase();
    if lower.is_empty() || lower == "o" {
        return None;
    }
    if ["yes", "true", "on"].iter().any(|w| w.starts_with(&lower)) {
        Some(true)
    } else if ["no", "false", "off"].iter().any(|w| w.starts_with(&lower)) {
        Some(false)
    } else {
        None
    }
}

// ── Constructors ──────────────────────────────────────────────────────────────

/// `Tcl_NewStringObj`.
pub fn new_string_obj(s: &str) -> ObjPtr {
    enter();
    heap().alloc(Some(s.to_owned()), Rep::None)
}

/// `Tcl_NewWideIntObj`.
pub fn new_wide_int_obj(v: i64) -> ObjPtr {
    enter();
    heap().alloc(None, Rep::Int(v))
}

/// `Tcl_NewDoubleObj`.
pub fn new_double_obj(v: f64) -> ObjPtr {
    enter();
    heap().alloc(None, Rep::Double(v))
}

/// `Tcl_NewBooleanObj`: an integer object holding 0 or 1.
pub fn new_boolean_obj(b: bool) -> ObjPtr {
    enter();
    heap().alloc(None, Rep::Int(i64::from(b)))
}

/// `Tcl_NewByteArrayObj`.
pub fn new_byte_array_obj(bytes: &[u8]) -> ObjPtr {
    enter();
    heap().alloc(None, Rep::ByteArray(bytes.to_vec()))
}

/// `Tcl_NewListObj`.  Takes a reference to every element.
pub fn new_list_obj(elems: &[ObjPtr]) -> ObjPtr {
    enter();
    let mut h = heap();
    for &e in elems {
        h.incr(e);
    }
    h.alloc(None, Rep::List(elems.to_vec()))
}

/// `Tcl_DuplicateObj`: an unshared copy with the same string and internal
/// representation.
pub fn duplicate_obj(p: ObjPtr) -> ObjPtr {
    enter();
    let mut h = heap();
    let (bytes, rep) = {
        let obj = h.obj(p);
        (obj.bytes.clone(), obj.rep.clone())
    };
    if let Rep::List(elems) = &rep {
        for &e in elems {
            h.incr(e);
        }
    }
    h.alloc(bytes, rep)
}

// ── Reference counting ────────────────────────────────────────────────────────

/// `Tcl_IncrRefCount`.
pub fn incr_ref_count(p: ObjPtr) {
    enter();
    heap().incr(p);
}

/// `Tcl_DecrRefCount`.  Frees the object when the count drops to ≤ 0.
pub fn decr_ref_count(p: ObjPtr) {
    enter();
    heap().decr(p);
}

/// Current reference count.
pub fn ref_count(p: ObjPtr) -> i32 {
    enter();
    heap().obj(p).ref_count
}

/// `Tcl_IsShared`.
pub fn is_shared(p: ObjPtr) -> bool {
    ref_count(p) > 1
}

/// Objects allocated minus objects freed by the calling thread.
pub fn live_objects() -> i64 {
    LIVE.with(Cell::get)
}

// ── Accessors ─────────────────────────────────────────────────────────────────

/// The object's current type descriptor; `None` for a pure string.
pub fn obj_type(p: ObjPtr) -> Option<&'static ObjType> {
    enter();
    match heap().obj(p).rep {
        Rep::None => None,
        Rep::Int(_) => Some(&INT_TYPE),
        Rep::Double(_) => Some(&DOUBLE_TYPE),
        Rep::Boolean(_) => Some(&BOOLEAN_TYPE),
        Rep::ByteArray(_) => Some(&BYTE_ARRAY_TYPE),
        Rep::List(_) => Some(&LIST_TYPE),
        Rep::CmdName => Some(&CMD_NAME_TYPE),
    }
}

/// `Tcl_GetString`, generating the string rep if needed.
pub fn get_string(p: ObjPtr) -> String {
    enter();
    heap().string_of(p)
}

/// `Tcl_GetByteArrayFromObj`.  Non-bytearray objects contribute the low byte
/// of each character.
pub fn get_byte_array(p: ObjPtr) -> Vec<u8> {
    enter();
    let mut h = heap();
    if let Rep::ByteArray(bytes) = &h.obj(p).rep {
        return bytes.clone();
    }
    let bytes: Vec<u8> = h.string_of(p).chars().map(|c| c as u32 as u8).collect();
    h.set_rep(p, Rep::ByteArray(bytes.clone()));
    bytes
}

/// `Tcl_GetWideIntFromObj`.
pub fn get_wide_int(p: ObjPtr) -> Result<i64, String> {
    enter();
    let mut h = heap();
    if let Rep::Int(v) = h.obj(p).rep {
        return Ok(v);
    }
    let s = h.string_of(p);
    match parse_wide(&s) {
        Some(v) => {
            h.set_rep(p, Rep::Int(v));
            Ok(v)
        }
        None => Err(format!("expected integer but got \"{s}\"")),
    }
}

/// `Tcl_GetDoubleFromObj`.
pub fn get_double(p: ObjPtr) -> Result<f64, String> {
    enter();
    let mut h = heap();
    match h.obj(p).rep {
        Rep::Double(v) => return Ok(v),
        Rep::Int(v) => return Ok(v as f64),
        _ => {}
    }
    let s = h.string_of(p);
    match parse_double(&s) {
        Some(v) => {
            if matches!(h.obj(p).rep, Rep::None) {
                h.set_rep(p, Rep::Double(v));
            }
            Ok(v)
        }
        None => Err(format!("expected floating-point number but got \"{s}\"")),
    }
}

/// `Tcl_GetBooleanFromObj`.
pub fn get_boolean(p: ObjPtr) -> Result<bool, String> {
    enter();
    let mut h = heap();
    match h.obj(p).rep {
        Rep::Boolean(b) => return Ok(b),
        Rep::Int(v) => return Ok(v != 0),
        Rep::Double(v) if !v.is_nan() => return Ok(v != 0.0),
        _ => {}
    }
    let s = h.string_of(p);
    match parse_boolean(&s) {
        Some(b) => {
            if matches!(h.obj(p).rep, Rep::None) {
                h.set_rep(p, Rep::Boolean(b));
            }
            Ok(b)
        }
        None => Err(format!("expected boolean value but got \"{s}\"")),
    }
}

// ── Lists ─────────────────────────────────────────────────────────────────────

/// `Tcl_ListObjLength`.
pub fn list_length(p: ObjPtr) -> Result<usize, String> {
    enter();
    let mut h = heap();
    h.list_of(p).map(<[ObjPtr]>::len)
}

/// `Tcl_ListObjIndex`.  The element is borrowed; no reference is taken.
pub fn list_index(p: ObjPtr, index: usize) -> Result<Option<ObjPtr>, String> {
    enter();
    let mut h = heap();
    h.list_of(p).map(|elems| elems.get(index).copied())
}

/// `Tcl_ListObjGetElements`.  Elements are borrowed.
pub fn list_elements(p: ObjPtr) -> Result<Vec<ObjPtr>, String> {
    enter();
    let mut h = heap();
    h.list_of(p).map(<[ObjPtr]>::to_vec)
}

/// `Tcl_ListObjAppendElement`.  Takes a reference to `elem`.
///
/// # Panics
///
/// Panics if `list` is shared.
pub fn list_append_element(list: ObjPtr, elem: ObjPtr) -> Result<(), String> {
    enter();
    let mut h = heap();
    h.assert_unshared(list, "Tcl_ListObjAppendElement");
    let _ = h.obj(elem);
    h.set_list_from_any(list)?;
    h.incr(elem);
    let obj = h.obj_mut(list);
    if let Rep::List(elems) = &mut obj.rep {
        elems.push(elem);
    }
    obj.bytes = None;
    Ok(())
}

/// `Tcl_AppendToObj`.
///
/// # Panics
///
/// Panics if `p` is shared.
pub fn append_to_obj(p: ObjPtr, text: &str) {
    enter();
    let mut h = heap();
    h.assert_unshared(p, "Tcl_AppendToObj");
    let mut s = h.string_of(p);
    s.push_str(text);
    h.set_rep(p, Rep::None);
    h.obj_mut(p).bytes = Some(s);
}

/// Cache a command-name lookup on a word, the way `Tcl_EvalObjv` does.
pub(super) fn mark_cmd_name(p: ObjPtr) {
    let mut h = heap();
    if matches!(h.obj(p).rep, Rep::None) {
        h.string_of(p);
        h.set_rep(p, Rep::CmdName);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
