//! Native interpreter contexts.
//!
//! Corresponds to `Tcl_Interp` plus the variable and evaluation entry points
//! of `tclBasic.c` and `tclVar.c`.  Interpreters live in a thread-local
//! registry: an [`InterpPtr`] is only meaningful on the thread that created
//! it, and touching it anywhere else panics the way the C library aborts.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use super::heap::{self, ObjPtr};
use super::photo::PhotoImage;
use super::{commands, enter, eval, notifier, parse, photo};

/// Opaque pointer to a native interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterpPtr(u32);

/// Completion code of a command or script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    Error = 1,
    Return = 2,
    Break = 3,
    Continue = 4,
}

// ── Variable flags (`TCL_GLOBAL_ONLY` …) ──────────────────────────────────────

pub const GLOBAL_ONLY: u32 = 1;
pub const NAMESPACE_ONLY: u32 = 2;
pub const APPEND_VALUE: u32 = 4;
pub const LIST_ELEMENT: u32 = 8;
pub const LEAVE_ERR_MSG: u32 = 0x200;

/// `Tcl_ObjCmdProc`: receives the interpreter and the command words (borrowed)
/// and leaves its result in the interpreter.
pub type ObjCmdProc = Rc<dyn Fn(InterpPtr, &[ObjPtr]) -> Status>;

#[derive(Debug)]
pub(super) enum Var {
    Scalar(ObjPtr),
    Array(BTreeMap<String, ObjPtr>),
}

pub(super) struct InterpData {
    vars: RefCell<HashMap<String, Var>>,
    result: Cell<ObjPtr>,
    commands: RefCell<HashMap<String, ObjCmdProc>>,
    pub(super) photos: RefCell<BTreeMap<String, PhotoImage>>,
    pub(super) tk_loaded: Cell<bool>,
    pub(super) image_seq: Cell<u32>,
}

thread_local! {
    static INTERPS: RefCell<HashMap<InterpPtr, Rc<InterpData>>> = RefCell::new(HashMap::new());
}

static NEXT_INTERP: AtomicU32 = AtomicU32::new(1);

pub(super) fn data(interp: InterpPtr) -> Rc<InterpData> {
    INTERPS
        .with(|m| m.borrow().get(&interp).cloned())
        .unwrap_or_else(|| {
            panic!("tcl: interpreter {interp:?} used outside its thread or after deletion")
        })
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// `Tcl_CreateInterp`.
pub fn create_interp() -> InterpPtr {
    enter();
    let ptr = InterpPtr(NEXT_INTERP.fetch_add(1, Ordering::Relaxed));
    let empty = heap::new_string_obj("");
    heap::incr_ref_count(empty);

    let mut table: HashMap<String, ObjCmdProc> = HashMap::new();
    for &(name, proc_) in commands::BUILTINS {
        table.insert(name.to_owned(), Rc::new(proc_));
    }

    let data = InterpData {
        vars: RefCell::new(HashMap::new()),
        result: Cell::new(empty),
        commands: RefCell::new(table),
        photos: RefCell::new(BTreeMap::new()),
        tk_loaded: Cell::new(false),
        image_seq: Cell::new(0),
    };
    INTERPS.with(|m| m.borrow_mut().insert(ptr, Rc::new(data)));
    ptr
}

/// `Tcl_DeleteInterp`.  Releases every variable, the result and all images.
pub fn delete_interp(interp: InterpPtr) {
    enter();
    let Some(data) = INTERPS.with(|m| m.borrow_mut().remove(&interp)) else {
        panic!("tcl: interpreter {interp:?} used outside its thread or after deletion");
    };
    notifier::forget_interp(interp);
    for (_, var) in data.vars.borrow_mut().drain() {
        release_var(var);
    }
    heap::decr_ref_count(data.result.get());
    data.commands.borrow_mut().clear();
    data.photos.borrow_mut().clear();
}

/// True if `interp` is alive on the calling thread.
pub fn interp_exists(interp: InterpPtr) -> bool {
    enter();
    INTERPS.with(|m| m.borrow().contains_key(&interp))
}

/// `Tcl_CreateObjCommand`.  Replaces any command of the same name.
pub fn create_obj_command(interp: InterpPtr, name: &str, proc_: ObjCmdProc) {
    enter();
    data(interp).commands.borrow_mut().insert(name.to_owned(), proc_);
}

/// `Tcl_DeleteCommand`.
pub fn delete_command(interp: InterpPtr, name: &str) -> bool {
    enter();
    data(interp).commands.borrow_mut().remove(name).is_some()
}

/// `Tk_Init`: registers the `image` command and marks the toolkit loaded.
pub fn init_tk(interp: InterpPtr) -> Status {
    enter();
    let d = data(interp);
    if d.tk_loaded.replace(true) {
        return Status::Ok;
    }
    d.commands
        .borrow_mut()
        .insert("image".to_owned(), Rc::new(photo::cmd_image));
    drop(d);
    let version = heap::new_string_obj("8.6");
    match set_var(interp, "tk_version", None, version, 0) {
        Ok(_) => Status::Ok,
        Err(msg) => {
            set_string_result(interp, &msg);
            Status::Error
        }
    }
}

// ── Result ────────────────────────────────────────────────────────────────────

/// `Tcl_GetObjResult`.  The object is borrowed from the interpreter.
pub fn get_obj_result(interp: InterpPtr) -> ObjPtr {
    enter();
    data(interp).result.get()
}

/// `Tcl_SetObjResult`.  Takes a reference to `obj`.
pub fn set_obj_result(interp: InterpPtr, obj: ObjPtr) {
    enter();
    let d = data(interp);
    heap::incr_ref_count(obj);
    let old = d.result.replace(obj);
    heap::decr_ref_count(old);
}

/// `Tcl_SetResult` with a string.
pub fn set_string_result(interp: InterpPtr, msg: &str) {
    set_obj_result(interp, heap::new_string_obj(msg));
}

/// `Tcl_ResetResult`.
pub fn reset_result(interp: InterpPtr) {
    set_obj_result(interp, heap::new_string_obj(""));
}

// ── Evaluation ────────────────────────────────────────────────────────────────

/// `Tcl_EvalObjv`.  The words are borrowed; the caller keeps them alive.
pub fn eval_objv(interp: InterpPtr, objv: &[ObjPtr], _flags: u32) -> Status {
    enter();
    let Some(&first) = objv.first() else {
        reset_result(interp);
        return Status::Ok;
    };
    let name = heap::get_string(first);
    let proc_ = data(interp).commands.borrow().get(&name).cloned();
    let Some(proc_) = proc_ else {
        set_string_result(interp, &format!("invalid command name \"{name}\""));
        return Status::Error;
    };
    heap::mark_cmd_name(first);
    reset_result(interp);
    proc_(interp, objv)
}

/// `Tcl_EvalEx`.
pub fn eval_ex(interp: InterpPtr, script: &str, _flags: u32) -> Status {
    enter();
    eval::eval_script(interp, script)
}

// ── Variables ─────────────────────────────────────────────────────────────────

fn split_array_ref(name: &str) -> (&str, Option<&str>) {
    if let Some(open) = name.find('(') {
        if name.ends_with(')') && open > 0 {
            return (&name[..open], Some(&name[open + 1..name.len() - 1]));
        }
    }
    (name, None)
}

fn display_name(name: &str, index: Option<&str>) -> String {
    match index {
        Some(i) => format!("{name}({i})"),
        None => name.to_owned(),
    }
}

/// Resolve a (possibly qualified) name to its global-namespace key.
fn resolve<'a>(part1: &'a str, part2: Option<&'a str>) -> Result<(&'a str, Option<&'a str>), &'static str> {
    let (name, index) = match part2 {
        Some(i) => (part1, Some(i)),
        None => split_array_ref(part1),
    };
    let name = name.strip_prefix("::").unwrap_or(name);
    if name.contains("::") {
        return Err("parent namespace doesn't exist");
    }
    Ok((name, index))
}

fn release_var(var: Var) {
    match var {
        Var::Scalar(p) => heap::decr_ref_count(p),
        Var::Array(elems) => elems.into_values().for_each(heap::decr_ref_count),
    }
}

pub(super) fn get_var(interp: InterpPtr, part1: &str, part2: Option<&str>) -> Result<ObjPtr, String> {
    let fail = |reason: &str| format!("can't read \"{}\": {reason}", display_name(part1, part2));
    let (name, index) = resolve(part1, part2).map_err(fail)?;
    let d = data(interp);
    let vars = d.vars.borrow();
    match (vars.get(name), index) {
        (None, _) => Err(fail("no such variable")),
        (Some(Var::Scalar(p)), None) => Ok(*p),
        (Some(Var::Scalar(_)), Some(_)) => Err(fail("variable isn't array")),
        (Some(Var::Array(_)), None) => Err(fail("variable is array")),
        (Some(Var::Array(elems)), Some(i)) => {
            elems.get(i).copied().ok_or_else(|| fail("no such element in array"))
        }
    }
}

/// Store `value` (taking a reference on success, freeing it on failure when
/// nobody holds it) and return the variable's new value.
pub(super) fn set_var(
    interp: InterpPtr,
    part1: &str,
    part2: Option<&str>,
    value: ObjPtr,
    flags: u32,
) -> Result<ObjPtr, String> {
    let result = store_var(interp, part1, part2, value, flags);
    if result.is_err() && heap::ref_count(value) <= 0 {
        heap::decr_ref_count(value);
    }
    result
}

fn store_var(
    interp: InterpPtr,
    part1: &str,
    part2: Option<&str>,
    value: ObjPtr,
    flags: u32,
) -> Result<ObjPtr, String> {
    let fail = |reason: &str| format!("can't set \"{}\": {reason}", display_name(part1, part2));
    let (name, index) = resolve(part1, part2).map_err(fail)?;
    let d = data(interp);
    let mut vars = d.vars.borrow_mut();

    let old = match (vars.get(name), index) {
        (None, _) => None,
        (Some(Var::Scalar(p)), None) => Some(*p),
        (Some(Var::Scalar(_)), Some(_)) => return Err(fail("variable isn't array")),
        (Some(Var::Array(_)), None) => return Err(fail("variable is array")),
        (Some(Var::Array(elems)), Some(i)) => elems.get(i).copied(),
    };

    let new = if flags & APPEND_VALUE != 0 {
        let target = match old {
            Some(p) if heap::ref_count(p) <= 1 => p,
            Some(p) => heap::duplicate_obj(p),
            None if flags & LIST_ELEMENT != 0 => heap::new_list_obj(&[]),
            None => heap::new_string_obj(""),
        };
        if flags & LIST_ELEMENT != 0 {
            if let Err(msg) = heap::list_append_element(target, value) {
                if Some(target) != old {
                    heap::decr_ref_count(target);
                }
                return Err(fail(&msg));
            }
        } else {
            let text = heap::get_string(value);
            heap::append_to_obj(target, &text);
            if heap::ref_count(value) <= 0 {
                heap::decr_ref_count(value);
            }
        }
        target
    } else if flags & LIST_ELEMENT != 0 {
        let quoted = heap::new_string_obj(&parse::quote_element(&heap::get_string(value)));
        if heap::ref_count(value) <= 0 {
            heap::decr_ref_count(value);
        }
        quoted
    } else {
        value
    };

    if Some(new) != old {
        heap::incr_ref_count(new);
        if let Some(old) = old {
            heap::decr_ref_count(old);
        }
        match index {
            None => {
                vars.insert(name.to_owned(), Var::Scalar(new));
            }
            Some(i) => {
                let entry = vars
                    .entry(name.to_owned())
                    .or_insert_with(|| Var::Array(BTreeMap::new()));
                if let Var::Array(elems) = entry {
                    elems.insert(i.to_owned(), new);
                }
            }
        }
    }
    Ok(new)
}

pub(super) fn unset_var(interp: InterpPtr, part1: &str, part2: Option<&str>) -> Result<(), String> {
    let fail = |reason: &str| format!("can't unset \"{}\": {reason}", display_name(part1, part2));
    let (name, index) = resolve(part1, part2).map_err(fail)?;
    let d = data(interp);
    let mut vars = d.vars.borrow_mut();
    match index {
        None => {
            let var = vars.remove(name).ok_or_else(|| fail("no such variable"))?;
            release_var(var);
        }
        Some(i) => match vars.get_mut(name) {
            None => return Err(fail("no such variable")),
            Some(Var::Scalar(_)) => return Err(fail("variable isn't array")),
            Some(Var::Array(elems)) => {
                let p = elems.remove(i).ok_or_else(|| fail("no such element in array"))?;
                heap::decr_ref_count(p);
            }
        },
    }
    Ok(())
}

/// `Tcl_ObjGetVar2`.  The name parts are borrowed: no reference is taken or
/// released on them.  The returned value is borrowed from the variable.
pub fn obj_get_var2(interp: InterpPtr, part1: ObjPtr, part2: Option<ObjPtr>, flags: u32) -> Option<ObjPtr> {
    enter();
    let p1 = heap::get_string(part1);
    let p2 = part2.map(heap::get_string);
    match get_var(interp, &p1, p2.as_deref()) {
        Ok(p) => Some(p),
        Err(msg) => {
            if flags & LEAVE_ERR_MSG != 0 {
                set_string_result(interp, &msg);
            }
            None
        }
    }
}

/// `Tcl_ObjSetVar2`.  The name parts are borrowed; `value` gains the
/// variable's reference on success and is freed on failure if nothing else
/// holds it.  Returns the variable's value after the write.
pub fn obj_set_var2(
    interp: InterpPtr,
    part1: ObjPtr,
    part2: Option<ObjPtr>,
    value: ObjPtr,
    flags: u32,
) -> Option<ObjPtr> {
    enter();
    let p1 = heap::get_string(part1);
    let p2 = part2.map(heap::get_string);
    match set_var(interp, &p1, p2.as_deref(), value, flags) {
        Ok(p) => Some(p),
        Err(msg) => {
            if flags & LEAVE_ERR_MSG != 0 {
                set_string_result(interp, &msg);
            }
            None
        }
    }
}

/// `Tcl_UnsetVar2`.
pub fn unset_var2(interp: InterpPtr, part1: &str, part2: Option<&str>, flags: u32) -> Status {
    enter();
    match unset_var(interp, part1, part2) {
        Ok(()) => Status::Ok,
        Err(msg) => {
            if flags & LEAVE_ERR_MSG != 0 {
                set_string_result(interp, &msg);
            }
            Status::Error
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
