//! The native Tcl/Tk contract.
//!
//! Everything the binding layer needs from the C library lives behind the
//! functions re-exported here: object lifecycle (`Tcl_NewObj`,
//! `Tcl_IncrRefCount`, `Tcl_GetWideIntFromObj`, …), interpreter lifecycle and
//! evaluation (`Tcl_CreateInterp`, `Tcl_EvalObjv`, `Tcl_ObjGetVar2`, …), the
//! notifier (`Tcl_DoOneEvent`) and photo images (`Tk_FindPhoto`,
//! `Tk_PhotoPutBlock`, …).
//!
//! The engine is in-process and reproduces the observable semantics of the C
//! library that the binding depends on:
//!
//! | Area          | Behaviour                                                   |
//! |---------------|-------------------------------------------------------------|
//! | objects       | manual reference counts, freed at ≤ 0, shimmering reps      |
//! | interpreters  | thread-local; global scalar and array variables             |
//! | commands      | `set unset incr append lappend list llength lindex string`  |
//! |               | `info after update return error break continue puts`        |
//! | notifier      | per-thread timer and idle queues                            |
//! | Tk            | `image create photo`, photo instance commands, blocks       |
//!
//! Misuse that would crash the C library (touching a freed object, mutating a
//! shared object, using an interpreter from a foreign thread) panics here.
//! The binding layer is responsible for never getting that far.
//!
//! Every entry point bumps a per-thread counter readable with
//! [`native_calls`], so tests can assert that a guarded operation never
//! reached the native layer.

mod commands;
mod eval;
mod heap;
mod interp;
mod notifier;
mod parse;
mod photo;

use std::cell::Cell;

pub use heap::{
    append_to_obj, decr_ref_count, duplicate_obj, get_boolean, get_byte_array, get_double,
    get_string, get_wide_int, incr_ref_count, is_shared, list_append_element, list_elements,
    list_index, list_length, live_objects, new_boolean_obj, new_byte_array_obj, new_double_obj,
    new_list_obj, new_string_obj, new_wide_int_obj, obj_type, ref_count, ObjPtr, ObjType,
    BOOLEAN_TYPE, BYTE_ARRAY_TYPE, CMD_NAME_TYPE, DOUBLE_TYPE, INT_TYPE, LIST_TYPE,
};
pub use interp::{
    create_interp, create_obj_command, delete_command, delete_interp, eval_ex, eval_objv,
    get_obj_result, init_tk, interp_exists, obj_get_var2, obj_set_var2, reset_result,
    set_obj_result, set_string_result, unset_var2, InterpPtr, ObjCmdProc, Status, APPEND_VALUE,
    GLOBAL_ONLY, LEAVE_ERR_MSG, LIST_ELEMENT, NAMESPACE_ONLY,
};
pub use notifier::{
    do_one_event, drain_events, events_pending, ALL_EVENTS, DONT_WAIT, FILE_EVENTS, IDLE_EVENTS, TIMER_EVENTS,
    WINDOW_EVENTS,
};
pub use parse::{quote_element, split_list};
pub use photo::{
    find_photo, photo_blank, photo_expand, photo_get_image, photo_get_size, photo_put_block,
    photo_put_zoomed_block, photo_set_size, Composite, PhotoHandle, RawBlock,
};

thread_local! {
    static NATIVE_CALLS: Cell<u64> = const { Cell::new(0) };
}

/// Record one entry into the native layer on the calling thread.
fn enter() {
    NATIVE_CALLS.with(|c| c.set(c.get() + 1));
}

/// Number of native entry points invoked so far by the calling thread.
pub fn native_calls() -> u64 {
    NATIVE_CALLS.with(Cell::get)
}
