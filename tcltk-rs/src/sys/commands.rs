//! Built-in commands registered in every new interpreter.

use std::io::Write;
use std::time::Duration;

use super::heap::{self, ObjPtr};
use super::interp::{
    self, get_var, set_var, unset_var, InterpPtr, Status, APPEND_VALUE, LIST_ELEMENT,
};
use super::notifier::{self, DONT_WAIT, IDLE_EVENTS, ALL_EVENTS};

type Builtin = fn(InterpPtr, &[ObjPtr]) -> Status;

pub(super) static BUILTINS: &[(&str, Builtin)] = &[
    ("after", cmd_after),
    ("append", cmd_append),
    ("break", cmd_break),
    ("continue", cmd_continue),
    ("error", cmd_error),
    ("incr", cmd_incr),
    ("info", cmd_info),
    ("lappend", cmd_lappend),
    ("lindex", cmd_lindex),
    ("list", cmd_list),
    ("llength", cmd_llength),
    ("puts", cmd_puts),
    ("return", cmd_return),
    ("set", cmd_set),
    ("string", cmd_string),
    ("unset", cmd_unset),
    ("update", cmd_update),
];

// ── Helpers ───────────────────────────────────────────────────────────────────

pub(super) fn wrong_args(interp: InterpPtr, usage: &str) -> Status {
    fail(interp, &format!("wrong # args: should be \"{usage}\""))
}

pub(super) fn fail(interp: InterpPtr, msg: &str) -> Status {
    interp::set_string_result(interp, msg);
    Status::Error
}

fn ok(interp: InterpPtr, obj: ObjPtr) -> Status {
    interp::set_obj_result(interp, obj);
    Status::Ok
}

fn ok_str(interp: InterpPtr, s: &str) -> Status {
    ok(interp, heap::new_string_obj(s))
}

pub(super) fn arg(objv: &[ObjPtr], i: usize) -> String {
    heap::get_string(objv[i])
}

pub(super) fn int_arg(interp: InterpPtr, objv: &[ObjPtr], i: usize) -> Result<i64, Status> {
    heap::get_wide_int(objv[i]).map_err(|msg| fail(interp, &msg))
}

/// Parse a list index: an integer, `end`, `end-N` or `end+N`.
fn parse_index(spec: &str, len: usize) -> Option<i64> {
    let end = i64::try_from(len).ok()? - 1;
    match spec.strip_prefix("end") {
        Some("") => Some(end),
        Some(rest) => {
            let offset = heap::parse_wide(rest.get(1..)?)?;
            match rest.as_bytes()[0] {
                b'-' => end.checked_sub(offset),
                b'+' => end.checked_add(offset),
                _ => None,
            }
        }
        None => heap::parse_wide(spec),
    }
}

// ── Variables ─────────────────────────────────────────────────────────────────

fn cmd_set(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    let name = match objv.len() {
        2 | 3 => arg(objv, 1),
        _ => return wrong_args(interp, "set varName ?newValue?"),
    };
    let result = if objv.len() == 3 {
        set_var(interp, &name, None, objv[2], 0)
    } else {
        get_var(interp, &name, None)
    };
    match result {
        Ok(p) => ok(interp, p),
        Err(msg) => fail(interp, &msg),
    }
}

fn cmd_unset(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    let mut complain = true;
    let mut names = &objv[1..];
    while let Some(&first) = names.first() {
        match heap::get_string(first).as_str() {
            "-nocomplain" => complain = false,
            "--" => {
                names = &names[1..];
                break;
            }
            _ => break,
        }
        names = &names[1..];
    }
    for &name in names {
        if let Err(msg) = unset_var(interp, &heap::get_string(name), None) {
            if complain {
                return fail(interp, &msg);
            }
        }
    }
    interp::reset_result(interp);
    Status::Ok
}

fn cmd_incr(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    if !(2..=3).contains(&objv.len()) {
        return wrong_args(interp, "incr varName ?increment?");
    }
    let name = arg(objv, 1);
    let amount = if objv.len() == 3 {
        match int_arg(interp, objv, 2) {
            Ok(v) => v,
            Err(status) => return status,
        }
    } else {
        1
    };
    let current = match get_var(interp, &name, None) {
        Ok(p) => match heap::get_wide_int(p) {
            Ok(v) => v,
            Err(msg) => return fail(interp, &msg),
        },
        Err(_) => 0,
    };
    let next = heap::new_wide_int_obj(current.wrapping_add(amount));
    match set_var(interp, &name, None, next, 0) {
        Ok(p) => ok(interp, p),
        Err(msg) => fail(interp, &msg),
    }
}

fn append_common(interp: InterpPtr, objv: &[ObjPtr], flags: u32, usage: &str) -> Status {
    if objv.len() < 2 {
        return wrong_args(interp, usage);
    }
    let name = arg(objv, 1);
    if objv.len() == 2 {
        let empty = if flags & LIST_ELEMENT != 0 {
            heap::new_list_obj(&[])
        } else {
            heap::new_string_obj("")
        };
        let current = match get_var(interp, &name, None) {
            Ok(p) => {
                heap::decr_ref_count(empty);
                Ok(p)
            }
            Err(_) => set_var(interp, &name, None, empty, 0),
        };
        return match current {
            Ok(p) => ok(interp, p),
            Err(msg) => fail(interp, &msg),
        };
    }
    let mut last = None;
    for &value in &objv[2..] {
        match set_var(interp, &name, None, value, APPEND_VALUE | flags) {
            Ok(p) => last = Some(p),
            Err(msg) => return fail(interp, &msg),
        }
    }
    match last {
        Some(p) => ok(interp, p),
        None => Status::Ok,
    }
}

fn cmd_append(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    append_common(interp, objv, 0, "append varName ?value ...?")
}

fn cmd_lappend(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    append_common(interp, objv, LIST_ELEMENT, "lappend varName ?value ...?")
}

fn cmd_info(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    if objv.len() < 2 {
        return wrong_args(interp, "info subcommand ?arg ...?");
    }
    match arg(objv, 1).as_str() {
        "exists" if objv.len() == 3 => {
            let found = get_var(interp, &arg(objv, 2), None).is_ok();
            ok(interp, heap::new_boolean_obj(found))
        }
        "exists" => wrong_args(interp, "info exists varName"),
        other => fail(
            interp,
            &format!("unknown or ambiguous subcommand \"{other}\": must be exists"),
        ),
    }
}

// ── Lists and strings ─────────────────────────────────────────────────────────

fn cmd_list(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    ok(interp, heap::new_list_obj(&objv[1..]))
}

fn cmd_llength(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    if objv.len() != 2 {
        return wrong_args(interp, "llength list");
    }
    match heap::list_length(objv[1]) {
        Ok(n) => ok(interp, heap::new_wide_int_obj(n as i64)),
        Err(msg) => fail(interp, &msg),
    }
}

fn cmd_lindex(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    match objv.len() {
        2 => return ok(interp, objv[1]),
        3 => {}
        _ => return wrong_args(interp, "lindex list ?index?"),
    }
    let len = match heap::list_length(objv[1]) {
        Ok(n) => n,
        Err(msg) => return fail(interp, &msg),
    };
    let spec = arg(objv, 2);
    let Some(index) = parse_index(&spec, len) else {
        return fail(
            interp,
            &format!("bad index \"{spec}\": must be integer?[+-]integer? or end?[+-]integer?"),
        );
    };
    let elem = usize::try_from(index)
        .ok()
        .and_then(|i| heap::list_index(objv[1], i).ok().flatten());
    match elem {
        Some(p) => ok(interp, p),
        None => ok_str(interp, ""),
    }
}

fn cmd_string(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    if objv.len() < 3 {
        return wrong_args(interp, "string subcommand ?arg ...?");
    }
    let sub = arg(objv, 1);
    match (sub.as_str(), objv.len()) {
        ("length", 3) => {
            let n = arg(objv, 2).chars().count();
            ok(interp, heap::new_wide_int_obj(n as i64))
        }
        ("toupper", 3) => ok_str(interp, &arg(objv, 2).to_uppercase()),
        ("tolower", 3) => ok_str(interp, &arg(objv, 2).to_lowercase()),
        ("equal", 4) => {
            let eq = arg(objv, 2) == arg(objv, 3);
            ok(interp, heap::new_boolean_obj(eq))
        }
        ("equal", 5) if arg(objv, 2) == "-nocase" => {
            let eq = arg(objv, 3).to_lowercase() == arg(objv, 4).to_lowercase();
            ok(interp, heap::new_boolean_obj(eq))
        }
        ("length" | "toupper" | "tolower", _) => wrong_args(interp, &format!("string {sub} string")),
        ("equal", _) => wrong_args(interp, "string equal ?-nocase? string1 string2"),
        _ => fail(
            interp,
            &format!(
                "unknown or ambiguous subcommand \"{sub}\": must be equal, length, tolower, or toupper"
            ),
        ),
    }
}

// ── Control ───────────────────────────────────────────────────────────────────

fn cmd_return(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    let mut code = Status::Return;
    let mut rest = &objv[1..];
    if rest.len() >= 2 && heap::get_string(rest[0]) == "-code" {
        code = match heap::get_string(rest[1]).as_str() {
            "ok" | "0" | "return" | "2" => Status::Return,
            "error" | "1" => Status::Error,
            "break" | "3" => Status::Break,
            "continue" | "4" => Status::Continue,
            other => {
                return fail(
                    interp,
                    &format!(
                        "bad completion code \"{other}\": must be ok, error, return, break, continue, or an integer"
                    ),
                )
            }
        };
        rest = &rest[2..];
    }
    match rest {
        [] => interp::reset_result(interp),
        [value] => interp::set_obj_result(interp, *value),
        _ => return wrong_args(interp, "return ?-code code? ?result?"),
    }
    code
}

fn cmd_error(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    if objv.len() != 2 {
        return wrong_args(interp, "error message");
    }
    interp::set_obj_result(interp, objv[1]);
    Status::Error
}

fn cmd_break(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    if objv.len() != 1 {
        return wrong_args(interp, "break");
    }
    Status::Break
}

fn cmd_continue(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    if objv.len() != 1 {
        return wrong_args(interp, "continue");
    }
    Status::Continue
}

// ── Events ────────────────────────────────────────────────────────────────────

fn join_script(objv: &[ObjPtr]) -> String {
    objv.iter().map(|&p| heap::get_string(p)).collect::<Vec<_>>().join(" ")
}

fn cmd_after(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    if objv.len() < 2 {
        return wrong_args(interp, "after option ?arg ...?");
    }
    match arg(objv, 1).as_str() {
        "idle" if objv.len() >= 3 => {
            let id = notifier::when_idle(interp, join_script(&objv[2..]));
            ok_str(interp, &id)
        }
        "idle" => wrong_args(interp, "after idle script ?script ...?"),
        "cancel" if objv.len() >= 3 => {
            notifier::cancel(interp, &join_script(&objv[2..]));
            interp::reset_result(interp);
            Status::Ok
        }
        "cancel" => wrong_args(interp, "after cancel id|command"),
        _ => {
            let ms = match int_arg(interp, objv, 1) {
                Ok(ms) => ms.max(0).unsigned_abs(),
                Err(_) => {
                    let what = arg(objv, 1);
                    return fail(
                        interp,
                        &format!("bad argument \"{what}\": must be cancel, idle, or an integer"),
                    );
                }
            };
            if objv.len() == 2 {
                std::thread::sleep(Duration::from_millis(ms));
                interp::reset_result(interp);
                return Status::Ok;
            }
            let id = notifier::create_timer(interp, Duration::from_millis(ms), join_script(&objv[2..]));
            ok_str(interp, &id)
        }
    }
}

fn cmd_update(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    let flags = match objv.len() {
        1 => ALL_EVENTS | DONT_WAIT,
        2 if arg(objv, 1) == "idletasks" => IDLE_EVENTS | DONT_WAIT,
        2 => {
            let what = arg(objv, 1);
            return fail(interp, &format!("bad option \"{what}\": must be idletasks"));
        }
        _ => return wrong_args(interp, "update ?idletasks?"),
    };
    notifier::drain_events(flags);
    interp::reset_result(interp);
    Status::Ok
}

// ── Output ────────────────────────────────────────────────────────────────────

fn cmd_puts(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    const USAGE: &str = "puts ?-nonewline? ?channelId? string";
    let mut rest = &objv[1..];
    let newline = match rest.first() {
        Some(&p) if rest.len() > 1 && heap::get_string(p) == "-nonewline" => {
            rest = &rest[1..];
            false
        }
        _ => true,
    };
    let (channel, text) = match rest {
        [text] => ("stdout".to_owned(), heap::get_string(*text)),
        [chan, text] => (heap::get_string(*chan), heap::get_string(*text)),
        _ => return wrong_args(interp, USAGE),
    };
    let end = if newline { "\n" } else { "" };
    let written = match channel.as_str() {
        "stdout" => {
            let mut out = std::io::stdout().lock();
            write!(out, "{text}{end}").and_then(|()| out.flush())
        }
        "stderr" => write!(std::io::stderr().lock(), "{text}{end}"),
        other => return fail(interp, &format!("can not find channel named \"{other}\"")),
    };
    match written {
        Ok(()) => {
            interp::reset_result(interp);
            Status::Ok
        }
        Err(e) => fail(interp, &format!("error writing \"{channel}\": {e}")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(interp: InterpPtr, script: &str) -> (Status, String) {
        let status = interp::eval_ex(interp, script, 0);
        (status, heap::get_string(interp::get_obj_result(interp)))
    }

    fn ok_text(interp: InterpPtr, script: &str) -> String {
        let (status, text) = eval(interp, script);
        assert_eq!(status, Status::Ok, "{script}: {text}");
        text
    }

    #[test]
    fn set_reports_usage() {
        let i = interp::create_interp();
        assert_eq!(
            eval(i, "set"),
            (Status::Error, "wrong # args: should be \"set varName ?newValue?\"".to_owned())
        );
        interp::delete_interp(i);
    }

    #[test]
    fn incr_creates_and_adds() {
        let i = interp::create_interp();
        assert_eq!(ok_text(i, "incr n"), "1");
        assert_eq!(ok_text(i, "incr n 41"), "42");
        assert_eq!(eval(i, "set s abc; incr s").0, Status::Error);
        interp::delete_interp(i);
    }

    #[test]
    fn append_and_lappend_commands() {
        let i = interp::create_interp();
        assert_eq!(ok_text(i, "append s a b c"), "abc");
        assert_eq!(ok_text(i, "lappend l x {y z}"), "x {y z}");
        assert_eq!(ok_text(i, "llength $l"), "2");
        assert_eq!(ok_text(i, "lappend fresh"), "");
        interp::delete_interp(i);
    }

    #[test]
    fn lindex_forms() {
        let i = interp::create_interp();
        ok_text(i, "set l {a b c d}");
        assert_eq!(ok_text(i, "lindex $l 0"), "a");
        assert_eq!(ok_text(i, "lindex $l end"), "d");
        assert_eq!(ok_text(i, "lindex $l end-1"), "c");
        assert_eq!(ok_text(i, "lindex $l 9"), "");
        assert_eq!(ok_text(i, "lindex $l -1"), "");
        assert_eq!(eval(i, "lindex $l x").0, Status::Error);
        assert_eq!(eval(i, "lindex $l end+9223372036854775807").0, Status::Error);
        assert_eq!(eval(i, "lindex {} end-9223372036854775807").0, Status::Error);
        interp::delete_interp(i);
    }

    #[test]
    fn string_subcommands() {
        let i = interp::create_interp();
        assert_eq!(ok_text(i, "string length héllo"), "5");
        assert_eq!(ok_text(i, "string toupper abc"), "ABC");
        assert_eq!(ok_text(i, "string tolower ABC"), "abc");
        assert_eq!(ok_text(i, "string equal a a"), "1");
        assert_eq!(ok_text(i, "string equal -nocase A a"), "1");
        assert_eq!(eval(i, "string reverse a").0, Status::Error);
        interp::delete_interp(i);
    }

    #[test]
    fn unset_nocomplain() {
        let i = interp::create_interp();
        assert_eq!(eval(i, "unset nope").0, Status::Error);
        assert_eq!(eval(i, "unset -nocomplain nope").0, Status::Ok);
        ok_text(i, "set a 1; unset a");
        assert_eq!(ok_text(i, "info exists a"), "0");
        interp::delete_interp(i);
    }

    #[test]
    fn return_codes() {
        let i = interp::create_interp();
        assert_eq!(eval(i, "return -code error boom"), (Status::Error, "boom".to_owned()));
        assert_eq!(eval(i, "error {bad thing}"), (Status::Error, "bad thing".to_owned()));
        assert_eq!(eval(i, "continue").0, Status::Error);
        interp::delete_interp(i);
    }

    #[test]
    fn after_idle_runs_on_update() {
        let i = interp::create_interp();
        let id = ok_text(i, "after idle {set ran yes}");
        assert!(id.starts_with("after#"));
        assert_eq!(ok_text(i, "info exists ran"), "0");
        ok_text(i, "update");
        assert_eq!(ok_text(i, "set ran"), "yes");
        interp::delete_interp(i);
    }

    #[test]
    fn update_returns_with_requeued_idle_pending() {
        let i = interp::create_interp();
        ok_text(i, "set n 0; set s {incr n; after idle $s}; after idle $s");
        ok_text(i, "update; update idletasks");
        assert_eq!(ok_text(i, "set n"), "2");
        assert!(notifier::events_pending());
        interp::delete_interp(i);
    }

    #[test]
    fn after_cancel_by_id() {
        let i = interp::create_interp();
        let id = ok_text(i, "after 0 {set ran yes}");
        ok_text(i, &format!("after cancel {id}"));
        ok_text(i, "after 5");
        ok_text(i, "update");
        assert_eq!(ok_text(i, "info exists ran"), "0");
        interp::delete_interp(i);
    }

    #[test]
    fn puts_rejects_unknown_channel() {
        let i = interp::create_interp();
        assert_eq!(
            eval(i, "puts file7 hi"),
            (Status::Error, "can not find channel named \"file7\"".to_owned())
        );
        assert_eq!(eval(i, "puts -nonewline stderr {}").0, Status::Ok);
        interp::delete_interp(i);
    }

    #[test]
    fn parse_index_forms() {
        assert_eq!(parse_index("end", 4), Some(3));
        assert_eq!(parse_index("end-3", 4), Some(0));
        assert_eq!(parse_index("end+1", 4), Some(4));
        assert_eq!(parse_index("2", 4), Some(2));
        assert_eq!(parse_index("end*2", 4), None);
        assert_eq!(parse_index("x", 4), None);
        assert_eq!(parse_index("end+9223372036854775807", 4), None);
        assert_eq!(parse_index("end-9223372036854775807", 0), None);
    }
}
