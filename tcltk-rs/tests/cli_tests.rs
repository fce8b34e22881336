//! Run scripts through the `tcltk` binary and check what it prints.

use std::io::Write;
use std::process::{Command, Output, Stdio};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn binary() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_tcltk"))
}

fn tcltk(args: &[&str], stdin: Option<&str>) -> Output {
    let mut cmd = Command::new(binary());
    cmd.args(args)
        .env("TCLTK_EVENT_DELAY_MS", "0")
        .env("TCLTK_EVENT_INTERVAL_MS", "5")
        .env_remove("TCLTK_RC")
        .env_remove("TCLTK_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().expect("spawn tcltk");
    {
        let mut pipe = child.stdin.take().expect("stdin");
        if let Some(text) = stdin {
            pipe.write_all(text.as_bytes()).expect("write stdin");
        }
    }
    child.wait_with_output().expect("wait for tcltk")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

// ── Cases ─────────────────────────────────────────────────────────────────────

#[test]
fn command_result_is_printed() {
    let out = tcltk(&["-n", "-c", "set a 5; incr a"], None);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "6\n");
}

#[test]
fn puts_and_timers_run_before_exit() {
    let out = tcltk(&["-n", "-c", "after 20 {puts late}; after idle {puts idle}; puts early"], None);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "early\nidle\nlate\n");
}

#[test]
fn script_file_sees_argv() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "puts [llength $argv]\nputs [lindex $argv end]\nputs $argc").unwrap();
    let path = file.path().to_str().unwrap().to_owned();
    let out = tcltk(&["-n", &path, "one", "two words"], None);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout(&out), "2\ntwo words\n2\n");
}

#[test]
fn stdin_script() {
    let out = tcltk(&["-n"], Some("set x hello\nputs -nonewline $x\n"));
    assert!(out.status.success());
    assert_eq!(stdout(&out), "hello");
}

#[test]
fn rc_file_is_sourced_unless_disabled() {
    let mut rc = tempfile::NamedTempFile::new().unwrap();
    writeln!(rc, "set greeting hi").unwrap();
    let rc_path = rc.path().to_str().unwrap().to_owned();

    let out = Command::new(binary())
        .args(["-c", "set greeting"])
        .env("TCLTK_RC", &rc_path)
        .output()
        .unwrap();
    assert_eq!(stdout(&out), "hi\n");

    let out = Command::new(binary())
        .args(["-n", "-c", "info exists greeting"])
        .env("TCLTK_RC", &rc_path)
        .output()
        .unwrap();
    assert_eq!(stdout(&out), "0\n");
}

#[test]
fn script_error_exits_nonzero() {
    let out = tcltk(&["-n", "-c", "error {went wrong}"], None);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("tcltk: went wrong"));
}

#[test]
fn bad_flag_prints_usage() {
    let out = tcltk(&["-q"], None);
    assert_eq!(out.status.code(), Some(2));
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("unknown option: -q"));
    assert!(err.contains("Usage: tcltk"));
}

#[test]
fn photos_available_by_default() {
    let out = tcltk(&["-n", "-c", "image create photo p -width 2 -height 3; image height p"], None);
    assert_eq!(stdout(&out), "3\n");
    let out = Command::new(binary())
        .args(["-n", "-c", "image names"])
        .env("TCLTK_NO_TK", "1")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
}
