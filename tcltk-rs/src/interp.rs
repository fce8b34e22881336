//! Interpreter handles.
//!
//! An [`Interp`] wraps one native interpreter and is bound to the thread that
//! created it.  Every operation checks the calling thread (and that the
//! interpreter is still alive) before anything reaches the native layer, so
//! misuse surfaces as [`Error::ThreadMismatch`] / [`Error::InterpDeleted`]
//! instead of a native abort.
//!
//! Handles are cheap to clone.  When the last clone is dropped on the owning
//! thread the native interpreter is deleted; dropped anywhere else, the
//! deletion is queued for the owner and happens on its next
//! [`reap_deferred`] (which every event drain calls).

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::thread::{self, ThreadId};

use crate::error::{Error, Result};
use crate::obj::{quote, FromObj, TclObj, Value};
use crate::sys::{self, InterpPtr, ObjPtr, Status};

// ── Command construction ──────────────────────────────────────────────────────

/// One token source of a command.
#[derive(Debug, Clone)]
pub enum Arg {
    /// A single word.
    Word(Value),
    /// An option pair, expanded to `-key value`.
    Opt(String, Value),
}

/// A command as a sequence of words and option pairs.
///
/// ```
/// use tcltk::{tcl_cmd, Command};
///
/// let a = Command::new("image").arg("create").arg("photo").opt("width", 4);
/// let b = tcl_cmd!("image", "create", "photo"; width = 4);
/// assert_eq!(a.to_string(), b.to_string());
/// assert_eq!(a.to_string(), "image create photo -width 4");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Command {
    args: Vec<Arg>,
}

impl Command {
    /// Start a command with its name.
    pub fn new(name: impl Into<Value>) -> Self {
        Self { args: vec![Arg::Word(name.into())] }
    }

    /// Append one word.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(Arg::Word(value.into()));
        self
    }

    /// Append several words.
    pub fn args<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.args.extend(values.into_iter().map(|v| Arg::Word(v.into())));
        self
    }

    /// Append an option pair.  A leading `-` on `key` is optional.
    pub fn opt(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.push(Arg::Opt(key.into(), value.into()));
        self
    }

    pub fn push(&mut self, arg: Arg) {
        self.args.push(arg);
    }

    /// Build held objects for every word.
    fn to_objv(&self) -> Result<Vec<TclObj>> {
        let mut objv = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            match arg {
                Arg::Word(v) => objv.push(TclObj::new(v.clone())?),
                Arg::Opt(key, v) => {
                    let flag = if key.starts_with('-') { key.clone() } else { format!("-{key}") };
                    objv.push(TclObj::new(flag)?);
                    objv.push(TclObj::new(v.clone())?);
                }
            }
        }
        Ok(objv)
    }
}

impl<V: Into<Value>, const N: usize> From<[V; N]> for Command {
    fn from(words: [V; N]) -> Self {
        Self { args: words.into_iter().map(|v| Arg::Word(v.into())).collect() }
    }
}

impl From<Vec<Arg>> for Command {
    fn from(args: Vec<Arg>) -> Self {
        Self { args }
    }
}

/// Display form: the words quoted as a script.  Constructing the display
/// touches the native layer only through quoting, never an interpreter.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = self.to_objv().map_err(|_| fmt::Error)?;
        let text: Vec<String> = words.iter().map(|w| quote(&w.to_string())).collect();
        f.write_str(&text.join(" "))
    }
}

/// Build a [`Command`]: words separated by commas, then optional
/// `key = value` option pairs after a semicolon.
#[macro_export]
macro_rules! tcl_cmd {
    ($name:expr $(, $arg:expr)* $(; $($key:ident = $val:expr),+)?) => {{
        let cmd = $crate::Command::new($name) $(.arg($arg))*;
        $($(let cmd = cmd.opt(stringify!($key), $val);)+)?
        cmd
    }};
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Lifecycle of an interpreter handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterpState {
    Uninitialized = 0,
    Active = 1,
    Deleted = 2,
}

impl InterpState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => InterpState::Active,
            2 => InterpState::Deleted,
            _ => InterpState::Uninitialized,
        }
    }
}

struct InterpInner {
    ptr: InterpPtr,
    owner: ThreadId,
    state: AtomicU8,
}

impl Drop for InterpInner {
    fn drop(&mut self) {
        if self.state.load(Ordering::Acquire) != InterpState::Active as u8 {
            return;
        }
        if thread::current().id() == self.owner {
            sys::delete_interp(self.ptr);
            tracing::debug!(interp = ?self.ptr, "interpreter deleted on drop");
        } else {
            tracing::warn!(
                interp = ?self.ptr,
                owner = ?self.owner,
                "interpreter dropped on a foreign thread; deletion deferred to its owner"
            );
            deferred()
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(self.owner)
                .or_default()
                .push(self.ptr);
        }
    }
}

/// Thread-affine handle to a native interpreter.
#[derive(Clone)]
pub struct Interp {
    inner: Arc<InterpInner>,
}

fn shared_cache() -> &'static Mutex<HashMap<ThreadId, Interp>> {
    static SHARED: OnceLock<Mutex<HashMap<ThreadId, Interp>>> = OnceLock::new();
    SHARED.get_or_init(Mutex::default)
}

fn deferred() -> &'static Mutex<HashMap<ThreadId, Vec<InterpPtr>>> {
    static DEFERRED: OnceLock<Mutex<HashMap<ThreadId, Vec<InterpPtr>>>> = OnceLock::new();
    DEFERRED.get_or_init(Mutex::default)
}

/// Delete interpreters whose last handle was dropped on another thread but
/// which belong to the calling thread.  Returns how many were deleted.
pub fn reap_deferred() -> usize {
    let me = thread::current().id();
    let pending = deferred()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&me)
        .unwrap_or_default();
    let mut reaped = 0;
    for ptr in pending {
        if sys::interp_exists(ptr) {
            sys::delete_interp(ptr);
            reaped += 1;
        }
    }
    if reaped > 0 {
        tracing::debug!(count = reaped, "reaped deferred interpreter deletions");
    }
    reaped
}

impl Interp {
    /// A fresh private interpreter owned by the calling thread.
    pub fn new() -> Self {
        let inner = InterpInner {
            ptr: sys::create_interp(),
            owner: thread::current().id(),
            state: AtomicU8::new(InterpState::Uninitialized as u8),
        };
        inner.state.store(InterpState::Active as u8, Ordering::Release);
        tracing::debug!(interp = ?inner.ptr, "interpreter created");
        Self { inner: Arc::new(inner) }
    }

    /// The calling thread's shared interpreter, created on first use.
    pub fn shared() -> Self {
        let me = thread::current().id();
        let mut cache = shared_cache().lock().unwrap_or_else(PoisonError::into_inner);
        cache.entry(me).or_insert_with(Interp::new).clone()
    }

    /// Thread and liveness check; run before any native call.
    pub(crate) fn check(&self) -> Result<InterpPtr> {
        let current = thread::current().id();
        if current != self.inner.owner {
            return Err(Error::ThreadMismatch { owner: self.inner.owner, current });
        }
        match self.state() {
            InterpState::Active => Ok(self.inner.ptr),
            InterpState::Deleted => Err(Error::InterpDeleted),
            InterpState::Uninitialized => Err(Error::NullHandle("interpreter")),
        }
    }

    pub fn state(&self) -> InterpState {
        InterpState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn owner(&self) -> ThreadId {
        self.inner.owner
    }

    pub fn as_ptr(&self) -> InterpPtr {
        self.inner.ptr
    }

    /// True if both handles wrap the same native interpreter.
    pub fn same_as(&self, other: &Interp) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Delete the native interpreter now.  Later operations fail with
    /// [`Error::InterpDeleted`].
    pub fn delete(&self) -> Result<()> {
        let ptr = self.check()?;
        self.inner.state.store(InterpState::Deleted as u8, Ordering::Release);
        sys::delete_interp(ptr);
        tracing::debug!(interp = ?ptr, "interpreter deleted");
        Ok(())
    }

    // ── Results ───────────────────────────────────────────────────────────

    fn error_message(&self, ptr: InterpPtr, status: Status) -> String {
        let text = sys::get_string(sys::get_obj_result(ptr));
        if text.is_empty() {
            format!("command completed with status {status:?}")
        } else {
            text
        }
    }

    fn finish<T: FromObj>(&self, ptr: InterpPtr, status: Status) -> Result<T> {
        match status {
            Status::Ok | Status::Return => self.result(),
            _ => Err(Error::Eval(self.error_message(ptr, status))),
        }
    }

    /// Convert the current result.
    pub fn result<T: FromObj>(&self) -> Result<T> {
        let ptr = self.check()?;
        TclObj::from_raw(sys::get_obj_result(ptr)).get()
    }

    /// Replace the current result.
    pub fn set_result(&self, value: impl Into<Value>) -> Result<()> {
        let ptr = self.check()?;
        let obj = TclObj::new(value)?;
        sys::set_obj_result(ptr, obj.non_null()?);
        Ok(())
    }

    // ── Execution ─────────────────────────────────────────────────────────

    fn run(&self, cmd: Command) -> Result<(InterpPtr, Status)> {
        let ptr = self.check()?;
        let objv = cmd.to_objv()?;
        let words: Vec<ObjPtr> = objv.iter().filter_map(TclObj::as_ptr).collect();
        let status = sys::eval_objv(ptr, &words, 0);
        Ok((ptr, status))
    }

    /// Execute one command and convert its result.
    pub fn exec<T: FromObj>(&self, cmd: impl Into<Command>) -> Result<T> {
        let (ptr, status) = self.run(cmd.into())?;
        self.finish(ptr, status)
    }

    /// Execute one command and return its raw status; the result or error
    /// message stays in the interpreter.
    pub fn exec_status(&self, cmd: impl Into<Command>) -> Result<Status> {
        self.run(cmd.into()).map(|(_, status)| status)
    }

    /// Evaluate a script and convert its result.
    pub fn eval<T: FromObj>(&self, script: &str) -> Result<T> {
        let ptr = self.check()?;
        let status = sys::eval_ex(ptr, script, 0);
        self.finish(ptr, status)
    }

    /// Evaluate a script and return its raw status.
    pub fn eval_status(&self, script: &str) -> Result<Status> {
        let ptr = self.check()?;
        Ok(sys::eval_ex(ptr, script, 0))
    }

    /// Join `fragments` with spaces and evaluate the result.  Quoting is the
    /// caller's business; see [`quote`].
    pub fn eval_concat<T: FromObj, S: AsRef<str>>(
        &self,
        fragments: impl IntoIterator<Item = S>,
    ) -> Result<T> {
        let script = fragments
            .into_iter()
            .map(|s| s.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join(" ");
        self.eval(&script)
    }

    /// Read and evaluate a script file.
    pub fn source<T: FromObj>(&self, path: impl AsRef<Path>) -> Result<T> {
        self.check()?;
        let path = path.as_ref();
        let script = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "sourcing script");
        self.eval(&script)
    }

    /// Register a Rust closure as a command.  Its arguments arrive as
    /// objects (the command name first); the returned value becomes the
    /// command result, and an error becomes the error message.
    pub fn create_command<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: Fn(&Interp, &[TclObj]) -> Result<Value> + 'static,
    {
        let ptr = self.check()?;
        let weak: Weak<InterpInner> = Arc::downgrade(&self.inner);
        let proc_: sys::ObjCmdProc = Rc::new(move |ip: InterpPtr, objv: &[ObjPtr]| {
            let Some(inner) = weak.upgrade() else {
                sys::set_string_result(ip, "interpreter handle no longer exists");
                return Status::Error;
            };
            let interp = Interp { inner };
            let args: Vec<TclObj> = objv.iter().map(|&p| TclObj::from_raw(p)).collect();
            let outcome = f(&interp, &args).and_then(|value| match value {
                Value::Unset => Ok(None),
                v => TclObj::new(v).map(Some),
            });
            match outcome {
                Ok(Some(obj)) => {
                    if let Some(p) = obj.as_ptr() {
                        sys::set_obj_result(ip, p);
                    }
                    Status::Ok
                }
                Ok(None) => {
                    sys::reset_result(ip);
                    Status::Ok
                }
                Err(e) => {
                    sys::set_string_result(ip, &e.to_string());
                    Status::Error
                }
            }
        });
        sys::create_obj_command(ptr, name, proc_);
        Ok(())
    }

    /// Remove a command.  Returns whether it existed.
    pub fn delete_command(&self, name: &str) -> Result<bool> {
        let ptr = self.check()?;
        Ok(sys::delete_command(ptr, name))
    }

    /// Initialize the toolkit in this interpreter (photo images).
    pub fn init_tk(&self) -> Result<()> {
        let ptr = self.check()?;
        match sys::init_tk(ptr) {
            Status::Ok => Ok(()),
            status => Err(Error::Eval(self.error_message(ptr, status))),
        }
    }
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Interp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interp")
            .field("ptr", &self.inner.ptr)
            .field("owner", &self.inner.owner)
            .field("state", &self.state())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
