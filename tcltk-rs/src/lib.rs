//! Reference-counted bindings to a Tcl/Tk interpreter.
//!
//! | Module    | Provides                                                    |
//! |-----------|-------------------------------------------------------------|
//! | [`obj`]   | [`TclObj`] handles, [`Value`] sources, [`FromObj`] targets  |
//! | [`interp`]| thread-affine [`Interp`] handles, [`Command`] building      |
//! | [`var`]   | variable access on [`Interp`] with [`VarFlags`]             |
//! | [`event`] | manual drains and the periodic [`Scheduler`]                |
//! | [`image`] | [`PixelBlock`] views and [`Photo`] reads/writes             |
//! | [`sys`]   | the native contract everything above is built on            |
//!
//! ```
//! use tcltk::Interp;
//!
//! let interp = Interp::new();
//! interp.set("x", 42).unwrap();
//! assert_eq!(interp.eval::<i64>("incr x").unwrap(), 43);
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod image;
pub mod interp;
pub mod obj;
pub mod sys;
pub mod types;
pub mod var;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{do_events, do_one_event, EventFlags, Scheduler};
pub use image::{Axis, Photo, PixelArray, PixelBlock, Pixels};
pub use interp::{reap_deferred, Arg, Command, Interp, InterpState};
pub use obj::{quote, Bytes, FromObj, TclObj, Value};
pub use sys::Status;
pub use types::TypeTag;
pub use var::{VarFlags, VarName};
