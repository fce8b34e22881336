//! Error type for the binding layer.

use std::thread::ThreadId;

use derive_more::{Display, Error, From};

/// Result type for binding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by object, interpreter, variable and image operations.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// An object's string projection could not be converted to the target
    /// type.  `content` is truncated for display.
    #[from(ignore)]
    #[display("cannot convert \"{content}\" to {target}")]
    Conversion { content: String, target: &'static str },

    /// A native object could not be built from a value.
    #[from(ignore)]
    #[display("cannot construct object: {_0}")]
    Construct(#[error(not(source))] String),

    /// An interpreter was used from a thread other than its owner.
    #[from(ignore)]
    #[display("interpreter owned by thread {owner:?} used from thread {current:?}")]
    ThreadMismatch { owner: ThreadId, current: ThreadId },

    /// Operation on a disposed or never-initialized handle.
    #[from(ignore)]
    #[display("null {_0} handle")]
    NullHandle(#[error(not(source))] &'static str),

    /// A command or script completed with a non-OK status.
    #[from(ignore)]
    #[display("{_0}")]
    Eval(#[error(not(source))] String),

    /// Variable read, write or unset failure.
    #[from(ignore)]
    #[display("{_0}")]
    Variable(#[error(not(source))] String),

    /// Pixel coordinates or dimensions outside the image.
    #[from(ignore)]
    #[display("out of range: {_0}")]
    OutOfRange(#[error(not(source))] String),

    /// The interpreter has been deleted.
    #[from(ignore)]
    #[display("interpreter has been deleted")]
    InterpDeleted,

    /// I/O failure while sourcing a script.
    #[display("I/O error: {_0}")]
    Io(#[error(source)] std::io::Error),
}

const PREVIEW_CHARS: usize = 40;

impl Error {
    /// Conversion error carrying a truncated preview of `content`.
    pub(crate) fn conversion(content: &str, target: &'static str) -> Self {
        let content = if content.chars().count() > PREVIEW_CHARS {
            let head: String = content.chars().take(PREVIEW_CHARS).collect();
            format!("{head}...")
        } else {
            content.to_owned()
        };
        Error::Conversion { content, target }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_preview_is_truncated() {
        let long = "x".repeat(100);
        let Error::Conversion { content, target } = Error::conversion(&long, "i32") else {
            panic!("wrong variant");
        };
        assert_eq!(content.len(), PREVIEW_CHARS + 3);
        assert!(content.ends_with("..."));
        assert_eq!(target, "i32");
    }

    #[test]
    fn short_content_kept() {
        let e = Error::conversion("abc", "bool");
        assert_eq!(e.to_string(), "cannot convert \"abc\" to bool");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: Error = io.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(std::error::Error::source(&e).is_some());
    }
}
