//! Error taxonomy and engine error translation.
//!
//! Script failures keep the engine's own formatted text (for example
//! `ReferenceError: 'x' is not defined`) so that callers can pattern-match
//! on messages. Host-side misuse is reported before the engine is touched and
//! never leaves it in a partially-mutated state.

use rquickjs::Ctx;
use rquickjs::convert::Coerced;

/// Exact message produced when a handle from one context is passed to an
/// operation on a different context.
pub(crate) const CROSS_CONTEXT: &str = "Can not mix JS objects from different contexts.";

/// Errors surfaced by the embedding layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A script-level or engine-internal failure. The payload is the
    /// engine-formatted exception text. Out-of-memory during execution
    /// reports the literal text `null`: the engine cannot allocate a
    /// structured error object at that point, and the message is preserved
    /// as-is for compatibility.
    #[error("JavaScript exception: {0}")]
    Exception(String),

    /// Host-side argument-type violation, detected before any engine call.
    #[error("type error: {0}")]
    Type(String),

    /// Host-side value misuse, such as mixing handles between contexts.
    #[error("value error: {0}")]
    Value(String),

    /// The configured maximum stack size was exceeded. Kept distinct from
    /// [`Error::Exception`]: it is a resource-limit signal, not a script
    /// error.
    #[error("stack overflow: {0}")]
    StackOverflow(String),

    /// The executor worker no longer knows this function registration.
    #[error("function executor has terminated")]
    Terminated,

    /// The executor worker channel closed mid-request.
    #[error("executor channel closed")]
    ChannelClosed,

    /// Failed to spawn the executor worker thread.
    #[error("failed to spawn executor thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Translate an engine error at the call boundary.
///
/// For pending exceptions the thrown value is caught and coerced through the
/// engine's own `ToString`, which yields the familiar `Name: message` form.
/// When even that fails (allocation failure after an out-of-memory abort)
/// the text falls back to `null`, matching what coercing a `null` exception
/// value produces.
pub(crate) fn translate(ctx: &Ctx<'_>, err: rquickjs::Error) -> Error {
    match err {
        rquickjs::Error::Exception => {
            let caught = ctx.catch();
            let text = caught
                .get::<Coerced<String>>()
                .map(|c| c.0)
                .unwrap_or_else(|_| String::from("null"));
            if text.contains("stack overflow") {
                Error::StackOverflow(text)
            } else {
                Error::Exception(text)
            }
        }
        other => Error::Exception(other.to_string()),
    }
}

/// Translate an engine error in a position where no context is available
/// (runtime construction).
pub(crate) fn translate_no_ctx(err: rquickjs::Error) -> Error {
    Error::Exception(err.to_string())
}
