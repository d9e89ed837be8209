//! Embedding layer for the QuickJS JavaScript engine.
//!
//! Two entry points cover the two ways of holding script:
//!
//! - [`Context`] is an isolated global scope for evaluating code and
//!   reading results back as host values. It is cheap, stateful across
//!   evaluations and affine to the thread that created it.
//! - [`Function`] wraps a single JavaScript function behind a
//!   `Send + Sync` handle. The engine work happens on an executor thread;
//!   callers on any thread just see a plain function call.
//!
//! Results come back as [`JsValue`] when they have a lossless plain
//! representation and as [`JsObject`] handles when they do not.
//! Per-context resource limits (memory, execution time, stack depth) are
//! available on both entry points.
//!
//! ```no_run
//! use quartz_js::{Context, JsValue};
//!
//! let context = Context::new()?;
//! context.eval("function double(x) { return 2 * x; }")?;
//! assert_eq!(context.eval("double(21)")?, JsValue::Int(42));
//! # Ok::<_, quartz_js::Error>(())
//! ```

mod command;
mod context;
mod error;
mod function;
mod limits;
mod marshal;
mod object;
mod value;
mod worker;

pub use context::Context;
pub use error::{Error, Result};
pub use function::{CallOptions, Function, FunctionOptions};
pub use limits::MemorySnapshot;
pub use object::JsObject;
pub use value::{JsAny, JsValue};
