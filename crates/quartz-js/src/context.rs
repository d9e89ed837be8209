//! Isolated JavaScript execution contexts.
//!
//! A [`Context`] owns one engine runtime plus one global scope. Global state
//! set by one evaluation is visible to the next; two contexts never share
//! anything. The engine is not reentrant and not thread-safe, so a context
//! is affine to the thread that created it — the wrapper types are `!Send`,
//! which makes cross-thread use a compile error rather than a crash. For a
//! callable that may be invoked from many threads, see
//! [`Function`](crate::Function).

use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use rquickjs as qjs;

use crate::error::{Error, Result, translate, translate_no_ctx};
use crate::limits::{InterruptState, MemorySnapshot};
use crate::marshal;
use crate::value::JsAny;

/// Source of the prototype probe used to decide whether an engine object has
/// a lossless plain representation.
const IS_PLAIN_SRC: &str =
    "(value) => { const p = Object.getPrototypeOf(value); return p === Object.prototype || p === null; }";

/// Shared core of a context: the engine runtime, the execution context and
/// the limit state.
///
/// Held behind an `Arc` by the [`Context`] itself and by every
/// [`JsObject`](crate::JsObject) handed out from it, so the engine resources
/// stay alive until the last holder is gone — the handle wins over the scope
/// that created the context. Field order matters: persistent values must be
/// released before the context and runtime they belong to.
pub(crate) struct ContextCore {
    /// Prototype probe, kept engine-side for the lifetime of the context.
    pub(crate) is_plain: qjs::Persistent<qjs::Function<'static>>,
    pub(crate) context: qjs::Context,
    runtime: qjs::Runtime,
    interrupt: Arc<InterruptState>,
    time_limit: Cell<Option<Duration>>,
}

impl ContextCore {
    pub(crate) fn new() -> Result<Arc<Self>> {
        let runtime = qjs::Runtime::new().map_err(translate_no_ctx)?;

        let interrupt = Arc::new(InterruptState::default());
        let hook = Arc::clone(&interrupt);
        runtime.set_interrupt_handler(Some(Box::new(move || hook.expired())));

        let context = qjs::Context::full(&runtime).map_err(translate_no_ctx)?;
        let is_plain = context.with(|c| {
            let probe: qjs::Function = c.eval(IS_PLAIN_SRC).map_err(|e| translate(&c, e))?;
            Ok::<_, Error>(qjs::Persistent::save(&c, probe))
        })?;

        Ok(Arc::new(Self {
            is_plain,
            context,
            runtime,
            interrupt,
            time_limit: Cell::new(None),
        }))
    }

    /// Arm the interrupt deadline for the evaluation that is about to start.
    pub(crate) fn arm_deadline(&self) {
        self.interrupt.arm(self.time_limit.get());
    }

    pub(crate) fn eval(self: &Arc<Self>, source: &str) -> Result<JsAny> {
        self.arm_deadline();
        self.context.with(|c| {
            // Sloppy mode, so `x = 1` at top level binds a global instead
            // of throwing.
            let mut options = qjs::context::EvalOptions::default();
            options.strict = false;
            let value: qjs::Value = c
                .eval_with_options(source, options)
                .map_err(|e| translate(&c, e))?;
            marshal::to_host(self, &c, value)
        })
    }

    pub(crate) fn get(self: &Arc<Self>, name: &str) -> Result<JsAny> {
        self.context.with(|c| {
            let value: qjs::Value = c.globals().get(name).map_err(|e| translate(&c, e))?;
            marshal::to_host(self, &c, value)
        })
    }

    pub(crate) fn eval_module(self: &Arc<Self>, source: &str) -> Result<()> {
        self.arm_deadline();
        self.context.with(|c| {
            let promise = qjs::Module::evaluate(c.clone(), "<module>", source)
                .map_err(|e| translate(&c, e))?;
            match promise.finish::<()>() {
                Ok(()) => Ok(()),
                Err(qjs::Error::WouldBlock) => Err(Error::Exception(
                    "module evaluation did not complete".to_string(),
                )),
                Err(e) => Err(translate(&c, e)),
            }
        })
    }

    pub(crate) fn set_memory_limit(&self, bytes: usize) {
        tracing::debug!("[context] memory limit set to {} bytes", bytes);
        self.runtime.set_memory_limit(bytes);
    }

    pub(crate) fn set_time_limit(&self, limit: Option<Duration>) {
        tracing::debug!("[context] time limit set to {:?}", limit);
        self.time_limit.set(limit);
        // Re-arm immediately so a deadline left over from an aborted
        // evaluation cannot leak into the next engine entry.
        self.interrupt.arm(limit);
    }

    pub(crate) fn set_max_stack_size(&self, bytes: usize) {
        tracing::debug!("[context] max stack size set to {} bytes", bytes);
        self.runtime.set_max_stack_size(bytes);
    }

    pub(crate) fn memory(&self) -> MemorySnapshot {
        MemorySnapshot::capture(&self.runtime)
    }

    pub(crate) fn gc(&self) {
        self.runtime.run_gc();
    }
}

/// An isolated JavaScript execution context.
///
/// ```no_run
/// use quartz_js::{Context, JsValue};
///
/// let context = Context::new()?;
/// context.eval("x = 40; y = 2;")?;
/// assert_eq!(context.eval("x + y")?, JsValue::Int(42));
/// # Ok::<_, quartz_js::Error>(())
/// ```
pub struct Context {
    pub(crate) core: Arc<ContextCore>,
}

impl Context {
    /// Create a context with a fresh runtime and empty global scope.
    pub fn new() -> Result<Self> {
        Ok(Self {
            core: ContextCore::new()?,
        })
    }

    /// Compile and execute `source` in the global scope.
    ///
    /// Global state persists across calls on the same context. Script errors
    /// surface as [`Error::Exception`] carrying the engine-formatted message.
    pub fn eval(&self, source: &str) -> Result<JsAny> {
        self.core.eval(source)
    }

    /// Read a global binding without executing script.
    ///
    /// An unbound name yields the no-value sentinel
    /// ([`JsValue::Null`](crate::JsValue::Null)).
    pub fn get(&self, name: &str) -> Result<JsAny> {
        self.core.get(name)
    }

    /// Compile `source` as a module (supports `export`) and run its
    /// top-level body. Does not return a value.
    pub fn eval_module(&self, source: &str) -> Result<()> {
        self.core.eval_module(source)
    }

    /// Reconfigure the runtime's allocation ceiling.
    ///
    /// Takes effect on the very next evaluation. An allocation beyond the
    /// ceiling fails inside the engine and surfaces as [`Error::Exception`]
    /// with the literal message `null` (see [`Error::Exception`]).
    pub fn set_memory_limit(&self, bytes: usize) {
        self.core.set_memory_limit(bytes);
    }

    /// Install or remove the execution time limit.
    ///
    /// `None` disables the limit. `Some(Duration::ZERO)` interrupts at the
    /// first cooperative check. The deadline is armed at the start of each
    /// evaluation, not when the limit is set.
    pub fn set_time_limit(&self, limit: Option<Duration>) {
        self.core.set_time_limit(limit);
    }

    /// Set the maximum number of stack bytes script execution may use.
    /// Exceeding it fails with [`Error::StackOverflow`].
    pub fn set_max_stack_size(&self, bytes: usize) {
        self.core.set_max_stack_size(bytes);
    }

    /// Snapshot the engine's memory accounting.
    pub fn memory(&self) -> MemorySnapshot {
        self.core.memory()
    }

    /// Force a garbage collection pass.
    pub fn gc(&self) {
        self.core.gc();
    }
}
