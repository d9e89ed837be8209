//! Thread-safe handles to single JavaScript functions.
//!
//! The engine itself is affine to one thread, so a [`Function`] never
//! touches it directly. Each function lives in a private context owned by an
//! executor thread, and the handle talks to that thread over a channel. The
//! handle is `Send + Sync`; calls from many threads are serialized by the
//! executor.

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded, unbounded};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::limits::MemorySnapshot;
use crate::value::JsValue;
use crate::worker::{WORKER_STACK_SIZE, run_worker};

static NEXT_FUNCTION_ID: AtomicU64 = AtomicU64::new(0);

/// Executor shared by every function created without `own_executor`. Spawned
/// on first use and kept for the life of the process.
static SHARED: OnceLock<Sender<Command>> = OnceLock::new();

fn shared_executor() -> Result<&'static Sender<Command>> {
    if let Some(tx) = SHARED.get() {
        return Ok(tx);
    }
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("quartz-js-shared".to_string())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || run_worker(rx))?;
    // A racing initializer may get here first; its sender wins and the
    // loser's worker exits when its channel closes.
    Ok(SHARED.get_or_init(|| tx))
}

/// A dedicated executor thread, shut down and joined when the owning
/// function is dropped.
struct OwnedWorker {
    tx: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for OwnedWorker {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

enum Queue {
    Shared(&'static Sender<Command>),
    Own(OwnedWorker),
}

impl Queue {
    fn sender(&self) -> &Sender<Command> {
        match self {
            Queue::Shared(tx) => tx,
            Queue::Own(worker) => &worker.tx,
        }
    }
}

/// Construction options for [`Function::with_options`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionOptions {
    /// Give the function its own executor thread instead of the shared one.
    /// Isolates it from head-of-line blocking by other functions, at the
    /// cost of one OS thread.
    pub own_executor: bool,
}

/// Per-call options for [`Function::call_with`].
#[derive(Debug, Clone, Copy)]
pub struct CallOptions {
    /// Run a garbage collection pass on the function's context after the
    /// call, before the result is returned. On by default; turn it off to
    /// trade memory headroom for call latency.
    pub run_gc: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self { run_gc: true }
    }
}

/// A callable JavaScript function usable from any thread.
///
/// ```no_run
/// use quartz_js::{Function, JsValue};
///
/// let add = Function::new("add", "function add(a, b) { return a + b; }")?;
/// let sum = add.call(&[JsValue::Int(40), JsValue::Int(2)])?;
/// assert_eq!(sum, JsValue::Int(42));
/// # Ok::<_, quartz_js::Error>(())
/// ```
pub struct Function {
    id: u64,
    queue: Queue,
}

impl Function {
    /// Evaluate `source` in a fresh private context on the shared executor
    /// and bind the global `name` as this function's target.
    ///
    /// Fails with [`Error::Type`] when `name` does not resolve to a callable
    /// after `source` runs.
    pub fn new(name: &str, source: &str) -> Result<Self> {
        Self::with_options(name, source, FunctionOptions::default())
    }

    pub fn with_options(name: &str, source: &str, options: FunctionOptions) -> Result<Self> {
        let queue = if options.own_executor {
            let (tx, rx) = unbounded();
            let handle = thread::Builder::new()
                .name("quartz-js-worker".to_string())
                .stack_size(WORKER_STACK_SIZE)
                .spawn(move || run_worker(rx))?;
            Queue::Own(OwnedWorker {
                tx,
                handle: Some(handle),
            })
        } else {
            Queue::Shared(shared_executor()?)
        };

        let id = NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed);
        let function = Self { id, queue };
        function.request(|reply| Command::Register {
            id,
            name: name.to_string(),
            source: source.to_string(),
            reply,
        })?;
        Ok(function)
    }

    /// Invoke the function with plain-value arguments. Runs a garbage
    /// collection pass after the call; use [`call_with`](Self::call_with)
    /// to opt out.
    pub fn call(&self, args: &[JsValue]) -> Result<JsValue> {
        self.call_with(args, CallOptions::default())
    }

    /// Invoke the function with per-call options.
    ///
    /// A result with no plain representation comes back through the
    /// engine's JSON encoding; a result that cannot be encoded at all fails
    /// with [`Error::Type`].
    pub fn call_with(&self, args: &[JsValue], options: CallOptions) -> Result<JsValue> {
        self.request(|reply| Command::Call {
            id: self.id,
            args: args.to_vec(),
            run_gc: options.run_gc,
            reply,
        })
    }

    /// Install or remove the execution time limit on this function's
    /// context.
    pub fn set_time_limit(&self, limit: Option<Duration>) -> Result<()> {
        self.request(|reply| Command::SetTimeLimit {
            id: self.id,
            limit,
            reply,
        })
    }

    /// Cap the stack bytes available to this function's context.
    pub fn set_max_stack_size(&self, bytes: usize) -> Result<()> {
        self.request(|reply| Command::SetMaxStackSize {
            id: self.id,
            bytes,
            reply,
        })
    }

    /// Force a garbage collection pass on this function's context.
    pub fn gc(&self) -> Result<()> {
        self.request(|reply| Command::Gc { id: self.id, reply })
    }

    /// Snapshot the memory accounting of this function's context.
    pub fn memory(&self) -> Result<MemorySnapshot> {
        self.request(|reply| Command::Memory { id: self.id, reply })
    }

    fn request<T>(&self, build: impl FnOnce(Sender<Result<T>>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = bounded(1);
        self.queue
            .sender()
            .send(build(reply_tx))
            .map_err(|_| Error::ChannelClosed)?;
        reply_rx.recv().map_err(|_| Error::ChannelClosed)?
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("id", &self.id)
            .field(
                "own_executor",
                &matches!(self.queue, Queue::Own(_)),
            )
            .finish()
    }
}

impl Drop for Function {
    fn drop(&mut self) {
        let _ = self.queue.sender().send(Command::Unregister { id: self.id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD: &str = "function add(a, b) { return a + b; }";

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    #[test]
    fn test_call() {
        init_tracing();
        let add = Function::new("add", ADD).unwrap();
        assert_eq!(
            add.call(&[JsValue::Int(40), JsValue::Int(2)]).unwrap(),
            JsValue::Int(42)
        );
    }

    #[test]
    fn test_argument_kinds() {
        let echo = Function::new("echo", "function echo(x) { return x; }").unwrap();
        assert_eq!(echo.call(&[JsValue::Null]).unwrap(), JsValue::Null);
        assert_eq!(
            echo.call(&[JsValue::Bool(true)]).unwrap(),
            JsValue::Bool(true)
        );
        assert_eq!(
            echo.call(&[JsValue::Float(1.5)]).unwrap(),
            JsValue::Float(1.5)
        );
        assert_eq!(
            echo.call(&[JsValue::String("hello".to_string())]).unwrap(),
            JsValue::String("hello".to_string())
        );
        assert_eq!(
            echo.call(&[JsValue::Array(vec![JsValue::Int(1), JsValue::Int(2)])])
                .unwrap(),
            JsValue::Array(vec![JsValue::Int(1), JsValue::Int(2)])
        );
    }

    #[test]
    fn test_functions_have_isolated_state() {
        let source = "count = 0; function bump() { return ++count; }";
        let a = Function::new("bump", source).unwrap();
        let b = Function::new("bump", source).unwrap();
        assert_eq!(a.call(&[]).unwrap(), JsValue::Int(1));
        assert_eq!(a.call(&[]).unwrap(), JsValue::Int(2));
        assert_eq!(b.call(&[]).unwrap(), JsValue::Int(1));
    }

    #[test]
    fn test_missing_binding_is_rejected_at_construction() {
        let err = Function::new("add", "var notAFunction = 1;").unwrap_err();
        match err {
            Error::Type(message) => assert_eq!(message, "'add' is not a function"),
            other => panic!("expected Type, got {other:?}"),
        }

        let err = Function::new("notAFunction", "var notAFunction = 1;").unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn test_exception_in_body() {
        let thrower =
            Function::new("boom", "function boom() { throw new Error('from js'); }").unwrap();
        let err = thrower.call(&[]).unwrap_err();
        match err {
            Error::Exception(message) => assert_eq!(message, "Error: from js"),
            other => panic!("expected Exception, got {other:?}"),
        }
    }

    #[test]
    fn test_object_result_comes_back_through_json() {
        let make = Function::new(
            "make",
            "function make() { class C { constructor() { this.x = 1; } } return new C(); }",
        )
        .unwrap();
        assert_eq!(
            make.call(&[]).unwrap(),
            JsValue::Map(vec![("x".to_string(), JsValue::Int(1))])
        );
    }

    #[test]
    fn test_unencodable_result() {
        let make = Function::new("make", "function make() { return function() {}; }").unwrap();
        let err = make.call(&[]).unwrap_err();
        match err {
            Error::Type(message) => assert_eq!(message, "Unsupported type"),
            other => panic!("expected Type, got {other:?}"),
        }
    }

    #[test]
    fn test_calls_from_many_threads() {
        init_tracing();
        let add = Function::new("add", ADD).unwrap();
        thread::scope(|s| {
            for i in 0..8i64 {
                let add = &add;
                s.spawn(move || {
                    let sum = add.call(&[JsValue::Int(i), JsValue::Int(1)]).unwrap();
                    assert_eq!(sum, JsValue::Int(i + 1));
                });
            }
        });
    }

    #[test]
    fn test_own_executor() {
        let add = Function::with_options(
            "add",
            ADD,
            FunctionOptions { own_executor: true },
        )
        .unwrap();
        assert_eq!(
            add.call(&[JsValue::Int(1), JsValue::Int(2)]).unwrap(),
            JsValue::Int(3)
        );
        thread::scope(|s| {
            let add = &add;
            s.spawn(move || {
                assert_eq!(
                    add.call(&[JsValue::Int(2), JsValue::Int(3)]).unwrap(),
                    JsValue::Int(5)
                );
            });
        });
    }

    #[test]
    fn test_two_own_executors_run_concurrently() {
        let source =
            "function spin(n) { let arr = []; for (let i = 0; i < n; ++i) { arr.push(i); } return arr.length; }";
        let options = FunctionOptions { own_executor: true };
        let a = Function::with_options("spin", source, options).unwrap();
        let b = Function::with_options("spin", source, options).unwrap();

        thread::scope(|s| {
            for spin in [&a, &b] {
                s.spawn(move || {
                    for _ in 0..5 {
                        assert_eq!(
                            spin.call(&[JsValue::Int(10_000)]).unwrap(),
                            JsValue::Int(10_000)
                        );
                    }
                });
            }
        });
    }

    #[test]
    fn test_time_limit() {
        let spin = Function::new(
            "spin",
            "function spin() { let arr = []; for (let i = 0; i < 100000; ++i) { arr.push(i); } return arr.length; }",
        )
        .unwrap();
        spin.call(&[]).unwrap();

        spin.set_time_limit(Some(Duration::ZERO)).unwrap();
        let err = spin.call(&[]).unwrap_err();
        match err {
            Error::Exception(message) => assert_eq!(message, "InternalError: interrupted"),
            other => panic!("expected Exception, got {other:?}"),
        }

        spin.set_time_limit(None).unwrap();
        spin.call(&[]).unwrap();
    }

    #[test]
    fn test_max_stack_size() {
        let down = Function::new(
            "down",
            "function down(v) { return v <= 0 ? 0 : 1 + down(v - 1); }",
        )
        .unwrap();
        down.set_max_stack_size(50_000).unwrap();
        let err = down.call(&[JsValue::Int(2000)]).unwrap_err();
        assert!(matches!(err, Error::StackOverflow(_)), "got {err:?}");

        down.set_max_stack_size(2_000_000).unwrap();
        assert_eq!(down.call(&[JsValue::Int(100)]).unwrap(), JsValue::Int(100));
    }

    const CYCLE: &str = "function make() { let a = {}; let b = {}; a.b = b; b.a = a; return 1; }";

    #[test]
    fn test_default_call_collects_garbage() {
        let make = Function::new("make", CYCLE).unwrap();
        let initial = make.memory().unwrap().obj_count;
        for _ in 0..20 {
            make.call(&[]).unwrap();
        }
        assert!(make.memory().unwrap().obj_count <= initial + 10);
    }

    #[test]
    fn test_explicit_gc_after_deferred_calls() {
        let make = Function::new("make", CYCLE).unwrap();
        let initial = make.memory().unwrap().obj_count;
        for _ in 0..20 {
            make.call_with(&[], CallOptions { run_gc: false }).unwrap();
        }
        make.gc().unwrap();
        assert!(make.memory().unwrap().obj_count <= initial + 10);
    }
}
