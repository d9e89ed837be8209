//! Messages sent from [`Function`](crate::Function) handles to an executor
//! thread.

use std::time::Duration;

use crossbeam_channel::Sender;

use crate::error::Result;
use crate::limits::MemorySnapshot;
use crate::value::JsValue;

/// One request to an executor. Every variant that produces a result carries
/// its own bounded reply channel.
pub(crate) enum Command {
    /// Create a fresh context on the executor, evaluate `source` in it and
    /// bind the global `name` as function `id`.
    Register {
        id: u64,
        name: String,
        source: String,
        reply: Sender<Result<()>>,
    },
    /// Invoke function `id` with plain arguments, optionally forcing a
    /// garbage collection pass afterwards.
    Call {
        id: u64,
        args: Vec<JsValue>,
        run_gc: bool,
        reply: Sender<Result<JsValue>>,
    },
    SetTimeLimit {
        id: u64,
        limit: Option<Duration>,
        reply: Sender<Result<()>>,
    },
    SetMaxStackSize {
        id: u64,
        bytes: usize,
        reply: Sender<Result<()>>,
    },
    Gc {
        id: u64,
        reply: Sender<Result<()>>,
    },
    Memory {
        id: u64,
        reply: Sender<Result<MemorySnapshot>>,
    },
    /// Drop function `id` and its context. Fire and forget, sent from `Drop`.
    Unregister { id: u64 },
    /// Tear the executor down after draining in-flight requests.
    Shutdown,
}
