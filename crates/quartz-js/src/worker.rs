//! Executor loop. Owns the contexts behind [`Function`](crate::Function)
//! handles; everything engine-related for those functions happens on this
//! thread.

use std::collections::HashMap;

use crossbeam_channel::Receiver;

use crate::command::Command;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::JsObject;
use crate::value::{JsAny, JsValue};

/// Script recursion plus the interpreter itself can burn through the
/// platform default, so executor threads get a roomy stack.
pub(crate) const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

/// One registered function: the callable itself plus the private context it
/// was compiled in.
struct FunctionState {
    func: JsObject,
    context: Context,
}

/// Serve commands until the channel closes or a `Shutdown` arrives.
///
/// A dropped reply receiver means the requester gave up waiting; the send
/// result is ignored and the loop keeps serving.
pub(crate) fn run_worker(rx: Receiver<Command>) {
    let mut functions: HashMap<u64, FunctionState> = HashMap::new();

    while let Ok(command) = rx.recv() {
        match command {
            Command::Register {
                id,
                name,
                source,
                reply,
            } => {
                let _ = reply.send(register(&mut functions, id, &name, &source));
            }
            Command::Call {
                id,
                args,
                run_gc,
                reply,
            } => {
                let _ = reply.send(call(&functions, id, args, run_gc));
            }
            Command::SetTimeLimit { id, limit, reply } => {
                let _ = reply.send(with_state(&functions, id, |state| {
                    state.context.set_time_limit(limit);
                }));
            }
            Command::SetMaxStackSize { id, bytes, reply } => {
                let _ = reply.send(with_state(&functions, id, |state| {
                    state.context.set_max_stack_size(bytes);
                }));
            }
            Command::Gc { id, reply } => {
                let _ = reply.send(with_state(&functions, id, |state| state.context.gc()));
            }
            Command::Memory { id, reply } => {
                let result = functions
                    .get(&id)
                    .map(|state| state.context.memory())
                    .ok_or(Error::Terminated);
                let _ = reply.send(result);
            }
            Command::Unregister { id } => {
                functions.remove(&id);
                tracing::debug!("[executor] unregistered function id {}", id);
            }
            Command::Shutdown => break,
        }
    }

    tracing::debug!("[executor] loop exiting, dropping {} function(s)", functions.len());
}

fn register(
    functions: &mut HashMap<u64, FunctionState>,
    id: u64,
    name: &str,
    source: &str,
) -> Result<()> {
    let context = Context::new()?;
    context.eval(source)?;
    let func = match context.get(name)? {
        JsAny::Object(handle) if handle.is_callable() => handle,
        _ => return Err(Error::Type(format!("'{name}' is not a function"))),
    };
    tracing::debug!("[executor] registered function '{}' (id {})", name, id);
    functions.insert(id, FunctionState { func, context });
    Ok(())
}

fn call(
    functions: &HashMap<u64, FunctionState>,
    id: u64,
    args: Vec<JsValue>,
    run_gc: bool,
) -> Result<JsValue> {
    let state = functions.get(&id).ok_or(Error::Terminated)?;

    let args: Vec<JsAny> = args.into_iter().map(JsAny::Value).collect();
    let result = state.func.call(&args);
    if run_gc {
        state.context.gc();
    }

    match result? {
        JsAny::Value(plain) => Ok(plain),
        // The handle cannot leave this thread; fall back to the engine's
        // JSON encoding of it.
        JsAny::Object(handle) => {
            let unsupported = || Error::Type("Unsupported type".to_string());
            let encoded = handle.json().map_err(|_| unsupported())?;
            let parsed: serde_json::Value =
                serde_json::from_str(&encoded).map_err(|_| unsupported())?;
            Ok(JsValue::from(parsed))
        }
    }
}

fn with_state(
    functions: &HashMap<u64, FunctionState>,
    id: u64,
    apply: impl FnOnce(&FunctionState),
) -> Result<()> {
    let state = functions.get(&id).ok_or(Error::Terminated)?;
    apply(state);
    Ok(())
}
