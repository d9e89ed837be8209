//! Handles to engine objects with no plain host representation.

use std::fmt;
use std::sync::Arc;

use rquickjs as qjs;
use rquickjs::function::Rest;

use crate::context::ContextCore;
use crate::error::{CROSS_CONTEXT, Error, Result, translate};
use crate::marshal;
use crate::value::JsAny;

/// An opaque reference to an object living inside a context.
///
/// The handle keeps both the engine value and its owning context alive, so
/// it stays valid even after the [`Context`](crate::Context) it came from is
/// dropped. Cloning is cheap and yields a second reference to the same
/// engine object. Like the context itself, handles are affine to the
/// creating thread.
pub struct JsObject {
    /// Declared before `core` so the engine value is released while the
    /// runtime still exists.
    raw: qjs::Persistent<qjs::Value<'static>>,
    core: Arc<ContextCore>,
}

impl JsObject {
    pub(crate) fn from_engine<'js>(
        core: &Arc<ContextCore>,
        c: &qjs::Ctx<'js>,
        value: qjs::Value<'js>,
    ) -> Self {
        Self {
            raw: qjs::Persistent::save(c, value),
            core: Arc::clone(core),
        }
    }

    /// Invoke the referenced object as a function.
    ///
    /// Arguments may be plain values or handles; a handle argument must come
    /// from the same context as `self` or the call is rejected with
    /// [`Error::Value`] before any script runs. A non-callable target fails
    /// with [`Error::Exception`] carrying `TypeError: not a function`.
    pub fn call(&self, args: &[JsAny]) -> Result<JsAny> {
        for arg in args {
            if let JsAny::Object(handle) = arg {
                if !Arc::ptr_eq(&handle.core, &self.core) {
                    return Err(Error::Value(CROSS_CONTEXT.to_string()));
                }
            }
        }

        self.core.arm_deadline();
        self.core.context.with(|c| {
            let target = self.raw.clone().restore(&c).map_err(|e| translate(&c, e))?;
            let func = target.into_function().ok_or_else(|| {
                Error::Exception("TypeError: not a function".to_string())
            })?;

            let mut engine_args = Vec::with_capacity(args.len());
            for arg in args {
                let engine_arg = match arg {
                    JsAny::Value(plain) => {
                        marshal::to_engine(&c, plain).map_err(|e| translate(&c, e))?
                    }
                    JsAny::Object(handle) => handle
                        .raw
                        .clone()
                        .restore(&c)
                        .map_err(|e| translate(&c, e))?,
                };
                engine_args.push(engine_arg);
            }

            let result: qjs::Value = func
                .call((Rest(engine_args),))
                .map_err(|e| translate(&c, e))?;
            marshal::to_host(&self.core, &c, result)
        })
    }

    /// Serialize the referenced object with the engine's own JSON
    /// implementation.
    ///
    /// Fails with [`Error::Exception`] when the object has no JSON
    /// representation (a bare function, for example).
    pub fn json(&self) -> Result<String> {
        // `toJSON` hooks run script, so this counts as an evaluation for
        // the time limit.
        self.core.arm_deadline();
        self.core.context.with(|c| {
            let stringify: qjs::Function = c
                .globals()
                .get::<_, qjs::Object>("JSON")
                .and_then(|json| json.get("stringify"))
                .map_err(|e| translate(&c, e))?;
            let target = self.raw.clone().restore(&c).map_err(|e| translate(&c, e))?;
            let encoded: qjs::Value = stringify
                .call((target,))
                .map_err(|e| translate(&c, e))?;
            match encoded.as_string() {
                Some(s) => s.to_string().map_err(|e| translate(&c, e)),
                None => Err(Error::Exception(
                    "value is not JSON-serializable".to_string(),
                )),
            }
        })
    }

    /// Whether [`call`](Self::call) on this handle can succeed at all.
    pub fn is_callable(&self) -> bool {
        self.core.context.with(|c| {
            self.raw
                .clone()
                .restore(&c)
                .map(|v| v.is_function())
                .unwrap_or(false)
        })
    }
}

impl Clone for JsObject {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            core: Arc::clone(&self.core),
        }
    }
}

impl fmt::Debug for JsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsObject")
            .field("callable", &self.is_callable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::error::{CROSS_CONTEXT, Error};
    use crate::value::{JsAny, JsValue};

    fn function_handle(context: &Context, source: &str) -> crate::object::JsObject {
        match context.eval(source).unwrap() {
            JsAny::Object(handle) => handle,
            other => panic!("expected handle, got {other:?}"),
        }
    }

    #[test]
    fn test_call() {
        let context = Context::new().unwrap();
        let adder = function_handle(&context, "(function(a, b) { return a + b; })");
        let result = adder
            .call(&[JsValue::Int(40).into(), JsValue::Int(2).into()])
            .unwrap();
        assert_eq!(result, JsValue::Int(42));
    }

    #[test]
    fn test_call_with_handle_argument() {
        let context = Context::new().unwrap();
        context.eval("function make() { return new Date(1000); }").unwrap();
        let date = match context.eval("make()").unwrap() {
            JsAny::Object(handle) => handle,
            other => panic!("expected handle, got {other:?}"),
        };
        let read = function_handle(&context, "(function(d) { return d.getTime(); })");
        assert_eq!(read.call(&[date.into()]).unwrap(), JsValue::Int(1000));
    }

    #[test]
    fn test_handle_outlives_context() {
        let adder = {
            let context = Context::new().unwrap();
            function_handle(&context, "(function(a, b) { return a + b; })")
        };
        let result = adder
            .call(&[JsValue::Int(1).into(), JsValue::Int(2).into()])
            .unwrap();
        assert_eq!(result, JsValue::Int(3));
    }

    #[test]
    fn test_cross_context_argument_rejected() {
        let a = Context::new().unwrap();
        let b = Context::new().unwrap();
        let func = function_handle(&a, "(function(x) { return x; })");
        let foreign = function_handle(&b, "(function() { return 1; })");
        let err = func.call(&[foreign.into()]).unwrap_err();
        match err {
            Error::Value(message) => assert_eq!(message, CROSS_CONTEXT),
            other => panic!("expected Value, got {other:?}"),
        }
    }

    #[test]
    fn test_calling_non_function_handle() {
        let context = Context::new().unwrap();
        let date = function_handle(&context, "new Date(0)");
        assert!(!date.is_callable());
        let err = date.call(&[]).unwrap_err();
        match err {
            Error::Exception(message) => assert_eq!(message, "TypeError: not a function"),
            other => panic!("expected Exception, got {other:?}"),
        }
    }

    #[test]
    fn test_exception_inside_called_function() {
        let context = Context::new().unwrap();
        let thrower = function_handle(&context, "(function() { throw new Error('boom'); })");
        let err = thrower.call(&[]).unwrap_err();
        match err {
            Error::Exception(message) => assert_eq!(message, "Error: boom"),
            other => panic!("expected Exception, got {other:?}"),
        }
    }

    #[test]
    fn test_json() {
        let context = Context::new().unwrap();
        let holder = function_handle(
            &context,
            "(() => { class C { constructor() { this.x = 1; } } return new C(); })()",
        );
        assert_eq!(holder.json().unwrap(), r#"{"x":1}"#);

        let func = function_handle(&context, "(function() {})");
        assert!(func.json().is_err());
    }

    #[test]
    fn test_disabled_time_limit_does_not_linger() {
        use std::time::Duration;

        let context = Context::new().unwrap();
        let holder = function_handle(
            &context,
            "({ toJSON() { let n = 0; for (let i = 0; i < 100000; ++i) { n += i; } return { n: n }; } })",
        );
        let spin = "(function() { let arr = []; for (let i = 0; i < 100000; ++i) { arr.push(i); } return arr.length; })()";

        context.set_time_limit(Some(Duration::ZERO));
        assert!(context.eval(spin).is_err());

        // Lifting the limit must also discard the expired deadline, so
        // script run on behalf of json() is not aborted.
        context.set_time_limit(None);
        assert!(holder.json().unwrap().contains("\"n\""));
    }

    #[test]
    fn test_clone_refers_to_same_object() {
        let context = Context::new().unwrap();
        context.eval("counter = 0;").unwrap();
        let bump = function_handle(&context, "(function() { return ++counter; })");
        let bump2 = bump.clone();
        assert_eq!(bump.call(&[]).unwrap(), JsValue::Int(1));
        assert_eq!(bump2.call(&[]).unwrap(), JsValue::Int(2));
    }
}
