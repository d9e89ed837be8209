//! Conversion between host values and engine values.
//!
//! Primitives map both ways without loss. Engine arrays and plain objects
//! (prototype `Object.prototype` or `null`) convert element by element into
//! [`JsValue`]; anything else, and any container with a non-plain member
//! anywhere inside it, comes back whole as a [`JsObject`] handle so nothing
//! is silently dropped.

use std::sync::Arc;

use rquickjs as qjs;

use crate::context::ContextCore;
use crate::error::{Result, translate};
use crate::object::JsObject;
use crate::value::{JsAny, JsValue};

/// Build an engine value from a host value.
pub(crate) fn to_engine<'js>(c: &qjs::Ctx<'js>, value: &JsValue) -> qjs::Result<qjs::Value<'js>> {
    Ok(match value {
        JsValue::Null => qjs::Value::new_null(c.clone()),
        JsValue::Bool(b) => qjs::Value::new_bool(c.clone(), *b),
        JsValue::Int(i) => match i32::try_from(*i) {
            Ok(small) => qjs::Value::new_int(c.clone(), small),
            Err(_) => qjs::Value::new_float(c.clone(), *i as f64),
        },
        JsValue::Float(f) => qjs::Value::new_float(c.clone(), *f),
        JsValue::String(s) => qjs::String::from_str(c.clone(), s)?.into_value(),
        JsValue::Array(items) => {
            let array = qjs::Array::new(c.clone())?;
            for (index, item) in items.iter().enumerate() {
                array.set(index, to_engine(c, item)?)?;
            }
            array.into_value()
        }
        JsValue::Map(entries) => {
            let object = qjs::Object::new(c.clone())?;
            for (key, item) in entries {
                object.set(key.as_str(), to_engine(c, item)?)?;
            }
            object.into_value()
        }
    })
}

/// Convert an engine value into its host representation.
///
/// `undefined`, `null` and uninitialized all collapse to the single no-value
/// sentinel [`JsValue::Null`].
pub(crate) fn to_host<'js>(
    core: &Arc<ContextCore>,
    c: &qjs::Ctx<'js>,
    value: qjs::Value<'js>,
) -> Result<JsAny> {
    if value.is_undefined() || value.is_null() || value.type_of() == qjs::Type::Uninitialized {
        return Ok(JsAny::Value(JsValue::Null));
    }
    if let Some(b) = value.as_bool() {
        return Ok(JsAny::Value(JsValue::Bool(b)));
    }
    if let Some(i) = value.as_int() {
        return Ok(JsAny::Value(JsValue::Int(i64::from(i))));
    }
    if value.is_float() {
        if let Some(f) = value.as_float() {
            return Ok(JsAny::Value(JsValue::Float(f)));
        }
    }
    if let Some(s) = value.as_string() {
        let s = s.to_string().map_err(|e| translate(c, e))?;
        return Ok(JsAny::Value(JsValue::String(s)));
    }

    match to_plain(core, c, &value)? {
        Some(plain) => Ok(JsAny::Value(plain)),
        None => Ok(JsAny::Object(JsObject::from_engine(core, c, value))),
    }
}

/// Try to lower an engine object or array into a plain host value.
///
/// Returns `None` as soon as any part of the structure has no lossless plain
/// representation; the caller then keeps the whole value as a handle.
fn to_plain<'js>(
    core: &Arc<ContextCore>,
    c: &qjs::Ctx<'js>,
    value: &qjs::Value<'js>,
) -> Result<Option<JsValue>> {
    if value.is_function() {
        return Ok(None);
    }

    if let Some(array) = value.as_array() {
        let mut items = Vec::with_capacity(array.len());
        for item in array.iter::<qjs::Value>() {
            let item = item.map_err(|e| translate(c, e))?;
            match to_plain_any(core, c, item)? {
                Some(plain) => items.push(plain),
                None => return Ok(None),
            }
        }
        return Ok(Some(JsValue::Array(items)));
    }

    if let Some(object) = value.as_object() {
        let probe = core
            .is_plain
            .clone()
            .restore(c)
            .map_err(|e| translate(c, e))?;
        let plain: bool = probe
            .call((value.clone(),))
            .map_err(|e| translate(c, e))?;
        if !plain {
            return Ok(None);
        }

        let mut entries = Vec::new();
        for prop in object.props::<String, qjs::Value>() {
            let (key, item) = prop.map_err(|e| translate(c, e))?;
            match to_plain_any(core, c, item)? {
                Some(plain) => entries.push((key, plain)),
                None => return Ok(None),
            }
        }
        return Ok(Some(JsValue::Map(entries)));
    }

    Ok(None)
}

/// Recursion step: a nested value is plain if it is a primitive or a plain
/// container all the way down.
fn to_plain_any<'js>(
    core: &Arc<ContextCore>,
    c: &qjs::Ctx<'js>,
    value: qjs::Value<'js>,
) -> Result<Option<JsValue>> {
    match to_host(core, c, value)? {
        JsAny::Value(plain) => Ok(Some(plain)),
        JsAny::Object(_) => Ok(None),
    }
}
