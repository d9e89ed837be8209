//! Host-side value representation.
//!
//! `JsValue` is the plain, fully-marshalled form of a JavaScript value: it is
//! `Send`, comparable and cheap to clone, so it can cross thread boundaries
//! (the [`Function`](crate::Function) executor traffics exclusively in it).
//! `JsAny` is the tagged result of any evaluation: either a plain `JsValue`
//! or an opaque [`JsObject`](crate::JsObject) handle for values with no
//! lossless plain form.

use crate::object::JsObject;

/// A JavaScript value fully converted to host data.
///
/// `null` and `undefined` both collapse to [`JsValue::Null`]; converting
/// `Null` back into the engine always produces `null`.
///
/// `Map` keeps the insertion order of its keys. Order is preserved when the
/// value is created on either side of the boundary, but no stability beyond
/// that is guaranteed.
#[derive(Debug, Clone, PartialEq)]
pub enum JsValue {
    /// The single "no value" sentinel (`null`/`undefined`).
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<JsValue>),
    /// A plain object: string keys in insertion order.
    Map(Vec<(String, JsValue)>),
}

impl JsValue {
    pub fn is_null(&self) -> bool {
        matches!(self, JsValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JsValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            JsValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JsValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[JsValue]> {
        match self {
            JsValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(String, JsValue)]> {
        match self {
            JsValue::Map(pairs) => Some(pairs),
            _ => None,
        }
    }
}

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        JsValue::Bool(b)
    }
}

impl From<i32> for JsValue {
    fn from(i: i32) -> Self {
        JsValue::Int(i64::from(i))
    }
}

impl From<i64> for JsValue {
    fn from(i: i64) -> Self {
        JsValue::Int(i)
    }
}

impl From<f64> for JsValue {
    fn from(f: f64) -> Self {
        JsValue::Float(f)
    }
}

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        JsValue::String(s.to_string())
    }
}

impl From<String> for JsValue {
    fn from(s: String) -> Self {
        JsValue::String(s)
    }
}

impl From<Vec<JsValue>> for JsValue {
    fn from(items: Vec<JsValue>) -> Self {
        JsValue::Array(items)
    }
}

impl From<serde_json::Value> for JsValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => JsValue::Null,
            serde_json::Value::Bool(b) => JsValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    JsValue::Int(i)
                } else {
                    JsValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => JsValue::String(s),
            serde_json::Value::Array(items) => {
                JsValue::Array(items.into_iter().map(JsValue::from).collect())
            }
            serde_json::Value::Object(map) => {
                JsValue::Map(map.into_iter().map(|(k, v)| (k, JsValue::from(v))).collect())
            }
        }
    }
}

impl From<JsValue> for serde_json::Value {
    fn from(value: JsValue) -> Self {
        match value {
            JsValue::Null => serde_json::Value::Null,
            JsValue::Bool(b) => serde_json::Value::Bool(b),
            JsValue::Int(i) => serde_json::Value::Number(i.into()),
            JsValue::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            JsValue::String(s) => serde_json::Value::String(s),
            JsValue::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            JsValue::Map(pairs) => serde_json::Value::Object(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Result of evaluating or calling into the engine: either a plain value or
/// an opaque handle to an engine-side object that has no lossless plain form.
///
/// This is also the argument type for [`JsObject::call`]: plain values are
/// marshalled element-wise, handles are passed through by reference (and must
/// belong to the same context as the callee).
#[derive(Debug, Clone)]
pub enum JsAny {
    Value(JsValue),
    Object(JsObject),
}

impl JsAny {
    pub fn into_value(self) -> Option<JsValue> {
        match self {
            JsAny::Value(v) => Some(v),
            JsAny::Object(_) => None,
        }
    }

    pub fn into_object(self) -> Option<JsObject> {
        match self {
            JsAny::Value(_) => None,
            JsAny::Object(o) => Some(o),
        }
    }

    pub fn as_value(&self) -> Option<&JsValue> {
        match self {
            JsAny::Value(v) => Some(v),
            JsAny::Object(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, JsAny::Value(JsValue::Null))
    }

    pub fn as_int(&self) -> Option<i64> {
        self.as_value().and_then(JsValue::as_int)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_value().and_then(JsValue::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(JsValue::as_bool)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(JsValue::as_str)
    }
}

impl PartialEq<JsValue> for JsAny {
    fn eq(&self, other: &JsValue) -> bool {
        matches!(self, JsAny::Value(v) if v == other)
    }
}

impl From<JsValue> for JsAny {
    fn from(v: JsValue) -> Self {
        JsAny::Value(v)
    }
}

impl From<JsObject> for JsAny {
    fn from(o: JsObject) -> Self {
        JsAny::Object(o)
    }
}

impl From<bool> for JsAny {
    fn from(b: bool) -> Self {
        JsAny::Value(JsValue::Bool(b))
    }
}

impl From<i32> for JsAny {
    fn from(i: i32) -> Self {
        JsAny::Value(JsValue::from(i))
    }
}

impl From<i64> for JsAny {
    fn from(i: i64) -> Self {
        JsAny::Value(JsValue::Int(i))
    }
}

impl From<f64> for JsAny {
    fn from(f: f64) -> Self {
        JsAny::Value(JsValue::Float(f))
    }
}

impl From<&str> for JsAny {
    fn from(s: &str) -> Self {
        JsAny::Value(JsValue::from(s))
    }
}

impl From<String> for JsAny {
    fn from(s: String) -> Self {
        JsAny::Value(JsValue::String(s))
    }
}
