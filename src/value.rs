//! Self-describing dynamic values used for operations, results, the model
//! tree, and descriptions.
//!
//! [`Value`] is a tagged sum type rather than a generic map: the `Object`
//! variant preserves insertion order so round-tripping through JSON or the
//! binary wire codec never reshuffles keys a client already saw.
//!
//! # Examples
//!
//! ```
//! use domainctl::value::Value;
//!
//! let mut obj = Value::object();
//! obj.set("name", Value::from("web"));
//! obj.set("enabled", Value::from(true));
//! assert_eq!(obj.get("name"), &Value::from("web"));
//! assert!(obj.has("enabled"));
//! assert!(!obj.has("missing"));
//! ```

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An ordered string-keyed map, used for [`Value::Object`].
///
/// Backed by a `Vec` of pairs rather than a hash map: object sizes in this
/// domain are small (attribute counts per resource, operation parameter
/// counts) and insertion-order preservation is an invariant, not an
/// optimization. Serializes as a JSON object with keys in insertion order
/// (a derived `Vec<(String, Value)>` impl would serialize as an array of
/// pairs instead, so the `Serialize`/`Deserialize` impls below are
/// hand-written).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderedObject(Vec<(String, Value)>);

impl Serialize for OrderedObject {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OrderedObject {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedObjectVisitor;

        impl<'de> Visitor<'de> for OrderedObjectVisitor {
            type Value = OrderedObject;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    entries.push((key, value));
                }
                Ok(OrderedObject(entries))
            }
        }

        deserializer.deserialize_map(OrderedObjectVisitor)
    }
}

impl OrderedObject {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some_and(Value::is_defined)
    }

    /// Set `key` to `value`, preserving the key's original position if it
    /// already existed, else appending.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A self-describing dynamic value.
///
/// `get`/`get_mut` on [`Value::Object`] auto-vivify an [`Value::Undefined`]
/// child so callers can probe a dynamic shape without a prior existence
/// check; [`Value::has`] is the only query that distinguishes "present but
/// undefined" from "absent".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Undefined,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Object(OrderedObject),
}

impl Value {
    #[must_use]
    pub fn object() -> Self {
        Value::Object(OrderedObject::new())
    }

    #[must_use]
    pub fn list() -> Self {
        Value::List(Vec::new())
    }

    #[must_use]
    pub fn is_defined(&self) -> bool {
        !matches!(self, Value::Undefined)
    }

    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_object(&self) -> Option<&OrderedObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut OrderedObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Navigate to `key`, returning [`Value::Undefined`] (never an error)
    /// when the child is absent. Only meaningful on object values; returns
    /// `Undefined` for any other shape.
    #[must_use]
    pub fn get(&self, key: &str) -> &Value {
        static UNDEFINED: Value = Value::Undefined;
        match self {
            Value::Object(o) => o.get(key).unwrap_or(&UNDEFINED),
            _ => &UNDEFINED,
        }
    }

    /// Navigate to `key`, auto-vivifying the object shape and an undefined
    /// child entry if either is missing.
    pub fn get_mut(&mut self, key: &str) -> &mut Value {
        if !self.is_object() {
            *self = Value::object();
        }
        let obj = self.as_object_mut().expect("just coerced to object");
        if !obj.has(key) {
            obj.set(key, Value::Undefined);
        }
        obj.get_mut(key).expect("just inserted")
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        match self {
            Value::Object(o) => o.has(key),
            _ => false,
        }
    }

    /// Deep clone. `Value` is already `Clone`; this exists to make call
    /// sites that rely on the "submodel is a clone, not a view" contract
    /// self-documenting.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        self.clone()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{s}"),
            Err(_) => write!(f, "<unserializable value>"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_auto_vivifies_undefined_children() {
        let v = Value::object();
        assert_eq!(v.get("missing"), &Value::Undefined);
        assert!(!v.has("missing"));
    }

    #[test]
    fn object_preserves_insertion_order() {
        let mut obj = Value::object();
        {
            let o = obj.as_object_mut().unwrap();
            o.set("z", Value::from(1));
            o.set("a", Value::from(2));
            o.set("m", Value::from(3));
        }
        let keys: Vec<&str> = obj.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn set_on_existing_key_keeps_position() {
        let mut obj = OrderedObject::new();
        obj.set("a", Value::from(1));
        obj.set("b", Value::from(2));
        obj.set("a", Value::from(99));
        assert_eq!(obj.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(obj.get("a"), Some(&Value::from(99)));
    }

    #[test]
    fn json_round_trip_preserves_order() {
        let mut obj = Value::object();
        {
            let o = obj.as_object_mut().unwrap();
            o.set("outcome", Value::from("success"));
            o.set("result", Value::from(42));
        }
        let json = serde_json::to_string(&obj).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(obj, back);
    }
}
