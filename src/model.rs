//! The model tree: a single mutable, addressable [`Value`] guarded by one
//! mutex. Every mutation and every read-for-mutation goes through this
//! module so "no dirty reads" (§5) is structural rather than a convention.

use std::sync::Arc;

use miette::Diagnostic;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::instrument;

use crate::address::PathAddress;
use crate::value::Value;

#[derive(Debug, Error, Diagnostic)]
pub enum ModelError {
    #[error("address already exists: {0}")]
    #[diagnostic(
        code(domainctl::model::address_conflict),
        help("an `add` handler requires the target address to be absent before it runs")
    )]
    AlreadyExists(String),

    #[error("missing ancestor for address: {0}")]
    #[diagnostic(
        code(domainctl::model::missing_ancestor),
        help("all ancestor segments of the address must already exist")
    )]
    MissingAncestor(String),

    #[error("address does not exist: {0}")]
    #[diagnostic(code(domainctl::model::not_found))]
    NotFound(String),
}

/// A tree of [`Value`]s navigated by [`PathAddress`]. Mutation requires
/// exclusive access to the tree root; reads clone under the same lock so no
/// reader ever observes a value half-written by a concurrent mutation.
#[derive(Clone)]
pub struct ModelTree {
    root: Arc<Mutex<Value>>,
}

impl Default for ModelTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelTree {
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Arc::new(Mutex::new(Value::object())),
        }
    }

    pub fn from_value(value: Value) -> Self {
        Self {
            root: Arc::new(Mutex::new(value)),
        }
    }

    /// A deep clone of the whole tree, taken under the write lock. Used to
    /// seed a composite's private working model (§4.4 step 1).
    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.root.lock().deep_clone()
    }

    /// Replace the whole tree (used when merging a composite's working
    /// model back into the live tree, §4.4 step 3).
    pub fn replace(&self, value: Value) {
        *self.root.lock() = value;
    }

    /// Deep clone of the value at `address`, or `Value::Undefined` if the
    /// address does not resolve.
    #[instrument(skip(self), fields(address = %address))]
    pub fn read(&self, address: &PathAddress) -> Value {
        let root = self.root.lock();
        navigate(&root, address).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn exists(&self, address: &PathAddress) -> bool {
        let root = self.root.lock();
        navigate(&root, address).is_some_and(Value::is_defined)
    }

    /// Write `value` at `address`, creating intermediate object parents as
    /// needed. Used by `add` and `update` handlers' write-back (§4.1 step
    /// 7). Ancestors must already exist; only the terminal segment may be
    /// newly created.
    #[instrument(skip(self, value), fields(address = %address))]
    pub fn write(&self, address: &PathAddress, value: Value) -> Result<(), ModelError> {
        let mut root = self.root.lock();
        write_at(&mut root, address.elements(), value)
    }

    /// Delete the terminal element of `address`. Used by `remove` handler
    /// write-back.
    #[instrument(skip(self), fields(address = %address))]
    pub fn remove(&self, address: &PathAddress) -> Result<(), ModelError> {
        if address.is_empty() {
            return Err(ModelError::NotFound(address.to_location_string()));
        }
        let mut root = self.root.lock();
        let elements = address.elements();
        let (last, parents) = elements.split_last().expect("checked non-empty above");
        let parent = navigate_mut(&mut root, parents)
            .ok_or_else(|| ModelError::MissingAncestor(address.to_location_string()))?;
        let obj = parent
            .as_object_mut()
            .ok_or_else(|| ModelError::NotFound(address.to_location_string()))?;
        let key_obj = obj
            .get_mut(&last.key)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| ModelError::NotFound(address.to_location_string()))?;
        key_obj
            .remove(&last.value)
            .ok_or_else(|| ModelError::NotFound(address.to_location_string()))?;
        Ok(())
    }
}

fn navigate<'a>(root: &'a Value, address: &PathAddress) -> Option<&'a Value> {
    let mut current = root;
    for element in address.elements() {
        current = current.as_object()?.get(&element.key)?;
        current = current.as_object()?.get(&element.value)?;
    }
    Some(current)
}

fn navigate_mut<'a>(root: &'a mut Value, elements: &[crate::address::PathElement]) -> Option<&'a mut Value> {
    let mut current = root;
    for element in elements {
        if !current.is_object() {
            return None;
        }
        current = current.as_object_mut()?.get_mut(&element.key)?;
        if !current.is_object() {
            return None;
        }
        current = current.as_object_mut()?.get_mut(&element.value)?;
    }
    Some(current)
}

fn write_at(
    root: &mut Value,
    elements: &[crate::address::PathElement],
    value: Value,
) -> Result<(), ModelError> {
    let Some((last, parents)) = elements.split_last() else {
        *root = value;
        return Ok(());
    };
    if !root.is_object() {
        *root = Value::object();
    }
    let mut current: &mut Value = root;
    for element in parents {
        let missing = |e: &crate::address::PathElement| ModelError::MissingAncestor(e.to_string());
        let obj = current.as_object_mut().ok_or_else(|| missing(element))?;
        current = obj.get_mut(&element.key).ok_or_else(|| missing(element))?;
        let obj = current.as_object_mut().ok_or_else(|| missing(element))?;
        current = obj.get_mut(&element.value).ok_or_else(|| missing(element))?;
    }
    let obj = current
        .as_object_mut()
        .ok_or_else(|| ModelError::MissingAncestor(last.to_string()))?;
    if !obj.has(&last.key) {
        obj.set(last.key.clone(), Value::object());
    }
    let type_bucket = obj
        .get_mut(&last.key)
        .expect("just ensured presence above");
    if !type_bucket.is_object() {
        *type_bucket = Value::object();
    }
    type_bucket
        .as_object_mut()
        .expect("coerced above")
        .set(last.value.clone(), value);
    Ok(())
}
