//! In-process persister: keeps the latest snapshot plus an append-only bootstrap log of
//! every stored snapshot, replayed in order on [`InMemoryPersister::load`]. No I/O, used by
//! tests, demos, and as the default when no durable backend is configured.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ConfigurationPersister, PersisterError, snapshot_to_bootstrap_op};
use crate::value::Value;

#[derive(Default)]
pub struct InMemoryPersister {
    log: Mutex<Vec<Value>>,
}

impl InMemoryPersister {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The full bootstrap log, oldest first. Exposed for tests that want to assert on
    /// persistence call counts without a database.
    #[must_use]
    pub fn log(&self) -> Vec<Value> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl ConfigurationPersister for InMemoryPersister {
    async fn store(&self, snapshot: Value) -> Result<(), PersisterError> {
        self.log.lock().push(snapshot);
        Ok(())
    }

    async fn load(&self) -> Result<Vec<Value>, PersisterError> {
        Ok(self
            .log
            .lock()
            .last()
            .cloned()
            .map(|snapshot| vec![snapshot_to_bootstrap_op(snapshot)])
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_load_round_trips() {
        let persister = InMemoryPersister::new();
        let mut value = Value::object();
        value.as_object_mut().unwrap().set("a", Value::from(1));
        persister.store(value.clone()).await.unwrap();
        let ops = persister.load().await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].get("operation"), &Value::from("add"));
        assert_eq!(ops[0].get("value"), &value);
        assert_eq!(persister.log().len(), 1);
    }

    #[tokio::test]
    async fn load_before_any_store_is_empty() {
        let persister = InMemoryPersister::new();
        assert_eq!(persister.load().await.unwrap(), Vec::new());
    }
}
