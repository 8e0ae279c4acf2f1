//! Configuration persistence: best-effort durability for the live [`crate::model::ModelTree`]
//! (§6 "Persisted state", §10.4).
//!
//! A [`ConfigurationPersister`] never participates in dispatch correctness — the controller
//! calls [`ConfigurationPersister::store`] after a successful write-back and only logs a
//! warning on failure (§4.1 step 7, §7). Two backends are provided: [`InMemoryPersister`],
//! which keeps an append-only bootstrap log for tests and demos, and, behind the `sqlite`
//! feature, [`sqlite::SqlitePersister`].

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::InMemoryPersister;
#[cfg(feature = "sqlite")]
pub use sqlite::SqlitePersister;

use async_trait::async_trait;
use base64::Engine as _;
use miette::Diagnostic;
use thiserror::Error;

use crate::value::Value;

#[derive(Debug, Error, Diagnostic)]
pub enum PersisterError {
    #[error("serialization error: {0}")]
    #[diagnostic(code(domainctl::persistence::serde))]
    Serde(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error("sqlite backend error: {0}")]
    #[diagnostic(code(domainctl::persistence::sqlite))]
    Sqlite(#[from] sqlx::Error),

    #[error("backend error: {0}")]
    #[diagnostic(code(domainctl::persistence::backend))]
    Backend(String),
}

/// Durability boundary for the model tree. `marshal_as_xml` mirrors the source system's
/// on-disk configuration format (§6) at a narrow, best-effort level: good enough for a
/// human-readable dump, not a full schema-aware marshaller (out of scope per §1).
#[async_trait]
pub trait ConfigurationPersister: Send + Sync {
    /// Persist a full snapshot of the model tree. Called after every successful
    /// add/update/remove dispatch; failures are logged, never propagated to the caller.
    async fn store(&self, snapshot: Value) -> Result<(), PersisterError>;

    /// Load the bootstrap operations that reconstruct the most recently persisted model,
    /// in replay order, or an empty list if nothing has ever been stored (§6). Each
    /// returned operation is a root-addressed `add` carrying the full snapshot as its
    /// `value`, suitable for feeding straight into [`crate::controller::ModelController::dispatch`].
    async fn load(&self) -> Result<Vec<Value>, PersisterError>;

    /// Render `snapshot` as a narrow XML document: one `<object>`/`<list>` nesting per
    /// structured-value shape, attribute values escaped, no schema awareness.
    fn marshal_as_xml(&self, snapshot: &Value) -> String {
        let mut out = String::new();
        write_xml(snapshot, &mut out, "model");
        out
    }
}

/// Wraps a persisted snapshot as the single bootstrap operation that, dispatched against
/// an empty tree, reinstalls it: a root-addressed `add` whose `value` is the snapshot.
pub(crate) fn snapshot_to_bootstrap_op(snapshot: Value) -> Value {
    let mut op = Value::object();
    let obj = op.as_object_mut().expect("just constructed");
    obj.set("operation", Value::from("add"));
    obj.set("address", Value::List(Vec::new()));
    obj.set("value", snapshot);
    op
}

fn write_xml(value: &Value, out: &mut String, tag: &str) {
    match value {
        Value::Undefined => out.push_str(&format!("<{tag} nil=\"true\"/>")),
        Value::Bool(b) => out.push_str(&format!("<{tag}>{b}</{tag}>")),
        Value::Int(i) => out.push_str(&format!("<{tag}>{i}</{tag}>")),
        Value::Long(l) => out.push_str(&format!("<{tag}>{l}</{tag}>")),
        Value::Double(d) => out.push_str(&format!("<{tag}>{d}</{tag}>")),
        Value::String(s) => out.push_str(&format!("<{tag}>{}</{tag}>", escape_xml(s))),
        Value::Bytes(b) => out.push_str(&format!(
            "<{tag} encoding=\"base64\">{}</{tag}>",
            base64::engine::general_purpose::STANDARD.encode(b)
        )),
        Value::List(items) => {
            out.push_str(&format!("<{tag}>"));
            for item in items {
                write_xml(item, out, "item");
            }
            out.push_str(&format!("</{tag}>"));
        }
        Value::Object(obj) => {
            out.push_str(&format!("<{tag}>"));
            for (key, v) in obj.iter() {
                write_xml(v, out, &sanitize_tag(key));
            }
            out.push_str(&format!("</{tag}>"));
        }
    }
}

fn sanitize_tag(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_marshals_nested_objects() {
        let persister = InMemoryPersister::new();
        let mut value = Value::object();
        value.as_object_mut().unwrap().set("enabled", Value::Bool(true));
        let xml = persister.marshal_as_xml(&value);
        assert!(xml.contains("<enabled>true</enabled>"));
    }
}
