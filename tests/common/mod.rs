//! Shared fixtures for the integration suite: registry builders and operation
//! constructors reused across `tests/*.rs`. Each file includes this module with
//! `#[path = "common/mod.rs"] mod common;` rather than pulling it in as its own
//! test binary.

use std::sync::Arc;

use domainctl::address::{PathAddress, PathElement};
use domainctl::controller::{LocalProxyController, ModelController, set_address};
use domainctl::handler::{
    AddResourceHandler, AttributeAccess, BadHandler, GoodSwapHandler, ReadChildrenNamesHandler,
    ReadChildrenTypesHandler, ReadResourceHandler, RemoveResourceHandler, SlowHandler,
    UndefineAttributeHandler, WriteAttributeHandler,
};
use domainctl::model::ModelTree;
use domainctl::persistence::InMemoryPersister;
use domainctl::registry::Registry;
use domainctl::value::Value;

/// Idempotent: every test file calls this before touching a controller so span
/// events are visible under `cargo test -- --nocapture` without double-installing
/// the global subscriber.
pub fn init_tracing() {
    domainctl::telemetry::init_for_tests();
}

/// A fully wired registry: generic resource handlers inherited at the root,
/// plus the `good`/`bad`/`slow` fixtures and attribute read/write, registered
/// at every subsystem address a test might address. Mirrors the shape real
/// subsystem modules register in production, just collapsed onto one registry.
pub fn full_registry() -> Registry {
    let registry = Registry::new();
    let root = registry.register_sub_model(&PathAddress::root()).unwrap();
    root.register_operation_handler("read-resource", Arc::new(ReadResourceHandler), true, "/")
        .unwrap();
    root.register_operation_handler(
        "read-children-types",
        Arc::new(ReadChildrenTypesHandler),
        true,
        "/",
    )
    .unwrap();
    root.register_operation_handler(
        "read-children-names",
        Arc::new(ReadChildrenNamesHandler),
        true,
        "/",
    )
    .unwrap();
    root.register_operation_handler("good", Arc::new(GoodSwapHandler), true, "/").unwrap();
    root.register_operation_handler("bad", Arc::new(BadHandler), true, "/").unwrap();
    root.register_operation_handler("slow", Arc::new(SlowHandler), true, "/").unwrap();
    root.register_operation_handler(
        "write-attribute",
        Arc::new(WriteAttributeHandler::new(registry.clone())),
        true,
        "/",
    )
    .unwrap();
    root.register_operation_handler(
        "undefine-attribute",
        Arc::new(UndefineAttributeHandler::new(registry.clone())),
        true,
        "/",
    )
    .unwrap();
    root.register_attribute("enabled", AttributeAccess::simple("enabled"));

    for name in ["a", "b", "c"] {
        let address = subsystem(name);
        let sub = registry.register_sub_model(&address).unwrap();
        sub.register_operation_handler("add", Arc::new(AddResourceHandler), false, "/").unwrap();
        sub.register_operation_handler("remove", Arc::new(RemoveResourceHandler), false, "/")
            .unwrap();
    }

    registry
}

#[must_use]
pub fn subsystem(name: &str) -> PathAddress {
    PathAddress::root().append(PathElement::new("subsystem", name))
}

/// A controller over `full_registry()` and a fresh in-memory tree/persister.
pub fn controller() -> ModelController {
    ModelController::new(full_registry(), ModelTree::new(), Arc::new(InMemoryPersister::new()))
}

/// A second, independent controller wrapped by a [`LocalProxyController`] and
/// registered at `anchor` on `front`, so operations addressed under `anchor`
/// forward to the backing controller's own root (scenario 5: proxy forwarding).
pub fn with_proxy(anchor: &PathAddress) -> (ModelController, ModelController) {
    let front = controller();
    let backing = controller();
    front
        .registry()
        .register_sub_model(anchor)
        .unwrap()
        .register_proxy_controller(Arc::new(LocalProxyController::new(backing.clone())))
        .unwrap();
    (front, backing)
}

pub fn op(name: &str, address: &PathAddress, fields: &[(&str, Value)]) -> Value {
    let mut v = Value::object();
    set_address(&mut v, address);
    let obj = v.as_object_mut().unwrap();
    obj.set("operation", Value::from(name));
    for (key, value) in fields {
        obj.set((*key).to_string(), value.clone());
    }
    v
}

pub fn composite_op(steps: Vec<Value>, rollback_on_failure: bool) -> Value {
    let mut v = Value::object();
    let obj = v.as_object_mut().unwrap();
    obj.set("operation", Value::from("composite"));
    obj.set("address", Value::List(Vec::new()));
    obj.set("steps", Value::List(steps));
    obj.set("rollback-on-runtime-failure", Value::Bool(rollback_on_failure));
    v
}

pub fn good_step(address: &PathAddress, name: &str, value: i64) -> Value {
    op(
        "good",
        address,
        &[("name", Value::from(name)), ("value", Value::from(value))],
    )
}
