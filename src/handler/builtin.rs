//! Generic handlers shipped for bootstrapping and testing: a resource that
//! registers no custom behavior still answers `read-resource` and supports
//! generic `add`/`remove`, mirroring how most subsystems in the source
//! system only ever add domain-specific handlers for a handful of
//! operation names. `good`/`bad`/`slow` and the attribute handlers double
//! as the scenario fixtures described in §4.3.

use std::time::Duration;

use async_trait::async_trait;

use super::{Capability, OperationContext, OperationResult, ResultSink};
use crate::registry::Registry;
use crate::value::Value;

/// Answers `read-resource`. Registered `inherited = true` at the registry
/// root so every node answers it unless shadowed (§4.3).
pub struct ReadResourceHandler;

#[async_trait]
impl super::OperationHandler for ReadResourceHandler {
    fn capability(&self) -> Capability {
        Capability::Query
    }

    async fn handle(
        &self,
        ctx: &mut OperationContext,
        operation: &Value,
        sink: &dyn ResultSink,
    ) -> OperationResult {
        let recursive = operation.get("recursive").as_bool().unwrap_or(false);
        let result = if recursive {
            ctx.submodel().deep_clone()
        } else {
            shallow_view(ctx.submodel())
        };
        sink.fragment(&[], result);
        sink.complete(None);
        OperationResult::new()
    }
}

/// Drops nested object children one level down, leaving scalar attributes
/// and an `UNDEFINED` placeholder for child types — used for
/// `recursive=false` reads.
fn shallow_view(submodel: &Value) -> Value {
    let Some(obj) = submodel.as_object() else {
        return submodel.deep_clone();
    };
    let mut out = Value::object();
    let out_obj = out.as_object_mut().expect("just constructed");
    for (key, value) in obj.iter() {
        if value.is_object() {
            out_obj.set(key.to_string(), Value::Undefined);
        } else {
            out_obj.set(key.to_string(), value.clone());
        }
    }
    out
}

/// Answers `read-children-types`: the keys of the first-level type buckets
/// under the current address (e.g. `subsystem`, `host`).
pub struct ReadChildrenTypesHandler;

#[async_trait]
impl super::OperationHandler for ReadChildrenTypesHandler {
    fn capability(&self) -> Capability {
        Capability::Query
    }

    async fn handle(
        &self,
        ctx: &mut OperationContext,
        _operation: &Value,
        sink: &dyn ResultSink,
    ) -> OperationResult {
        let names: Vec<Value> = ctx
            .submodel()
            .as_object()
            .map(|o| o.keys().map(Value::from).collect())
            .unwrap_or_default();
        sink.fragment(&[], Value::List(names));
        sink.complete(None);
        OperationResult::new()
    }
}

/// Answers `read-children-names`: the instance names registered under the
/// type bucket named by the `child-type` parameter.
pub struct ReadChildrenNamesHandler;

#[async_trait]
impl super::OperationHandler for ReadChildrenNamesHandler {
    fn capability(&self) -> Capability {
        Capability::Query
    }

    async fn handle(
        &self,
        ctx: &mut OperationContext,
        operation: &Value,
        sink: &dyn ResultSink,
    ) -> OperationResult {
        let Some(child_type) = operation.get("child-type").as_str() else {
            sink.failed("read-children-names requires a \"child-type\" parameter".to_string(), false);
            return OperationResult::new();
        };
        let names: Vec<Value> = ctx
            .submodel()
            .get(child_type)
            .as_object()
            .map(|o| o.keys().map(Value::from).collect())
            .unwrap_or_default();
        sink.fragment(&[], Value::List(names));
        sink.complete(None);
        OperationResult::new()
    }
}

/// Generic `add`: the submodel starts empty (per §4.1 step 5); this handler
/// populates it from the operation's `value` parameter and returns a
/// `remove` as the compensating operation.
pub struct AddResourceHandler;

#[async_trait]
impl super::OperationHandler for AddResourceHandler {
    fn capability(&self) -> Capability {
        Capability::Add
    }

    async fn handle(
        &self,
        ctx: &mut OperationContext,
        operation: &Value,
        sink: &dyn ResultSink,
    ) -> OperationResult {
        let value = operation.get("value").deep_clone();
        ctx.set_submodel(value);
        sink.fragment(&[], Value::Undefined);
        let compensating = remove_op_for(ctx);
        sink.complete(Some(compensating.clone()));
        OperationResult::new().with_compensating_op(compensating)
    }
}

/// Generic `remove`: the compensating operation is an `add` that restores
/// the pre-removal submodel (captured before the controller deletes it).
pub struct RemoveResourceHandler;

#[async_trait]
impl super::OperationHandler for RemoveResourceHandler {
    fn capability(&self) -> Capability {
        Capability::Remove
    }

    async fn handle(
        &self,
        ctx: &mut OperationContext,
        _operation: &Value,
        sink: &dyn ResultSink,
    ) -> OperationResult {
        let compensating = add_op_for(ctx, ctx.submodel().deep_clone());
        sink.fragment(&[], Value::Undefined);
        sink.complete(Some(compensating.clone()));
        OperationResult::new().with_compensating_op(compensating)
    }
}

/// `good`: swaps the named attribute's value, returning the prior value as its
/// result and another `good` call (restoring that prior value) as its
/// compensating operation. Used by the composite scenario tests (§8 scenario
/// 1-3).
pub struct GoodSwapHandler;

#[async_trait]
impl super::OperationHandler for GoodSwapHandler {
    fn capability(&self) -> Capability {
        Capability::Update
    }

    async fn handle(
        &self,
        ctx: &mut OperationContext,
        operation: &Value,
        sink: &dyn ResultSink,
    ) -> OperationResult {
        let Some(name) = operation.get("name").as_str().map(str::to_string) else {
            sink.failed("\"good\" requires a \"name\" parameter".to_string(), false);
            return OperationResult::new();
        };
        let new_value = operation.get("value").deep_clone();
        if !ctx.submodel().is_object() {
            ctx.set_submodel(Value::object());
        }
        let old_value = ctx.submodel().get(&name).clone();
        ctx.submodel_mut()
            .as_object_mut()
            .expect("just ensured object shape")
            .set(name.clone(), new_value);
        sink.fragment(&[], old_value.clone());
        let compensating = good_op(ctx, &name, old_value);
        sink.complete(Some(compensating.clone()));
        OperationResult::new().with_compensating_op(compensating)
    }
}

/// `bad`: always fails. Used to exercise composite rollback (§8 scenario 2/3).
pub struct BadHandler;

#[async_trait]
impl super::OperationHandler for BadHandler {
    fn capability(&self) -> Capability {
        Capability::Update
    }

    async fn handle(
        &self,
        _ctx: &mut OperationContext,
        _operation: &Value,
        sink: &dyn ResultSink,
    ) -> OperationResult {
        sink.failed("\"bad\" always fails".to_string(), false);
        OperationResult::new()
    }
}

/// `slow`: an operation that never completes on its own within a test's
/// lifetime, used to exercise in-flight cancellation (§8 scenario 4). It
/// deliberately does *not* call `sink.cancelled()` itself when it notices
/// cancellation — it just returns, leaving the terminal signal to the
/// controller's own post-handler cancellation check, so exactly one terminal
/// call ever reaches the sink.
pub struct SlowHandler;

#[async_trait]
impl super::OperationHandler for SlowHandler {
    fn capability(&self) -> Capability {
        Capability::Query
    }

    async fn handle(
        &self,
        ctx: &mut OperationContext,
        _operation: &Value,
        sink: &dyn ResultSink,
    ) -> OperationResult {
        tokio::select! {
            () = ctx.cancellation.cancelled() => {}
            () = tokio::time::sleep(Duration::from_secs(3600)) => {
                sink.fragment(&[], Value::Undefined);
                sink.complete(None);
            }
        }
        OperationResult::new().cancellable()
    }
}

/// Answers `write-attribute`: resolves the `AttributeAccess` registered at
/// this node for `name` and replaces its value, returning a `write-attribute`
/// that restores the prior value as its compensating operation.
pub struct WriteAttributeHandler {
    registry: Registry,
}

impl WriteAttributeHandler {
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl super::OperationHandler for WriteAttributeHandler {
    fn capability(&self) -> Capability {
        Capability::Update
    }

    async fn handle(
        &self,
        ctx: &mut OperationContext,
        operation: &Value,
        sink: &dyn ResultSink,
    ) -> OperationResult {
        let Some(name) = operation.get("name").as_str().map(str::to_string) else {
            sink.failed("write-attribute requires a \"name\" parameter".to_string(), false);
            return OperationResult::new();
        };
        let Some(access) = self.registry.attribute_for(&ctx.address, &name) else {
            sink.failed(format!("no such attribute: {name}"), false);
            return OperationResult::new();
        };
        let old_value = access.read(ctx.submodel());
        let new_value = operation.get("value").deep_clone();
        access.write(ctx.submodel_mut(), new_value);
        sink.fragment(&[], Value::Undefined);
        let compensating = write_attribute_op(ctx, &name, old_value);
        sink.complete(Some(compensating.clone()));
        OperationResult::new().with_compensating_op(compensating)
    }
}

/// Answers `undefine-attribute`: resets `name` to `Undefined` via its
/// registered `AttributeAccess`, returning a `write-attribute` that restores
/// the prior value as its compensating operation.
pub struct UndefineAttributeHandler {
    registry: Registry,
}

impl UndefineAttributeHandler {
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl super::OperationHandler for UndefineAttributeHandler {
    fn capability(&self) -> Capability {
        Capability::Update
    }

    async fn handle(
        &self,
        ctx: &mut OperationContext,
        operation: &Value,
        sink: &dyn ResultSink,
    ) -> OperationResult {
        let Some(name) = operation.get("name").as_str().map(str::to_string) else {
            sink.failed("undefine-attribute requires a \"name\" parameter".to_string(), false);
            return OperationResult::new();
        };
        let Some(access) = self.registry.attribute_for(&ctx.address, &name) else {
            sink.failed(format!("no such attribute: {name}"), false);
            return OperationResult::new();
        };
        let old_value = access.read(ctx.submodel());
        access.write(ctx.submodel_mut(), Value::Undefined);
        sink.fragment(&[], Value::Undefined);
        let compensating = write_attribute_op(ctx, &name, old_value);
        sink.complete(Some(compensating.clone()));
        OperationResult::new().with_compensating_op(compensating)
    }
}

fn address_value(ctx: &OperationContext) -> Value {
    let elements: Vec<Value> = ctx
        .address
        .elements()
        .iter()
        .map(|e| Value::List(vec![Value::from(e.key.as_str()), Value::from(e.value.as_str())]))
        .collect();
    Value::List(elements)
}

fn remove_op_for(ctx: &OperationContext) -> Value {
    let mut op = Value::object();
    let obj = op.as_object_mut().expect("just constructed");
    obj.set("operation", Value::from("remove"));
    obj.set("address", address_value(ctx));
    op
}

fn add_op_for(ctx: &OperationContext, previous: Value) -> Value {
    let mut op = Value::object();
    let obj = op.as_object_mut().expect("just constructed");
    obj.set("operation", Value::from("add"));
    obj.set("address", address_value(ctx));
    obj.set("value", previous);
    op
}

fn good_op(ctx: &OperationContext, name: &str, value: Value) -> Value {
    let mut op = Value::object();
    let obj = op.as_object_mut().expect("just constructed");
    obj.set("operation", Value::from("good"));
    obj.set("address", address_value(ctx));
    obj.set("name", Value::from(name));
    obj.set("value", value);
    op
}

fn write_attribute_op(ctx: &OperationContext, name: &str, value: Value) -> Value {
    let mut op = Value::object();
    let obj = op.as_object_mut().expect("just constructed");
    obj.set("operation", Value::from("write-attribute"));
    obj.set("address", address_value(ctx));
    obj.set("name", Value::from(name));
    obj.set("value", value);
    op
}
