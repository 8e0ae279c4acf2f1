use std::sync::Arc;

use super::cancellation::CancellationHandle;
use crate::address::PathAddress;
use crate::value::Value;

/// A deferred side effect registered by a handler, executed after the
/// model-phase of a dispatch completes (§9 "service-container coupling").
pub type RuntimeTask = Box<dyn FnOnce() + Send>;

/// Narrow port the engine depends on for deferred side effects; handlers
/// reach it through [`OperationContext::register_runtime_task`] rather than
/// touching a service registry directly.
#[derive(Default)]
pub struct RuntimeTaskPort {
    tasks: Vec<RuntimeTask>,
}

impl RuntimeTaskPort {
    pub fn register(&mut self, task: RuntimeTask) {
        self.tasks.push(task);
    }

    /// Run every registered task in registration order. Called by the
    /// controller once a dispatch's model phase has committed (or, for
    /// `rollback-on-runtime-failure=false` composites, even when it has
    /// not — §4.4 step 5).
    pub fn run_all(self) {
        for task in self.tasks {
            task();
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Read/write accessors for a single registered attribute (§4.2
/// `registerAttribute`).
#[derive(Clone)]
pub struct AttributeAccess {
    read: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
    write: Arc<dyn Fn(&mut Value, Value) + Send + Sync>,
}

impl AttributeAccess {
    pub fn new(
        read: impl Fn(&Value) -> Value + Send + Sync + 'static,
        write: impl Fn(&mut Value, Value) + Send + Sync + 'static,
    ) -> Self {
        Self {
            read: Arc::new(read),
            write: Arc::new(write),
        }
    }

    /// A plain pass-through accessor storing the attribute directly under
    /// `name` in the resource's submodel.
    pub fn simple(name: impl Into<String>) -> Self {
        let name = name.into();
        let read_name = name.clone();
        Self::new(
            move |model| model.get(&read_name).clone(),
            move |model, value| {
                model.get_mut(&name);
                if let Some(obj) = model.as_object_mut() {
                    obj.set(name.clone(), value);
                }
            },
        )
    }

    #[must_use]
    pub fn read(&self, model: &Value) -> Value {
        (self.read)(model)
    }

    pub fn write(&self, model: &mut Value, value: Value) {
        (self.write)(model, value);
    }
}

/// Bound to `(submodel, runtime task port)` for the duration of one
/// handler invocation (§4.1 step 6).
pub struct OperationContext {
    submodel: Value,
    pub address: PathAddress,
    pub runtime: RuntimeTaskPort,
    pub cancellation: CancellationHandle,
}

impl OperationContext {
    #[must_use]
    pub fn new(address: PathAddress, submodel: Value) -> Self {
        Self {
            submodel,
            address,
            runtime: RuntimeTaskPort::default(),
            cancellation: CancellationHandle::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationHandle) -> Self {
        self.cancellation = cancellation;
        self
    }

    #[must_use]
    pub fn submodel(&self) -> &Value {
        &self.submodel
    }

    pub fn submodel_mut(&mut self) -> &mut Value {
        &mut self.submodel
    }

    pub fn set_submodel(&mut self, value: Value) {
        self.submodel = value;
    }

    /// Consume the context, yielding the final submodel for write-back.
    #[must_use]
    pub fn into_submodel(self) -> (Value, RuntimeTaskPort) {
        (self.submodel, self.runtime)
    }

    pub fn register_runtime_task(&mut self, task: RuntimeTask) {
        self.runtime.register(task);
    }
}
