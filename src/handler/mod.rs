//! Operation handlers: the pluggable behaviors dispatched by address and
//! operation name.
//!
//! A handler is tagged with a [`Capability`] rather than living in a class
//! hierarchy; the controller branches on the tag to decide submodel-view
//! construction and write-back semantics (§4.1 step 5, §9 "deep class
//! hierarchies").

mod builtin;
mod cancellation;
mod context;
mod sink;

pub use builtin::{
    AddResourceHandler, BadHandler, GoodSwapHandler, ReadChildrenNamesHandler,
    ReadChildrenTypesHandler, ReadResourceHandler, RemoveResourceHandler, SlowHandler,
    UndefineAttributeHandler, WriteAttributeHandler,
};
pub use cancellation::CancellationHandle;
pub use context::{AttributeAccess, OperationContext, RuntimeTaskPort};
pub use sink::{ResultSink, Terminal};

use async_trait::async_trait;
use std::fmt;

use crate::value::Value;

/// Capability tag determining what the controller does with a handler's
/// submodel view before and after invocation (§4.1 step 5, §4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Read-only; submodel is a deep clone, never written back.
    Query,
    /// Mutates an existing resource; submodel is a live view replaced on
    /// success.
    Update,
    /// Creates a new resource; submodel starts empty, address must not
    /// already exist.
    Add,
    /// Deletes a resource; submodel is null, address is deleted on
    /// success.
    Remove,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::Query => "query",
            Capability::Update => "update",
            Capability::Add => "add",
            Capability::Remove => "remove",
        };
        write!(f, "{s}")
    }
}

/// What a handler reports once it has invoked the sink's terminal signal.
#[derive(Clone, Debug, Default)]
pub struct OperationResult {
    /// The operation that would undo this one, if any.
    pub compensating_op: Option<Value>,
    /// Whether this handler's in-flight work can be cancelled.
    pub cancellable: bool,
}

impl OperationResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_compensating_op(mut self, op: Value) -> Self {
        self.compensating_op = Some(op);
        self
    }

    #[must_use]
    pub fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }
}

/// Core handler trait. Implementations may call the sink synchronously or
/// spawn work and call it later; the engine assumes at-most-one terminal
/// call per sink (§4.3).
#[async_trait]
pub trait OperationHandler: Send + Sync {
    fn capability(&self) -> Capability;

    async fn handle(
        &self,
        ctx: &mut OperationContext,
        operation: &Value,
        sink: &dyn ResultSink,
    ) -> OperationResult;
}
