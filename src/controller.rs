//! Model controller: the single entry point that turns an `operation` [`Value`] into a
//! terminal outcome against a [`ModelTree`].
//!
//! Every call to [`ModelController::dispatch`] walks the same algorithm (§4.1):
//!
//! 1. Parse `operation["address"]` into a [`PathAddress`].
//! 2. Resolve the nearest proxy above that address. If one exists, rebase the operation's
//!    address onto the proxy's anchor and forward to [`ProxyController::forward`] instead
//!    of running the rest of the pipeline.
//! 3. If the address is empty and `operation["operation"] == "composite"`, delegate to
//!    [`crate::composite`] rather than looking up a handler.
//! 4. Otherwise resolve a handler via `registry.handler_for(address, name)` (exact match
//!    preferred, nearest inherited ancestor otherwise) and fail with
//!    [`DispatchError::NoSuchHandler`] if none exists.
//! 5. Build a submodel view appropriate to the handler's [`Capability`], construct an
//!    [`OperationContext`], and run the handler.
//! 6. Write the (possibly mutated) submodel back into the tree for `Update`/`Add`, or erase
//!    it for `Remove`, then best-effort persist the new snapshot.
//!
//! Persistence failures never fail the operation itself — the controller only logs a
//! warning, per the ambient error taxonomy in `SPEC_FULL.md` §10.2.
use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::address::{PathAddress, PathElement};
use crate::handler::{
    CancellationHandle, Capability, OperationContext, OperationHandler, OperationResult,
    ResultSink, Terminal,
};
use crate::model::ModelTree;
use crate::persistence::{ConfigurationPersister, PersisterError};
use crate::registry::{ProxyController, Registry};
use crate::value::Value;

/// Everything that can go wrong while dispatching a single operation.
#[derive(Debug, Error, Diagnostic)]
pub enum DispatchError {
    #[error("operation is missing a required field: {0}")]
    #[diagnostic(
        code(domainctl::controller::invalid_operation),
        help("operations must be objects with at least an \"operation\" field")
    )]
    InvalidOperationFormat(String),

    #[error("no handler registered for address {address} capable of serving \"{name}\"")]
    #[diagnostic(
        code(domainctl::controller::no_such_handler),
        help("register an operation handler at this address or an ancestor")
    )]
    NoSuchHandler { address: String, name: String },

    #[error("handler reported failure: {0}")]
    #[diagnostic(code(domainctl::controller::handler_failed))]
    HandlerFailed(String),

    #[error("handler produced more than one terminal signal")]
    #[diagnostic(code(domainctl::controller::handler_threw))]
    HandlerThrew,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Model(#[from] crate::model::ModelError),
}

/// The terminal outcome of a dispatched operation, mirroring the wire protocol's
/// `outcome ∈ {success,failed,cancelled}` split (§3 Result Envelope).
#[derive(Debug, Clone)]
pub enum Envelope {
    Complete {
        result: Value,
        compensating_operation: Option<Value>,
    },
    Failed {
        result: Value,
        description: String,
        rolled_back: bool,
    },
    Cancelled,
}

impl Envelope {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Complete { .. })
    }

    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        match self {
            Envelope::Complete { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Render as a `Result Envelope` value per §3: ordered keys `outcome`, `result`,
    /// `failure-description` (only when failed), `compensating-operation`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut obj = Value::object();
        let fields = obj.as_object_mut().expect("just constructed");
        match self {
            Envelope::Complete {
                result,
                compensating_operation,
            } => {
                fields.set("outcome", Value::from("success"));
                fields.set("result", result.clone());
                fields.set(
                    "compensating-operation",
                    compensating_operation.clone().unwrap_or(Value::Undefined),
                );
            }
            Envelope::Failed {
                result,
                description,
                rolled_back,
            } => {
                fields.set("outcome", Value::from("failed"));
                fields.set("result", result.clone());
                fields.set("failure-description", Value::from(description.as_str()));
                if *rolled_back {
                    fields.set("rolled-back", Value::Bool(true));
                }
            }
            Envelope::Cancelled => {
                fields.set("outcome", Value::from("cancelled"));
            }
        }
        obj
    }
}

/// A collected, in-process [`ResultSink`] used whenever the caller wants a single
/// [`Envelope`] rather than a stream of fragments (e.g. the HTTP gateway, tests, the
/// synchronous half of the wire protocol). Detects a second terminal call and turns it
/// into a `handler-threw`-classed failure per the [`ResultSink`] contract note.
pub struct CollectingSink {
    fragments: Mutex<Vec<(Vec<String>, Value)>>,
    terminal: Mutex<Option<Terminal>>,
}

impl Default for CollectingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fragments: Mutex::new(Vec::new()),
            terminal: Mutex::new(None),
        }
    }

    fn set_terminal(&self, terminal: Terminal) {
        let mut slot = self.terminal.lock();
        if slot.is_some() {
            *slot = Some(Terminal::Failed {
                description: DispatchError::HandlerThrew.to_string(),
                rolled_back: false,
            });
            return;
        }
        *slot = Some(terminal);
    }

    /// Consumes the sink and folds any fragments plus the terminal into an [`Envelope`].
    #[must_use]
    pub fn into_envelope(self) -> Envelope {
        let terminal = self.terminal.into_inner();
        match terminal {
            Some(Terminal::Complete { compensating_op }) => Envelope::Complete {
                result: self.fold_fragments(),
                compensating_operation: compensating_op,
            },
            Some(Terminal::Failed { description, rolled_back }) => Envelope::Failed {
                result: self.fold_fragments(),
                description,
                rolled_back,
            },
            Some(Terminal::Cancelled) => Envelope::Cancelled,
            None => Envelope::Failed {
                result: Value::Undefined,
                description: "handler never produced a terminal outcome".to_string(),
                rolled_back: false,
            },
        }
    }

    fn fold_fragments(&self) -> Value {
        let fragments = self.fragments.lock();
        if fragments.is_empty() {
            return Value::Undefined;
        }
        if fragments.len() == 1 && fragments[0].0.is_empty() {
            return fragments[0].1.clone();
        }
        let mut root = Value::object();
        for (location, value) in fragments.iter() {
            set_at_location(&mut root, location, value.clone());
        }
        root
    }
}

fn set_at_location(root: &mut Value, location: &[String], value: Value) {
    if location.is_empty() {
        *root = value;
        return;
    }
    let mut cursor = root;
    for key in &location[..location.len() - 1] {
        cursor = cursor.get_mut(key);
    }
    if let Some(obj) = cursor.as_object_mut() {
        obj.set(location.last().unwrap().clone(), value);
    }
}

impl ResultSink for CollectingSink {
    fn fragment(&self, location: &[String], value: Value) {
        self.fragments.lock().push((location.to_vec(), value));
    }

    fn complete(&self, compensating_op: Option<Value>) {
        self.set_terminal(Terminal::Complete { compensating_op });
    }

    fn failed(&self, description: String, rolled_back: bool) {
        self.set_terminal(Terminal::Failed { description, rolled_back });
    }

    fn cancelled(&self) {
        self.set_terminal(Terminal::Cancelled);
    }
}

/// A handle to an in-flight asynchronous dispatch: the caller can [`cancel`](Self::cancel)
/// it, or [`join`](Self::join) for the terminal [`Envelope`].
pub struct OperationHandle {
    cancellation: CancellationHandle,
    task: tokio::task::JoinHandle<Envelope>,
}

impl OperationHandle {
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub async fn join(self) -> Envelope {
        match self.task.await {
            Ok(envelope) => envelope,
            Err(_) => Envelope::Failed {
                result: Value::Undefined,
                description: "dispatch task was aborted".to_string(),
                rolled_back: false,
            },
        }
    }
}

/// The model controller: ties a [`Registry`] of handlers to a live [`ModelTree`] and a
/// [`ConfigurationPersister`] for best-effort durability.
#[derive(Clone)]
pub struct ModelController {
    registry: Registry,
    tree: ModelTree,
    persister: Arc<dyn ConfigurationPersister>,
}

impl ModelController {
    #[must_use]
    pub fn new(
        registry: Registry,
        tree: ModelTree,
        persister: Arc<dyn ConfigurationPersister>,
    ) -> Self {
        Self {
            registry,
            tree,
            persister,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn tree(&self) -> &ModelTree {
        &self.tree
    }

    /// Runs `operation` to completion and returns the collected envelope (the blocking
    /// `execute(op)` form of §4.1).
    pub async fn execute(&self, operation: Value) -> Envelope {
        let sink = CollectingSink::new();
        self.dispatch(operation, &sink, CancellationHandle::new())
            .await;
        sink.into_envelope()
    }

    /// Spawns `operation` as an asynchronous task, returning a handle that can be
    /// cancelled or awaited independently of the caller's own task (§4.1 `execute(op,
    /// sink)`).
    pub fn execute_async(&self, operation: Value) -> OperationHandle {
        let cancellation = CancellationHandle::new();
        let controller = self.clone();
        let cancellation_for_task = cancellation.clone();
        let task = tokio::spawn(async move {
            let sink = CollectingSink::new();
            controller
                .dispatch(operation, &sink, cancellation_for_task)
                .await;
            sink.into_envelope()
        });
        OperationHandle { cancellation, task }
    }

    /// The core dispatch algorithm. Fragments and the terminal outcome are pushed onto
    /// `sink` as they become available; callers that want a single [`Envelope`] should use
    /// [`Self::execute`].
    #[instrument(skip(self, operation, sink, cancellation), fields(operation = %operation_name(&operation), address))]
    pub async fn dispatch(
        &self,
        operation: Value,
        sink: &dyn ResultSink,
        cancellation: CancellationHandle,
    ) {
        if cancellation.is_cancelled() {
            debug!("dispatch short-circuited: already cancelled");
            sink.cancelled();
            return;
        }

        let Some(name) = operation.get("operation").as_str().map(str::to_string) else {
            warn!("rejecting operation with no \"operation\" field");
            sink.failed(DispatchError::InvalidOperationFormat("operation".to_string()).to_string(), false);
            return;
        };

        let address = match parse_address(&operation) {
            Ok(address) => address,
            Err(message) => {
                warn!("rejecting operation with malformed address: {message}");
                sink.failed(DispatchError::InvalidOperationFormat("address".to_string()).to_string(), false);
                return;
            }
        };
        tracing::Span::current().record("address", tracing::field::display(&address));

        if let Some((anchor, proxy)) = self.registry.proxy_owning(&address) {
            let Some(rebased) = address.relative_to(&anchor) else {
                warn!("proxy anchor was not a prefix of the resolved address");
                sink.failed(DispatchError::InvalidOperationFormat("address".to_string()).to_string(), false);
                return;
            };
            debug!(anchor = %anchor, "forwarding through proxy controller");
            let mut rebased_operation = operation.clone();
            set_address(&mut rebased_operation, &rebased);
            proxy.forward(rebased_operation, sink).await;
            return;
        }

        if address.is_root() && name == "composite" {
            debug!("delegating to composite engine");
            crate::composite::execute_composite(self, operation, sink, cancellation).await;
            return;
        }

        let Some(lookup) = self.registry.handler_for(&address, &name) else {
            warn!("no handler registered for this address/operation pair");
            sink.failed(
                DispatchError::NoSuchHandler {
                    address: address.to_location_string(),
                    name,
                }
                .to_string(),
                false,
            );
            return;
        };

        debug!(inherited = lookup.inherited, "handler resolved");
        self.run_handler(&address, lookup.handler, &name, operation, sink, cancellation)
            .await;
    }

    async fn run_handler(
        &self,
        address: &PathAddress,
        handler: Arc<dyn OperationHandler>,
        name: &str,
        operation: Value,
        sink: &dyn ResultSink,
        cancellation: CancellationHandle,
    ) {
        let capability = handler.capability();

        if capability == Capability::Add && self.tree.exists(address) {
            warn!("add handler target already exists");
            sink.failed(crate::model::ModelError::AlreadyExists(address.to_location_string()).to_string(), false);
            return;
        }

        let submodel = self.submodel_for(address, capability);
        let mut ctx = OperationContext::new(address.clone(), submodel).with_cancellation(cancellation.clone());

        let _outcome: OperationResult = handler.handle(&mut ctx, &operation, sink).await;
        let (submodel, runtime_tasks) = ctx.into_submodel();

        if cancellation.is_cancelled() {
            debug!("operation cancelled during handler execution");
            sink.cancelled();
            return;
        }

        if capability != Capability::Query {
            if let Err(write_err) = self.write_back(address, capability, submodel) {
                warn!(error = %write_err, "failed to write model back for {name}");
                sink.failed(write_err.to_string(), false);
                return;
            }
        }

        runtime_tasks.run_all();

        if let Err(persist_err) = self.persist().await {
            warn!(error = %persist_err, "best-effort persistence failed after {name}");
        }
    }

    fn submodel_for(&self, address: &PathAddress, capability: Capability) -> Value {
        match capability {
            Capability::Add => Value::Undefined,
            Capability::Remove | Capability::Query | Capability::Update => self.tree.read(address),
        }
    }

    fn write_back(
        &self,
        address: &PathAddress,
        capability: Capability,
        submodel: Value,
    ) -> Result<(), crate::model::ModelError> {
        match capability {
            Capability::Query => Ok(()),
            Capability::Remove => self.tree.remove(address),
            Capability::Add | Capability::Update => self.tree.write(address, submodel),
        }
    }

    /// Persist the current snapshot of the whole tree. Exposed at `pub(crate)` visibility
    /// so the composite engine can trigger the same best-effort persistence after merging
    /// a working model back (§4.4 step 3).
    pub(crate) async fn persist(&self) -> Result<(), PersisterError> {
        let snapshot = self.tree.snapshot();
        self.persister.store(snapshot).await
    }
}

/// A [`ProxyController`] that forwards to another in-process [`ModelController`]
/// (§4.2 "proxy absorption", §8 scenario 5). Host-side federation that crosses a
/// real network boundary is out of scope here; this is the in-process shape
/// that boundary would sit behind.
pub struct LocalProxyController {
    controller: ModelController,
}

impl LocalProxyController {
    #[must_use]
    pub fn new(controller: ModelController) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl ProxyController for LocalProxyController {
    async fn forward(&self, operation: Value, sink: &dyn ResultSink) -> OperationResult {
        self.controller
            .dispatch(operation, sink, CancellationHandle::new())
            .await;
        OperationResult::new()
    }
}

fn operation_name(operation: &Value) -> String {
    operation
        .get("operation")
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| "<unnamed>".to_string())
}

/// Parses `operation["address"]`, a list of `[key, value]` two-element lists, into a
/// [`PathAddress`]. An absent `address` key is treated as the root.
fn parse_address(operation: &Value) -> Result<PathAddress, String> {
    let raw = operation.get("address");
    if !raw.is_defined() {
        return Ok(PathAddress::root());
    }
    let Some(list) = raw.as_list() else {
        return Err("address must be a list".to_string());
    };
    let mut elements = Vec::with_capacity(list.len());
    for entry in list {
        let pair = entry
            .as_list()
            .ok_or_else(|| "address element must be a [key, value] pair".to_string())?;
        let [key, value] = pair else {
            return Err("address element must have exactly two entries".to_string());
        };
        let key = key
            .as_str()
            .ok_or_else(|| "address key must be a string".to_string())?;
        let value = value
            .as_str()
            .ok_or_else(|| "address value must be a string".to_string())?;
        elements.push(PathElement::new(key, value));
    }
    Ok(PathAddress::from_elements(elements))
}

/// Renders `address` back into operation-encoded form and writes it into `operation`.
pub fn set_address(operation: &mut Value, address: &PathAddress) {
    if !operation.is_object() {
        *operation = Value::object();
    }
    let list = address
        .elements()
        .iter()
        .map(|e| Value::List(vec![Value::from(e.key.as_str()), Value::from(e.value.as_str())]))
        .collect();
    operation
        .as_object_mut()
        .expect("just normalized to object")
        .set("address", Value::List(list));
}
