//! The registration trie: a rooted tree keyed by path-address elements,
//! each node holding operation handlers, attribute accessors, child
//! sub-registries, and an optional proxy that absorbs its subtree (§4.2).
//!
//! Registration is rare relative to lookup, so each node's handler and
//! attribute tables are `parking_lot::RwLock`-guarded maps rather than a
//! literal copy-on-write structure: reads are effectively uncontended in
//! the steady state, matching the "lookups are lock-free" intent of §5
//! without the extra machinery of an arc-swap per node.

mod node;
mod proxy;

pub use node::{ChildRegistration, RegistryNode};
pub use proxy::ProxyController;

use std::sync::Arc;

use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::address::{PathAddress, PathElement};
use crate::handler::{Capability, OperationHandler};
use crate::value::Value;

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("handler {name:?} already registered at {location}")]
    #[diagnostic(code(domainctl::registry::duplicate_handler))]
    DuplicateHandler { location: String, name: String },

    #[error("cannot register under proxied address: {0}")]
    #[diagnostic(
        code(domainctl::registry::under_proxy),
        help("the subtree at this address is owned by a proxy controller")
    )]
    UnderProxy(String),

    #[error("proxy registration at {0} conflicts with existing registrations")]
    #[diagnostic(code(domainctl::registry::proxy_conflict))]
    ProxyConflict(String),
}

/// A resolved handler together with the flag distinguishing an
/// exact-node match from an inherited ancestor match (needed by invariant
/// 5's "most specific non-inherited, else nearest inherited ancestor"
/// rule).
pub struct HandlerLookup {
    pub handler: Arc<dyn OperationHandler>,
    pub inherited: bool,
}

/// Handle to the registration trie root.
#[derive(Clone)]
pub struct Registry {
    root: Arc<RegistryNode>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Arc::new(RegistryNode::new()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Arc<RegistryNode> {
        &self.root
    }

    /// Walk from the root to `address`, creating intermediate nodes as
    /// needed, and registering a subregistry at each hop. Fails if any
    /// ancestor segment (or the target itself) falls under an existing
    /// proxy.
    #[instrument(skip(self), fields(address = %address))]
    pub fn register_sub_model(&self, address: &PathAddress) -> Result<ChildRegistration, RegistryError> {
        let mut current = Arc::clone(&self.root);
        let mut walked = PathAddress::root();
        for element in address.elements() {
            if current.proxy().is_some() {
                return Err(RegistryError::UnderProxy(walked.to_location_string()));
            }
            current = current.child_or_create(element);
            walked = walked.append(element.clone());
        }
        Ok(ChildRegistration::new(current))
    }

    #[instrument(skip(self, handler), fields(address = %address, name = %name))]
    pub fn register_operation_handler(
        &self,
        address: &PathAddress,
        name: &str,
        handler: Arc<dyn OperationHandler>,
        inherited: bool,
    ) -> Result<(), RegistryError> {
        let node = self.node_at(address);
        node.register_handler(name, handler, inherited, &address.to_location_string())
    }

    #[instrument(skip(self, access), fields(address = %address, name = %name))]
    pub fn register_attribute(
        &self,
        address: &PathAddress,
        name: &str,
        access: crate::handler::AttributeAccess,
    ) {
        let node = self.node_at(address);
        node.register_attribute(name, access);
    }

    /// Register a proxy controller at `address`. Rejected if `address` is
    /// a prefix of, or prefixed by, any existing registration (§4.2
    /// invariant).
    #[instrument(skip(self, proxy), fields(address = %address))]
    pub fn register_proxy_controller(
        &self,
        address: &PathAddress,
        proxy: Arc<dyn ProxyController>,
    ) -> Result<(), RegistryError> {
        let node = self.node_at(address);
        if node.has_descendants() || !node.is_empty_registration() {
            return Err(RegistryError::ProxyConflict(address.to_location_string()));
        }
        node.set_proxy(proxy);
        Ok(())
    }

    pub fn unregister_proxy_controller(&self, address: &PathAddress) {
        if let Some(node) = self.find(address) {
            node.clear_proxy();
        }
    }

    pub fn unregister_operation_handler(&self, address: &PathAddress, name: &str) {
        if let Some(node) = self.find(address) {
            node.unregister_handler(name);
        }
    }

    /// Walk the trie from root to `address`, stopping early at the nearest
    /// proxy (§4.2 "proxy absorption": every address with that prefix
    /// resolves to the proxy and nothing underneath is visited).
    #[must_use]
    pub fn proxy_owning(&self, address: &PathAddress) -> Option<(PathAddress, Arc<dyn ProxyController>)> {
        let mut current = Arc::clone(&self.root);
        let mut walked = PathAddress::root();
        if let Some(proxy) = current.proxy() {
            return Some((walked, proxy));
        }
        for element in address.elements() {
            let Some(child) = current.child(element) else {
                return None;
            };
            current = child;
            walked = walked.append(element.clone());
            if let Some(proxy) = current.proxy() {
                return Some((walked, proxy));
            }
        }
        None
    }

    /// `handlerFor(address, name)`: most specific non-inherited handler,
    /// else the nearest inherited ancestor handler (invariant 5).
    #[must_use]
    pub fn handler_for(&self, address: &PathAddress, name: &str) -> Option<HandlerLookup> {
        let mut current = Arc::clone(&self.root);
        let mut inherited_match: Option<Arc<dyn OperationHandler>> = None;
        if let Some(h) = current.inherited_handler(name) {
            inherited_match = Some(h);
        }
        for element in address.elements() {
            let Some(child) = current.child(element) else {
                debug!(address = %address, name, "registry lookup stopped: no such child");
                return inherited_match.map(|handler| HandlerLookup {
                    handler,
                    inherited: true,
                });
            };
            current = child;
            if let Some(h) = current.inherited_handler(name) {
                inherited_match = Some(h);
            }
        }
        if let Some(handler) = current.exact_handler(name) {
            return Some(HandlerLookup {
                handler,
                inherited: false,
            });
        }
        inherited_match.map(|handler| HandlerLookup {
            handler,
            inherited: true,
        })
    }

    #[must_use]
    pub fn attribute_for(&self, address: &PathAddress, name: &str) -> Option<crate::handler::AttributeAccess> {
        self.find(address)?.attribute(name)
    }

    #[must_use]
    pub fn description_at(&self, address: &PathAddress) -> Value {
        self.find(address)
            .map(|node| node.describe())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn child_names(&self, address: &PathAddress) -> Vec<String> {
        self.find(address)
            .map(|node| node.child_type_names())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn child_addresses(&self, address: &PathAddress) -> Vec<PathAddress> {
        self.find(address)
            .map(|node| node.child_addresses(address))
            .unwrap_or_default()
    }

    /// All proxies registered at or under `address`, paired with their
    /// absolute anchor address.
    #[must_use]
    pub fn all_proxies_under(&self, address: &PathAddress) -> Vec<(PathAddress, Arc<dyn ProxyController>)> {
        let mut out = Vec::new();
        if let Some(node) = self.find(address) {
            node.collect_proxies(address.clone(), &mut out);
        }
        out
    }

    fn find(&self, address: &PathAddress) -> Option<Arc<RegistryNode>> {
        let mut current = Arc::clone(&self.root);
        for element in address.elements() {
            current = current.child(element)?;
        }
        Some(current)
    }

    fn node_at(&self, address: &PathAddress) -> Arc<RegistryNode> {
        let mut current = Arc::clone(&self.root);
        for element in address.elements() {
            current = current.child_or_create(element);
        }
        current
    }
}

type ChildKey = (String, String);

/// Internal convenience: the two-level child map (type then instance)
/// flattened to a single key for storage, matching §4.2's description of
/// `children: map<key, SubRegistry>` where `SubRegistry: map<value,
/// ChildNode>`.
pub(crate) type ChildMap = FxHashMap<ChildKey, Arc<RegistryNode>>;

pub(crate) fn child_key(element: &PathElement) -> ChildKey {
    (element.key.clone(), element.value.clone())
}

pub(crate) type HandlerMap = RwLock<FxHashMap<String, (Arc<dyn OperationHandler>, bool)>>;
pub(crate) type AttributeMap = RwLock<FxHashMap<String, crate::handler::AttributeAccess>>;

/// Capability-agnostic helper used by built-in query handlers: true if the
/// handler tag reads rather than mutates.
#[must_use]
pub fn is_read_only(capability: Capability) -> bool {
    matches!(capability, Capability::Query)
}
