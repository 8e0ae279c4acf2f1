use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::proxy::ProxyController;
use super::{AttributeMap, ChildMap, HandlerMap, RegistryError, child_key};
use crate::address::{PathAddress, PathElement};
use crate::handler::{AttributeAccess, OperationHandler};
use crate::value::Value;

type DescriptionFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// A single node of the registration trie. Parent→child links are owned
/// (`Arc` in the parent's child map); there is no child→parent
/// back-reference since nothing here needs one (location strings are
/// rendered top-down from an address, not bottom-up from a node — §9 notes
/// the weak-back-reference pattern as the alternative when that need does
/// arise).
pub struct RegistryNode {
    handlers: HandlerMap,
    attributes: AttributeMap,
    children: RwLock<ChildMap>,
    proxy: RwLock<Option<Arc<dyn ProxyController>>>,
    description: RwLock<Option<DescriptionFn>>,
}

impl RegistryNode {
    pub(super) fn new() -> Self {
        Self {
            handlers: RwLock::new(FxHashMap::default()),
            attributes: RwLock::new(FxHashMap::default()),
            children: RwLock::new(FxHashMap::default()),
            proxy: RwLock::new(None),
            description: RwLock::new(None),
        }
    }

    pub(super) fn child(self: &Arc<Self>, element: &PathElement) -> Option<Arc<RegistryNode>> {
        self.children.read().get(&child_key(element)).cloned()
    }

    pub(super) fn child_or_create(self: &Arc<Self>, element: &PathElement) -> Arc<RegistryNode> {
        let key = child_key(element);
        if let Some(existing) = self.children.read().get(&key).cloned() {
            return existing;
        }
        let mut children = self.children.write();
        Arc::clone(
            children
                .entry(key)
                .or_insert_with(|| Arc::new(RegistryNode::new())),
        )
    }

    pub(super) fn proxy(&self) -> Option<Arc<dyn ProxyController>> {
        self.proxy.read().clone()
    }

    pub(super) fn set_proxy(&self, proxy: Arc<dyn ProxyController>) {
        *self.proxy.write() = Some(proxy);
    }

    pub(super) fn clear_proxy(&self) {
        *self.proxy.write() = None;
    }

    pub(super) fn has_descendants(&self) -> bool {
        !self.children.read().is_empty()
    }

    pub(super) fn is_empty_registration(&self) -> bool {
        self.handlers.read().is_empty() && self.attributes.read().is_empty()
    }

    pub(super) fn register_handler(
        &self,
        name: &str,
        handler: Arc<dyn OperationHandler>,
        inherited: bool,
        location: &str,
    ) -> Result<(), RegistryError> {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(name) {
            return Err(RegistryError::DuplicateHandler {
                location: location.to_string(),
                name: name.to_string(),
            });
        }
        handlers.insert(name.to_string(), (handler, inherited));
        Ok(())
    }

    pub(super) fn unregister_handler(&self, name: &str) {
        self.handlers.write().remove(name);
    }

    pub(super) fn exact_handler(&self, name: &str) -> Option<Arc<dyn OperationHandler>> {
        self.handlers.read().get(name).map(|(h, _)| Arc::clone(h))
    }

    pub(super) fn inherited_handler(&self, name: &str) -> Option<Arc<dyn OperationHandler>> {
        self.handlers
            .read()
            .get(name)
            .filter(|(_, inherited)| *inherited)
            .map(|(h, _)| Arc::clone(h))
    }

    pub(super) fn register_attribute(&self, name: &str, access: AttributeAccess) {
        self.attributes.write().insert(name.to_string(), access);
    }

    pub(super) fn attribute(&self, name: &str) -> Option<AttributeAccess> {
        self.attributes.read().get(name).cloned()
    }

    pub(super) fn set_description(&self, description: DescriptionFn) {
        *self.description.write() = Some(description);
    }

    pub(super) fn describe(&self) -> Value {
        match self.description.read().as_ref() {
            Some(f) => f(),
            None => Value::object(),
        }
    }

    pub(super) fn child_type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .children
            .read()
            .keys()
            .map(|(key, _)| key.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub(super) fn child_addresses(&self, base: &PathAddress) -> Vec<PathAddress> {
        self.children
            .read()
            .keys()
            .map(|(key, value)| base.append(PathElement::new(key.clone(), value.clone())))
            .collect()
    }

    pub(super) fn collect_proxies(
        self: &Arc<Self>,
        here: PathAddress,
        out: &mut Vec<(PathAddress, Arc<dyn ProxyController>)>,
    ) {
        if let Some(proxy) = self.proxy() {
            out.push((here, proxy));
            return;
        }
        for ((key, value), child) in self.children.read().iter() {
            let child_addr = here.append(PathElement::new(key.clone(), value.clone()));
            child.collect_proxies(child_addr, out);
        }
    }
}

/// Handle returned by [`super::Registry::register_sub_model`], scoping
/// subsequent `registerOperationHandler`/`registerAttribute` calls to the
/// node just created (§4.2).
pub struct ChildRegistration {
    node: Arc<RegistryNode>,
}

impl ChildRegistration {
    pub(super) fn new(node: Arc<RegistryNode>) -> Self {
        Self { node }
    }

    pub fn set_description(&self, description: impl Fn() -> Value + Send + Sync + 'static) {
        self.node.set_description(Arc::new(description));
    }

    pub fn register_operation_handler(
        &self,
        name: &str,
        handler: Arc<dyn OperationHandler>,
        inherited: bool,
        location: &str,
    ) -> Result<(), RegistryError> {
        self.node.register_handler(name, handler, inherited, location)
    }

    pub fn register_attribute(&self, name: &str, access: AttributeAccess) {
        self.node.register_attribute(name, access);
    }

    pub fn register_proxy_controller(&self, proxy: Arc<dyn ProxyController>) -> Result<(), RegistryError> {
        if self.node.has_descendants() || !self.node.is_empty_registration() {
            return Err(RegistryError::ProxyConflict("<child registration>".to_string()));
        }
        self.node.set_proxy(proxy);
        Ok(())
    }
}
