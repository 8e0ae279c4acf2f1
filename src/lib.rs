//! # domainctl: clustered application-server management control plane
//!
//! `domainctl` is the management core of a clustered application server: a hierarchical,
//! addressable configuration model that accepts structured operations, executes them
//! transactionally (with composites and compensating operations), and exposes that
//! capability over a binary wire protocol and an HTTP/JSON gateway.
//!
//! ## Module Guide
//!
//! - [`value`] — the self-describing dynamic value used for operations, results, and the
//!   model itself.
//! - [`address`] — ordered path addresses identifying nodes in the model tree.
//! - [`model`] — the mutable, mutex-guarded model tree.
//! - [`registry`] — the registration trie of operation handlers, attributes, and proxies.
//! - [`handler`] — the `OperationHandler` trait, capability tags, and built-in handlers.
//! - [`controller`] — the model controller: dispatch, submodel views, write-back.
//! - [`composite`] — the multi-step operation engine with rollback semantics.
//! - [`persistence`] — best-effort configuration persisters (in-memory, SQLite).
//! - [`wire`] — the asynchronous binary wire protocol and its dispatcher.
//! - [`gateway`] — the HTTP/JSON bridge.
//! - [`config`] — runtime configuration, loaded from environment.
//! - [`telemetry`] — tracing-subscriber initialization.
//!
//! ## Quick Start
//!
//! ```
//! use domainctl::address::PathAddress;
//! use domainctl::controller::ModelController;
//! use domainctl::handler::ReadResourceHandler;
//! use domainctl::model::ModelTree;
//! use domainctl::persistence::InMemoryPersister;
//! use domainctl::registry::Registry;
//! use domainctl::value::Value;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let registry = Registry::new();
//! registry
//!     .register_sub_model(&PathAddress::root())
//!     .unwrap()
//!     .register_operation_handler("read-resource", Arc::new(ReadResourceHandler), true, "/")
//!     .unwrap();
//!
//! let controller = ModelController::new(
//!     registry,
//!     ModelTree::new(),
//!     Arc::new(InMemoryPersister::new()),
//! );
//!
//! let mut op = Value::object();
//! op.as_object_mut().unwrap().set("operation", Value::from("read-resource"));
//! let envelope = controller.execute(op).await;
//! assert!(envelope.is_success());
//! # }
//! ```

pub mod address;
pub mod composite;
pub mod config;
pub mod controller;
pub mod gateway;
pub mod handler;
pub mod model;
pub mod persistence;
pub mod registry;
pub mod telemetry;
pub mod value;
pub mod wire;
