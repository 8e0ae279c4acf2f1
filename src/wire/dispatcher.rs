//! Connection-level dispatch: parses request frames, runs them through a
//! [`ModelController`], and streams the response back through a [`StreamWriter`]
//! (§4.5, §6).
//!
//! A synchronous `EXECUTE_SYNCHRONOUS` request and an asynchronous
//! `EXECUTE_ASYNCHRONOUS` request both flow through the same path: the controller's
//! [`ResultSink`] calls are forwarded onto an unbounded [`flume`] channel (the same
//! channel-sink pattern used to bridge a synchronous callback into an async consumer
//! elsewhere in this codebase), and a dedicated task drains that channel into the
//! connection's [`StreamWriter`], one frame per event, stopping at the first terminal
//! event. The only difference is *when* the caller gets its request ID back: up front
//! for an asynchronous dispatch (so it has something to cancel), only embedded in the
//! terminal frame for a synchronous one.
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, instrument, warn};

use crate::controller::ModelController;
use crate::handler::{CancellationHandle, ResultSink};
use crate::value::Value;
use crate::wire::codec::{read_cstring, read_value};
use crate::wire::protocol::{
    CANCEL_ASYNCHRONOUS_OPERATION, EXECUTE_ASYNCHRONOUS, EXECUTE_SYNCHRONOUS, ProtocolError,
    REGISTER_HOST_CONTROLLER, REQUEST_OPERATION, StreamWriter, UNREGISTER_HOST_CONTROLLER,
};

/// Parsed request-code-specific body (§4.5).
enum Request {
    Execute {
        operation: Value,
        asynchronous: bool,
    },
    Cancel {
        request_id: u32,
    },
    RegisterHost {
        host_id: String,
        model: Value,
    },
    UnregisterHost {
        host_id: String,
    },
}

async fn read_request<R>(r: &mut R) -> Result<(u8, Request), ProtocolError>
where
    R: AsyncRead + Unpin + Send,
{
    let handler_id = r.read_u8().await?;
    let marker = r.read_u8().await?;
    if marker != REQUEST_OPERATION {
        return Err(ProtocolError::BadMarker { found: marker });
    }
    let code = r.read_u8().await?;
    let request = match code {
        EXECUTE_SYNCHRONOUS | EXECUTE_ASYNCHRONOUS => {
            let _param_operation = r.read_u8().await?;
            let operation = read_value(r).await?;
            Request::Execute {
                operation,
                asynchronous: code == EXECUTE_ASYNCHRONOUS,
            }
        }
        CANCEL_ASYNCHRONOUS_OPERATION => {
            let _param_request_id = r.read_u8().await?;
            let request_id = r.read_u32().await?;
            Request::Cancel { request_id }
        }
        REGISTER_HOST_CONTROLLER => {
            let _param_host_id = r.read_u8().await?;
            let host_id = read_cstring(r).await?;
            let _param_model = r.read_u8().await?;
            let model = read_value(r).await?;
            Request::RegisterHost { host_id, model }
        }
        UNREGISTER_HOST_CONTROLLER => {
            let _param_host_id = r.read_u8().await?;
            let host_id = read_cstring(r).await?;
            Request::UnregisterHost { host_id }
        }
        other => return Err(ProtocolError::UnknownRequestCode(other)),
    };
    Ok((handler_id, request))
}

enum WireEvent {
    Fragment { location: Vec<String>, value: Value },
    Complete { compensating_operation: Option<Value> },
    Failed { description: String, rolled_back: bool },
    Cancelled,
}

struct ChannelResultSink {
    tx: flume::Sender<WireEvent>,
}

impl ResultSink for ChannelResultSink {
    fn fragment(&self, location: &[String], value: Value) {
        let _ = self.tx.send(WireEvent::Fragment {
            location: location.to_vec(),
            value,
        });
    }

    fn complete(&self, compensating_op: Option<Value>) {
        let _ = self.tx.send(WireEvent::Complete {
            compensating_operation: compensating_op,
        });
    }

    fn failed(&self, description: String, rolled_back: bool) {
        let _ = self.tx.send(WireEvent::Failed {
            description,
            rolled_back,
        });
    }

    fn cancelled(&self) {
        let _ = self.tx.send(WireEvent::Cancelled);
    }
}

/// Drains `rx` into `writer`, stopping after the first terminal event (`Complete`,
/// `Failed`, or `Cancelled`); `Fragment`s before it are written in order.
async fn drive_responses<W>(
    writer: Arc<StreamWriter<W>>,
    handler_id: u8,
    request_id: u32,
    rx: flume::Receiver<WireEvent>,
) where
    W: AsyncWrite + Unpin + Send,
{
    while let Ok(event) = rx.recv_async().await {
        let terminal = matches!(
            event,
            WireEvent::Complete { .. } | WireEvent::Failed { .. } | WireEvent::Cancelled
        );
        let write_result = match event {
            WireEvent::Fragment { location, value } => {
                writer.write_fragment(handler_id, request_id, &location, &value).await
            }
            WireEvent::Complete {
                compensating_operation,
            } => {
                writer
                    .write_complete(handler_id, request_id, compensating_operation.as_ref())
                    .await
            }
            WireEvent::Failed {
                description,
                rolled_back,
            } => writer.write_failed(handler_id, request_id, &description, rolled_back).await,
            WireEvent::Cancelled => writer.write_cancellation(handler_id, request_id).await,
        };
        if let Err(err) = write_result {
            warn!(error = %err, "failed writing wire response frame");
            return;
        }
        if terminal {
            return;
        }
    }
}

/// Per-connection (really per-listener) server state: the model controller every
/// request is dispatched against, the request-ID counter, the live
/// `requestId -> cancellation handle` map (pruned on terminal, §4.5), and the
/// registered host controllers (§6, `REGISTER_HOST_CONTROLLER`).
pub struct WireServer {
    controller: ModelController,
    next_request_id: AtomicU32,
    cancellations: Mutex<HashMap<u32, CancellationHandle>>,
    hosts: Mutex<HashMap<String, Value>>,
}

impl WireServer {
    #[must_use]
    pub fn new(controller: ModelController) -> Arc<Self> {
        Arc::new(Self {
            controller,
            next_request_id: AtomicU32::new(1),
            cancellations: Mutex::new(HashMap::new()),
            hosts: Mutex::new(HashMap::new()),
        })
    }

    fn allocate_request_id(&self) -> u32 {
        self.next_request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Snapshot of host IDs currently registered, for diagnostics and tests.
    #[must_use]
    pub fn registered_hosts(&self) -> Vec<String> {
        self.hosts.lock().keys().cloned().collect()
    }

    /// Drives one connection until the peer disconnects or a framing error occurs.
    /// Each request frame is dispatched on its own task so multiple operations can be
    /// in flight on one connection at once; all of their responses are serialized
    /// through the same [`StreamWriter`].
    pub async fn serve_connection<S>(self: Arc<Self>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut read_half, write_half) = tokio::io::split(stream);
        let writer = StreamWriter::new(write_half);

        loop {
            let (handler_id, request) = match read_request(&mut read_half).await {
                Ok(parsed) => parsed,
                Err(ProtocolError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("peer closed wire connection");
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "malformed wire frame, closing connection");
                    return;
                }
            };
            let server = Arc::clone(&self);
            let writer = Arc::clone(&writer);
            tokio::spawn(async move {
                server.handle_request(handler_id, request, writer).await;
            });
        }
    }

    #[instrument(skip(self, request, writer), fields(handler_id))]
    async fn handle_request<W>(&self, handler_id: u8, request: Request, writer: Arc<StreamWriter<W>>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        match request {
            Request::Execute { operation, asynchronous } => {
                self.handle_execute(handler_id, operation, asynchronous, writer).await;
            }
            Request::Cancel { request_id } => {
                let handle = self.cancellations.lock().get(&request_id).cloned();
                let delivered = handle.is_some();
                if let Some(handle) = handle {
                    handle.cancel();
                }
                if let Err(err) = writer.write_cancel_result(handler_id, request_id, delivered).await {
                    warn!(error = %err, "failed to ack cancellation");
                }
                debug!(request_id, delivered, "processed cancellation request");
            }
            Request::RegisterHost { host_id, model } => {
                self.hosts.lock().insert(host_id.clone(), model);
                debug!(host_id = %host_id, "host controller registered");
                let snapshot = self.controller.tree().snapshot();
                if let Err(err) = writer.write_model(handler_id, &snapshot).await {
                    warn!(error = %err, "failed to ack host registration");
                }
            }
            Request::UnregisterHost { host_id } => {
                let applied = self.hosts.lock().remove(&host_id).is_some();
                debug!(host_id = %host_id, applied, "host controller unregistered");
                if let Err(err) = writer.write_host_ack(handler_id, &host_id, applied).await {
                    warn!(error = %err, "failed to ack host unregistration");
                }
            }
        }
    }

    async fn handle_execute<W>(
        &self,
        handler_id: u8,
        operation: Value,
        asynchronous: bool,
        writer: Arc<StreamWriter<W>>,
    ) where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let request_id = self.allocate_request_id();
        let cancellation = CancellationHandle::new();
        self.cancellations.lock().insert(request_id, cancellation.clone());

        let (tx, rx) = flume::unbounded();
        let sink = ChannelResultSink { tx };

        if asynchronous {
            if let Err(err) = writer.write_request_id(handler_id, request_id).await {
                warn!(error = %err, "failed to hand out request id, abandoning dispatch");
                self.cancellations.lock().remove(&request_id);
                return;
            }
            tokio::spawn(drive_responses(Arc::clone(&writer), handler_id, request_id, rx));
            self.controller.dispatch(operation, &sink, cancellation).await;
        } else {
            let drain = tokio::spawn(drive_responses(Arc::clone(&writer), handler_id, request_id, rx));
            self.controller.dispatch(operation, &sink, cancellation).await;
            let _ = drain.await;
        }

        self.cancellations.lock().remove(&request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::PathAddress;
    use crate::handler::ReadResourceHandler;
    use crate::model::ModelTree;
    use crate::persistence::InMemoryPersister;
    use crate::registry::Registry;
    use crate::wire::codec::write_value;
    use crate::wire::protocol::{PARAM_HANDLE_RESULT_COMPLETE, PARAM_OPERATION, PARAM_REQUEST_ID};
    use std::sync::Arc as StdArc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn make_controller() -> ModelController {
        let registry = Registry::new();
        registry
            .register_sub_model(&PathAddress::root())
            .unwrap()
            .register_operation_handler("read-resource", StdArc::new(ReadResourceHandler), true, "/")
            .unwrap();
        ModelController::new(registry, ModelTree::new(), StdArc::new(InMemoryPersister::new()))
    }

    #[tokio::test]
    async fn synchronous_read_resource_round_trips() {
        let server = WireServer::new(make_controller());
        let (client, server_side) = tokio::io::duplex(8192);
        tokio::spawn(server.serve_connection(server_side));

        let (mut client_read, mut client_write) = tokio::io::split(client);

        let mut operation = Value::object();
        operation.as_object_mut().unwrap().set("operation", Value::from("read-resource"));

        client_write.write_u8(7).await.unwrap(); // handler id
        client_write.write_u8(REQUEST_OPERATION).await.unwrap();
        client_write.write_u8(EXECUTE_SYNCHRONOUS).await.unwrap();
        client_write.write_u8(PARAM_OPERATION).await.unwrap();
        write_value(&mut client_write, &operation).await.unwrap();
        client_write.flush().await.unwrap();

        let handler_id = client_read.read_u8().await.unwrap();
        assert_eq!(handler_id, 7);
        let tag = client_read.read_u8().await.unwrap();
        assert_eq!(tag, PARAM_HANDLE_RESULT_COMPLETE);
        let _request_id = client_read.read_u32().await.unwrap();
        let compensating = crate::wire::codec::read_value(&mut client_read).await.unwrap();
        assert_eq!(compensating, Value::Undefined);
    }

    #[tokio::test]
    async fn cancel_of_unknown_request_id_reports_not_delivered() {
        let server = WireServer::new(make_controller());
        let (client, server_side) = tokio::io::duplex(4096);
        tokio::spawn(server.serve_connection(server_side));

        let (mut client_read, mut client_write) = tokio::io::split(client);

        client_write.write_u8(1).await.unwrap();
        client_write.write_u8(REQUEST_OPERATION).await.unwrap();
        client_write.write_u8(CANCEL_ASYNCHRONOUS_OPERATION).await.unwrap();
        client_write.write_u8(PARAM_REQUEST_ID).await.unwrap();
        client_write.write_u32(999).await.unwrap();
        client_write.flush().await.unwrap();

        let handler_id = client_read.read_u8().await.unwrap();
        assert_eq!(handler_id, 1);
        let tag = client_read.read_u8().await.unwrap();
        assert_eq!(tag, crate::wire::protocol::PARAM_CANCELLATION_RESULT);
        let request_id = client_read.read_u32().await.unwrap();
        assert_eq!(request_id, 999);
        let delivered = client_read.read_u8().await.unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn register_host_controller_returns_model_snapshot() {
        use crate::wire::protocol::{PARAM_HOST_ID, PARAM_MODEL, REGISTER_HOST_CONTROLLER};

        let server = WireServer::new(make_controller());
        let (client, server_side) = tokio::io::duplex(4096);
        tokio::spawn(server.serve_connection(server_side));

        let (mut client_read, mut client_write) = tokio::io::split(client);

        client_write.write_u8(2).await.unwrap();
        client_write.write_u8(REQUEST_OPERATION).await.unwrap();
        client_write.write_u8(REGISTER_HOST_CONTROLLER).await.unwrap();
        client_write.write_u8(PARAM_HOST_ID).await.unwrap();
        crate::wire::codec::write_cstring(&mut client_write, "host-a").await.unwrap();
        client_write.write_u8(PARAM_MODEL).await.unwrap();
        write_value(&mut client_write, &Value::object()).await.unwrap();
        client_write.flush().await.unwrap();

        let handler_id = client_read.read_u8().await.unwrap();
        assert_eq!(handler_id, 2);
        let tag = client_read.read_u8().await.unwrap();
        assert_eq!(tag, PARAM_MODEL);
        let model = crate::wire::codec::read_value(&mut client_read).await.unwrap();
        assert_eq!(model, Value::object());
    }
}
