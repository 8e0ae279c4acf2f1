//! Transports the frame layer can run over: a real TCP listener for production, and an
//! in-process duplex pair that exercises the identical codec and dispatcher without a
//! socket (used by tests and by in-process tooling that would rather not pay for a
//! loopback connection).

use std::io;
use std::sync::Arc;

use tokio::io::DuplexStream;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::wire::dispatcher::WireServer;

/// Default buffer size for [`in_process_pair`]'s duplex streams; generous enough to
/// hold a handful of fragments without the writer stalling on backpressure in tests.
const DEFAULT_DUPLEX_BUFFER: usize = 64 * 1024;

/// Binds `addr` and serves the wire protocol to every accepted connection until the
/// listener itself errors out (the process is shutting down, the port was revoked,
/// etc). Each connection is handled on its own task; a single slow or malicious peer
/// never blocks another.
pub async fn serve_tcp(addr: &str, server: Arc<WireServer>) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "wire protocol listening");
    loop {
        let (socket, peer) = listener.accept().await?;
        debug!(%peer, "accepted wire connection");
        if let Err(err) = socket.set_nodelay(true) {
            warn!(%peer, error = %err, "failed to set TCP_NODELAY");
        }
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            server.serve_connection(socket).await;
        });
    }
}

/// Creates an in-process client/server duplex pair and immediately spawns the server
/// half against `server`, returning the client half for the caller to drive with the
/// same frame-writing calls it would use against a real socket.
#[must_use]
pub fn in_process_pair(server: Arc<WireServer>) -> DuplexStream {
    let (client, server_side) = tokio::io::duplex(DEFAULT_DUPLEX_BUFFER);
    tokio::spawn(async move {
        server.serve_connection(server_side).await;
    });
    client
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::PathAddress;
    use crate::controller::ModelController;
    use crate::handler::ReadResourceHandler;
    use crate::model::ModelTree;
    use crate::persistence::InMemoryPersister;
    use crate::registry::Registry;
    use crate::value::Value;
    use crate::wire::codec::{read_value, write_value};
    use crate::wire::protocol::{EXECUTE_SYNCHRONOUS, PARAM_HANDLE_RESULT_COMPLETE, PARAM_OPERATION, REQUEST_OPERATION};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn in_process_pair_exercises_the_same_codec_as_a_socket() {
        let registry = Registry::new();
        registry
            .register_sub_model(&PathAddress::root())
            .unwrap()
            .register_operation_handler("read-resource", Arc::new(ReadResourceHandler), true, "/")
            .unwrap();
        let controller = ModelController::new(registry, ModelTree::new(), Arc::new(InMemoryPersister::new()));
        let server = WireServer::new(controller);

        let client = in_process_pair(server);
        let (mut read_half, mut write_half) = tokio::io::split(client);

        let mut operation = Value::object();
        operation.as_object_mut().unwrap().set("operation", Value::from("read-resource"));

        write_half.write_u8(0).await.unwrap();
        write_half.write_u8(REQUEST_OPERATION).await.unwrap();
        write_half.write_u8(EXECUTE_SYNCHRONOUS).await.unwrap();
        write_half.write_u8(PARAM_OPERATION).await.unwrap();
        write_value(&mut write_half, &operation).await.unwrap();
        write_half.flush().await.unwrap();

        let _handler_id = read_half.read_u8().await.unwrap();
        let tag = read_half.read_u8().await.unwrap();
        assert_eq!(tag, PARAM_HANDLE_RESULT_COMPLETE);
        let _request_id = read_half.read_u32().await.unwrap();
        let _compensating = read_value(&mut read_half).await.unwrap();
    }
}
