//! Frame constants and the per-stream response writer (§4.5, §6 wire protocol).
//!
//! Every frame opens with a one-byte `handler-id` (which logical channel on the
//! connection a frame belongs to; a single TCP connection multiplexes the management
//! channel and, for host controllers, a separate registration channel), a one-byte
//! `REQUEST_OPERATION` marker distinguishing operation frames from any other frame type
//! a future revision might add, and a one-byte request code. Everything after that is
//! code-specific.

use std::io;
use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;

use crate::wire::codec::{write_cstring, write_value};
use crate::value::Value;

/// Marks a frame as carrying an operation request, as opposed to any other frame kind.
pub const REQUEST_OPERATION: u8 = 0x00;

/// Run `operation` to completion, blocking this request's reply on the terminal outcome.
pub const EXECUTE_SYNCHRONOUS: u8 = 0x01;
/// Run `operation` as a background task; the reply streams fragments as they arrive.
pub const EXECUTE_ASYNCHRONOUS: u8 = 0x02;
/// Cancel a previously issued asynchronous operation by request ID.
pub const CANCEL_ASYNCHRONOUS_OPERATION: u8 = 0x03;
/// A host controller announces itself to the domain controller.
pub const REGISTER_HOST_CONTROLLER: u8 = 0x04;
/// A host controller is detaching cleanly.
pub const UNREGISTER_HOST_CONTROLLER: u8 = 0x05;

/// Tags identifying the shape of the body that follows within a request or response.
pub const PARAM_OPERATION: u8 = 0x10;
pub const PARAM_REQUEST_ID: u8 = 0x11;
pub const PARAM_HANDLE_RESULT_FRAGMENT: u8 = 0x12;
pub const PARAM_LOCATION: u8 = 0x13;
pub const PARAM_HANDLE_RESULT_COMPLETE: u8 = 0x14;
pub const PARAM_HANDLE_RESULT_FAILED: u8 = 0x15;
pub const PARAM_HANDLE_CANCELLATION: u8 = 0x16;
pub const PARAM_HOST_ID: u8 = 0x17;
pub const PARAM_MODEL: u8 = 0x18;
pub const PARAM_CANCELLATION_RESULT: u8 = 0x19;

#[derive(Debug, Error, Diagnostic)]
pub enum ProtocolError {
    #[error("unexpected frame marker {found:#04x}, expected REQUEST_OPERATION")]
    #[diagnostic(code(domainctl::wire::bad_marker))]
    BadMarker { found: u8 },

    #[error("unrecognized request code {0:#04x}")]
    #[diagnostic(code(domainctl::wire::unknown_request_code))]
    UnknownRequestCode(u8),

    #[error(transparent)]
    #[diagnostic(code(domainctl::wire::io))]
    Io(#[from] io::Error),
}

/// Serializes concurrent writers to a single connection: every response frame (a
/// fragment, a terminal outcome, a registration ack) is written while holding the
/// lock, so two in-flight asynchronous operations on the same connection never
/// interleave their bytes (§5 "concurrent writes to a single stream are serialized by
/// a per-stream mutex").
pub struct StreamWriter<W> {
    inner: AsyncMutex<W>,
}

impl<W> StreamWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Arc<Self> {
        Arc::new(Self {
            inner: AsyncMutex::new(writer),
        })
    }

    pub async fn write_fragment(
        &self,
        handler_id: u8,
        request_id: u32,
        location: &[String],
        value: &Value,
    ) -> io::Result<()> {
        let mut w = self.inner.lock().await;
        w.write_u8(handler_id).await?;
        w.write_u8(PARAM_HANDLE_RESULT_FRAGMENT).await?;
        w.write_u32(request_id).await?;
        w.write_u8(PARAM_LOCATION).await?;
        w.write_u32(u32::try_from(location.len()).unwrap_or(u32::MAX)).await?;
        for segment in location {
            write_cstring(&mut *w, segment).await?;
        }
        write_value(&mut *w, value).await?;
        w.flush().await
    }

    pub async fn write_complete(
        &self,
        handler_id: u8,
        request_id: u32,
        compensating_operation: Option<&Value>,
    ) -> io::Result<()> {
        let mut w = self.inner.lock().await;
        w.write_u8(handler_id).await?;
        w.write_u8(PARAM_HANDLE_RESULT_COMPLETE).await?;
        w.write_u32(request_id).await?;
        write_value(&mut *w, compensating_operation.unwrap_or(&Value::Undefined)).await?;
        w.flush().await
    }

    pub async fn write_failed(
        &self,
        handler_id: u8,
        request_id: u32,
        description: &str,
        rolled_back: bool,
    ) -> io::Result<()> {
        let mut w = self.inner.lock().await;
        w.write_u8(handler_id).await?;
        w.write_u8(PARAM_HANDLE_RESULT_FAILED).await?;
        w.write_u32(request_id).await?;
        write_cstring(&mut *w, description).await?;
        w.write_u8(u8::from(rolled_back)).await?;
        w.flush().await
    }

    pub async fn write_cancellation(&self, handler_id: u8, request_id: u32) -> io::Result<()> {
        let mut w = self.inner.lock().await;
        w.write_u8(handler_id).await?;
        w.write_u8(PARAM_HANDLE_CANCELLATION).await?;
        w.write_u32(request_id).await?;
        w.flush().await
    }

    /// Response to `CANCEL_ASYNCHRONOUS_OPERATION`: `delivered` reports whether
    /// the cancellation actually reached an in-flight operation before it went
    /// terminal (§4.5), not just whether the request ID was recognized.
    pub async fn write_cancel_result(&self, handler_id: u8, request_id: u32, delivered: bool) -> io::Result<()> {
        let mut w = self.inner.lock().await;
        w.write_u8(handler_id).await?;
        w.write_u8(PARAM_CANCELLATION_RESULT).await?;
        w.write_u32(request_id).await?;
        w.write_u8(u8::from(delivered)).await?;
        w.flush().await
    }

    /// Response to `REGISTER_HOST_CONTROLLER`: the domain controller's root
    /// model snapshot, handed back so the host can seed its own view (§4.5).
    pub async fn write_model(&self, handler_id: u8, model: &Value) -> io::Result<()> {
        let mut w = self.inner.lock().await;
        w.write_u8(handler_id).await?;
        w.write_u8(PARAM_MODEL).await?;
        write_value(&mut *w, model).await?;
        w.flush().await
    }

    /// Ack for `REGISTER_HOST_CONTROLLER`/`UNREGISTER_HOST_CONTROLLER`, echoing
    /// the host ID and whether the registry was actually changed.
    pub async fn write_host_ack(&self, handler_id: u8, host_id: &str, applied: bool) -> io::Result<()> {
        let mut w = self.inner.lock().await;
        w.write_u8(handler_id).await?;
        w.write_u8(PARAM_HOST_ID).await?;
        write_cstring(&mut *w, host_id).await?;
        w.write_u8(u8::from(applied)).await?;
        w.flush().await
    }

    /// First frame of an `EXECUTE_ASYNCHRONOUS` reply: hands the client the request ID
    /// it needs to later send `CANCEL_ASYNCHRONOUS_OPERATION`.
    pub async fn write_request_id(&self, handler_id: u8, request_id: u32) -> io::Result<()> {
        let mut w = self.inner.lock().await;
        w.write_u8(handler_id).await?;
        w.write_u8(PARAM_REQUEST_ID).await?;
        w.write_u32(request_id).await?;
        w.flush().await
    }
}
