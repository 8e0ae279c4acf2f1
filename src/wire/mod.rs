//! Asynchronous binary wire protocol (§4.5): the framing every non-HTTP client speaks
//! to reach a [`crate::controller::ModelController`] — a real TCP socket in
//! production, a plain in-memory duplex in tests.
//!
//! ```text
//! handler-id (u8)  REQUEST_OPERATION (u8)  request-code (u8)  body…
//! ```
//!
//! `body` depends on `request-code`: `EXECUTE_SYNCHRONOUS`/`EXECUTE_ASYNCHRONOUS`
//! carry a `PARAM_OPERATION`-tagged [`crate::value::Value`];
//! `CANCEL_ASYNCHRONOUS_OPERATION` carries a `PARAM_REQUEST_ID`-tagged request ID;
//! `REGISTER_HOST_CONTROLLER`/`UNREGISTER_HOST_CONTROLLER` carry a host ID and (for
//! registration) the host's initial model snapshot.
//!
//! Responses stream back as a sequence of tagged frames: zero or more
//! `PARAM_HANDLE_RESULT_FRAGMENT`s, then exactly one of
//! `PARAM_HANDLE_RESULT_COMPLETE`/`PARAM_HANDLE_RESULT_FAILED`/
//! `PARAM_HANDLE_CANCELLATION`. An asynchronous dispatch additionally gets a
//! `PARAM_REQUEST_ID` frame up front so the caller has something to pass back to
//! `CANCEL_ASYNCHRONOUS_OPERATION`.

pub mod codec;
pub mod dispatcher;
pub mod protocol;
pub mod transport;

pub use dispatcher::WireServer;
pub use protocol::{ProtocolError, StreamWriter};
pub use transport::{in_process_pair, serve_tcp};
