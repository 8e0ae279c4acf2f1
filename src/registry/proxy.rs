use async_trait::async_trait;

use crate::handler::{OperationResult, ResultSink};
use crate::value::Value;

/// Stand-in registered at an address that forwards all operations under
/// that address to a remote controller (§4.1 step 2, §4.2 "proxy
/// absorption").
///
/// `operation` arrives already rebased: its `address` field has had the
/// proxy's anchor stripped, so the remote side sees addresses relative to
/// its own root (scenario 5, §8).
#[async_trait]
pub trait ProxyController: Send + Sync {
    async fn forward(&self, operation: Value, sink: &dyn ResultSink) -> OperationResult;
}
