use crate::value::Value;

/// Terminal signal emitted by a [`ResultSink`]; exactly one of these must be
/// produced per in-flight operation (§4.3 sink contract, invariant 1).
#[derive(Clone, Debug)]
pub enum Terminal {
    Complete { compensating_op: Option<Value> },
    Failed { description: String, rolled_back: bool },
    Cancelled,
}

/// Callback object handed to a handler. Receives zero or more fragments
/// `(location, value)` in submission order, then exactly one terminal
/// signal.
///
/// Multiple terminal calls are a programmer error (§4.3); implementations
/// are not required to detect it, but the in-process implementation used by
/// the controller (see [`crate::controller`]) does, surfacing a second
/// terminal call as a `handler-threw`-classed failure of the enclosing
/// step.
pub trait ResultSink: Send + Sync {
    fn fragment(&self, location: &[String], value: Value);
    fn complete(&self, compensating_op: Option<Value>);
    /// `rolled_back` is only meaningful for composite operations (§3 Result Envelope); a
    /// single handler's failure always passes `false`.
    fn failed(&self, description: String, rolled_back: bool);
    fn cancelled(&self);
}
