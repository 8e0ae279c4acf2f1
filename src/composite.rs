//! Multi-step (composite) operation engine (§4.4).
//!
//! A composite operation `{operation:"composite", address:[], steps:[op,…],
//! rollback-on-runtime-failure:bool=true}` executes its steps against a private working
//! model cloned from the live tree. Steps run in order; once a step fails, every
//! subsequent step is recorded `cancelled` rather than executed. If every step succeeds the
//! working model is merged back into the live tree and persisted; if any step fails and
//! `rollback-on-runtime-failure` is true (the default) the working model is discarded.
//!
//! Nested composites recurse through the same private [`crate::controller::ModelController`]
//! built for this invocation, so a step whose own `operation == "composite"` gets its own
//! working model cloned from *this* composite's working model, not the live tree — exactly
//! the guarantee a `ModelProvider` abstraction would give in a language with one.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::controller::{CollectingSink, Envelope, ModelController};
use crate::handler::{CancellationHandle, ResultSink};
use crate::model::ModelTree;
use crate::persistence::{ConfigurationPersister, PersisterError};
use crate::value::Value;

/// Records that a store happened without ever performing real I/O — the "private
/// ConfigurationPersister that records dirty rather than persisting" of §4.4 step 1.
struct DirtyFlagPersister {
    dirty: AtomicBool,
}

impl DirtyFlagPersister {
    fn new() -> Self {
        Self {
            dirty: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ConfigurationPersister for DirtyFlagPersister {
    async fn store(&self, _snapshot: Value) -> Result<(), PersisterError> {
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Vec<Value>, PersisterError> {
        Ok(Vec::new())
    }
}

struct StepRecord {
    outcome: &'static str,
    result: Value,
    compensating_operation: Option<Value>,
    failure_description: Option<String>,
    rolled_back: bool,
}

/// Entry point called by [`crate::controller::ModelController::dispatch`] when an operation
/// is `{operation:"composite", address:[]}`.
#[instrument(skip(controller, operation, sink, cancellation))]
pub async fn execute_composite(
    controller: &ModelController,
    operation: Value,
    sink: &dyn ResultSink,
    cancellation: CancellationHandle,
) {
    let Some(steps) = operation.get("steps").as_list().map(<[Value]>::to_vec) else {
        sink.failed("composite operation is missing a \"steps\" list".to_string(), false);
        return;
    };
    let rollback_on_failure = operation
        .get("rollback-on-runtime-failure")
        .as_bool()
        .unwrap_or(true);

    let working_tree = ModelTree::from_value(controller.tree().snapshot());
    let dirty_persister: Arc<dyn ConfigurationPersister> = Arc::new(DirtyFlagPersister::new());
    let working_controller =
        ModelController::new(controller.registry().clone(), working_tree.clone(), dirty_persister);

    let mut records = Vec::with_capacity(steps.len());
    let mut first_failure: Option<usize> = None;

    for (index, step) in steps.into_iter().enumerate() {
        if cancellation.is_cancelled() {
            sink.cancelled();
            return;
        }
        if let Some(failed_at) = first_failure {
            debug!(step = index, failed_at, "step skipped: prior step failed");
            records.push(StepRecord {
                outcome: "cancelled",
                result: Value::Undefined,
                compensating_operation: None,
                failure_description: None,
                rolled_back: false,
            });
            continue;
        }

        let step_sink = CollectingSink::new();
        working_controller
            .dispatch(step, &step_sink, cancellation.clone())
            .await;
        let envelope = step_sink.into_envelope();

        match envelope {
            Envelope::Complete {
                result,
                compensating_operation,
            } => {
                debug!(step = index, outcome = "success", "composite step recorded");
                records.push(StepRecord {
                    outcome: "success",
                    result,
                    compensating_operation,
                    failure_description: None,
                    rolled_back: false,
                });
            }
            Envelope::Failed { result, description, .. } => {
                debug!(step = index, outcome = "failed", "composite step recorded");
                first_failure = Some(index);
                records.push(StepRecord {
                    outcome: "failed",
                    result,
                    compensating_operation: None,
                    failure_description: Some(description),
                    rolled_back: false,
                });
            }
            Envelope::Cancelled => {
                sink.cancelled();
                return;
            }
        }
    }

    let any_failed = first_failure.is_some();
    info!(step_count = records.len(), any_failed, "composite finished");

    if any_failed && rollback_on_failure {
        handle_failures(sink, &mut records);
        return;
    }

    // Either every step succeeded, or some failed but the caller asked us to keep the
    // partial progress (`rollback-on-runtime-failure=false`): merge regardless.
    controller.tree().replace(working_tree.snapshot());
    if let Err(err) = controller.persist().await {
        tracing::warn!(error = %err, "best-effort persistence failed after composite merge");
    }

    let mut result = Value::object();
    {
        let obj = result.as_object_mut().expect("just constructed");
        for (i, record) in records.iter().enumerate() {
            obj.set(format!("step-{}", i + 1), step_to_value(record));
        }
    }

    let overall_compensating = build_overall_rollback(&records);

    if any_failed {
        let description = failure_summary(&records);
        sink.fragment(&[], result);
        sink.failed(description, false);
    } else {
        sink.fragment(&[], result);
        sink.complete(Some(overall_compensating));
    }
}

fn handle_failures(sink: &dyn ResultSink, records: &mut [StepRecord]) {
    for record in records.iter_mut() {
        if record.outcome != "cancelled" {
            record.rolled_back = true;
        }
    }
    let mut result = Value::object();
    {
        let obj = result.as_object_mut().expect("just constructed");
        for (i, record) in records.iter().enumerate() {
            obj.set(format!("step-{}", i + 1), step_to_value(record));
        }
    }
    sink.fragment(&[], result);
    let description = failure_summary(records);
    sink.failed(description, true);
}

fn failure_summary(records: &[StepRecord]) -> String {
    let failures: Vec<String> = records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            r.failure_description
                .as_ref()
                .map(|desc| format!("step-{}: {desc}", i + 1))
        })
        .collect();
    format!("composite failed: {}", failures.join("; "))
}

fn step_to_value(record: &StepRecord) -> Value {
    let mut obj = Value::object();
    let fields = obj.as_object_mut().expect("just constructed");
    fields.set("outcome", Value::from(record.outcome));
    fields.set("result", record.result.clone());
    if let Some(desc) = &record.failure_description {
        fields.set("failure-description", Value::from(desc.as_str()));
    }
    fields.set(
        "compensating-operation",
        record
            .compensating_operation
            .clone()
            .unwrap_or(Value::Undefined),
    );
    fields.set("rolled-back", Value::Bool(record.rolled_back));
    obj
}

/// The overall compensating operation: a composite of per-step compensating operations in
/// reverse order, with `rollback-on-runtime-failure=false` (§4.4 step 4).
fn build_overall_rollback(records: &[StepRecord]) -> Value {
    let steps: Vec<Value> = records
        .iter()
        .rev()
        .filter_map(|r| r.compensating_operation.clone())
        .collect();
    let mut op = Value::object();
    let obj = op.as_object_mut().expect("just constructed");
    obj.set("operation", Value::from("composite"));
    obj.set("address", Value::List(Vec::new()));
    obj.set("steps", Value::List(steps));
    obj.set("rollback-on-runtime-failure", Value::Bool(false));
    op
}
