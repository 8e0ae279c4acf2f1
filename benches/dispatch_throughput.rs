use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use domainctl::address::PathAddress;
use domainctl::controller::ModelController;
use domainctl::handler::ReadResourceHandler;
use domainctl::model::ModelTree;
use domainctl::persistence::InMemoryPersister;
use domainctl::registry::Registry;
use domainctl::value::Value;

const BATCH_SIZES: &[usize] = &[64, 256, 1024];

fn make_controller() -> ModelController {
    let registry = Registry::new();
    registry
        .register_sub_model(&PathAddress::root())
        .unwrap()
        .register_operation_handler("read-resource", Arc::new(ReadResourceHandler), true, "/")
        .unwrap();
    ModelController::new(registry, ModelTree::new(), Arc::new(InMemoryPersister::new()))
}

fn read_resource_op() -> Value {
    let mut op = Value::object();
    op.as_object_mut().unwrap().set("operation", Value::from("read-resource"));
    op
}

async fn dispatch_batch(controller: &ModelController, batch: usize) {
    for _ in 0..batch {
        let envelope = controller.execute(read_resource_op()).await;
        assert!(envelope.is_success());
    }
}

fn dispatch_throughput(c: &mut Criterion) {
    let runtime = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("controller_dispatch");

    for &batch in BATCH_SIZES {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &size| {
            b.to_async(&runtime).iter(|| async {
                let controller = make_controller();
                dispatch_batch(&controller, size).await;
            });
        });
    }

    group.finish();
}

criterion_group!(benches, dispatch_throughput);
criterion_main!(benches);
