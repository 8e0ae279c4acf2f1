use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use domainctl::address::{PathAddress, PathElement};
use domainctl::controller::{ModelController, set_address};
use domainctl::handler::{AddResourceHandler, ReadResourceHandler, RemoveResourceHandler};
use domainctl::model::ModelTree;
use domainctl::persistence::InMemoryPersister;
use domainctl::registry::Registry;
use domainctl::value::Value;

const STEP_COUNTS: &[usize] = &[2, 8, 32];

fn make_controller(subsystems: usize) -> (ModelController, Vec<PathAddress>) {
    let registry = Registry::new();
    let mut addresses = Vec::with_capacity(subsystems);
    for i in 0..subsystems {
        let addr = PathAddress::root().append(PathElement::new("subsystem", format!("s{i}")));
        let reg = registry.register_sub_model(&addr).unwrap();
        reg.register_operation_handler("add-resource", Arc::new(AddResourceHandler), false, "/")
            .unwrap();
        reg.register_operation_handler("remove-resource", Arc::new(RemoveResourceHandler), false, "/")
            .unwrap();
        reg.register_operation_handler("read-resource", Arc::new(ReadResourceHandler), false, "/")
            .unwrap();
        addresses.push(addr);
    }
    let controller = ModelController::new(registry, ModelTree::new(), Arc::new(InMemoryPersister::new()));
    (controller, addresses)
}

fn composite_op(addresses: &[PathAddress]) -> Value {
    let steps: Vec<Value> = addresses
        .iter()
        .map(|addr| {
            let mut step = Value::object();
            set_address(&mut step, addr);
            let obj = step.as_object_mut().unwrap();
            obj.set("operation", Value::from("add-resource"));
            obj.set("value", Value::Bool(true));
            step
        })
        .collect();
    let mut op = Value::object();
    let obj = op.as_object_mut().unwrap();
    obj.set("operation", Value::from("composite"));
    obj.set("address", Value::List(Vec::new()));
    obj.set("steps", Value::List(steps));
    op
}

fn composite_step(c: &mut Criterion) {
    let runtime = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("composite_execute");

    for &steps in STEP_COUNTS {
        group.throughput(Throughput::Elements(steps as u64));
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, &size| {
            b.to_async(&runtime).iter(|| async {
                let (controller, addresses) = make_controller(size);
                let envelope = controller.execute(composite_op(&addresses)).await;
                assert!(envelope.is_success());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, composite_step);
criterion_main!(benches);
