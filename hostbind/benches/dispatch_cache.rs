use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use hostbind::binder::{
    CallContext, MemberHandle, OverloadResolver, ResolveError, ResolveRequest, ResolveResult,
};
use hostbind::{BindSignature, Dispatcher, HostObject, HostTarget, HostType, InvokeFlags, TypeKind, Value};

struct SingleMember(MemberHandle);

impl OverloadResolver for SingleMember {
    fn resolve(&self, request: &ResolveRequest<'_>) -> ResolveResult {
        if *request.scope.name == *self.0.name() {
            ResolveResult::Member(self.0.clone())
        } else {
            ResolveResult::Error(ResolveError::NotFound)
        }
    }
}

fn setup() -> (Dispatcher, HostTarget) {
    let counter = HostType::builder("Counter", TypeKind::Class).build();
    let add = MemberHandle::new("Add", &counter, false, |_, args| {
        Ok(Value::I32(args[0].as_i32().unwrap_or(0) + 1))
    });
    let dispatcher = Dispatcher::new(Arc::new(SingleMember(add)));
    let target = HostTarget::for_instance(Value::Object(HostObject::new(&counter, ())));
    (dispatcher, target)
}

fn bench_cached_dispatch(c: &mut Criterion) {
    let (dispatcher, target) = setup();
    let ctx = CallContext::new();
    let args = [Value::I32(41)];

    c.bench_function("dispatch_cache_hit", |b| {
        b.iter(|| {
            dispatcher.dispatch(
                &ctx,
                InvokeFlags::INVOKE_METHOD,
                black_box(&target),
                "Add",
                &[],
                black_box(&args),
            )
        })
    });

    c.bench_function("dispatch_cached_failure", |b| {
        b.iter(|| {
            dispatcher.dispatch(
                &ctx,
                InvokeFlags::INVOKE_METHOD,
                black_box(&target),
                "Missing",
                &[],
                black_box(&args),
            )
        })
    });
}

fn bench_signature(c: &mut Criterion) {
    let (_, target) = setup();
    let args = [Value::I32(1), Value::str("x"), Value::Null];

    c.bench_function("bind_signature_build", |b| {
        b.iter(|| {
            BindSignature::new(
                None,
                InvokeFlags::INVOKE_METHOD,
                black_box(&target),
                "Add",
                &[],
                black_box(&args),
            )
        })
    });
}

criterion_group!(benches, bench_cached_dispatch, bench_signature);
criterion_main!(benches);
