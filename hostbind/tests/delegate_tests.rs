//! Tests for delegate synthesis over script callees.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use common::Fixture;
use hostbind::binder::CallContext;
use hostbind::delegate::{DelegateFactory, SerialGate};
use hostbind::{
    ByRefArg, DelegateParam, DelegateShape, DispatchError, HostError, HostType, ScriptFunction,
    TypeKind, Value,
};
use pretty_assertions::assert_eq;

fn delegate_type(name: &str) -> HostType {
    HostType::builder(name, TypeKind::Delegate).build()
}

fn out_int_shape() -> DelegateShape {
    DelegateShape::new(vec![DelegateParam::out(&HostType::int32())], &HostType::void())
}

/// Writes 42 to its first argument, then raises.
fn write_then_throw() -> Value {
    Value::Function(ScriptFunction::new(|args: &[Value]| {
        if let Some(slot) = args[0].as_by_ref() {
            slot.set_value(Value::I32(42));
        }
        Err(HostError::exception("InvalidOperationException", "callee failed"))
    }))
}

#[test]
fn test_out_value_survives_callee_error() {
    let factory = DelegateFactory::default();
    let d = factory
        .create(&delegate_type("OutAction"), out_int_shape(), &write_then_throw())
        .unwrap();

    let mut args = [Value::I32(0)];
    let result = d.invoke(&mut args);
    assert_eq!(
        result,
        Err(DispatchError::Invocation(HostError::exception(
            "InvalidOperationException",
            "callee failed"
        )))
    );
    assert_eq!(args[0], Value::I32(42));
}

#[test]
fn test_out_value_reaches_caller_slot() {
    let factory = DelegateFactory::default();
    let d = factory
        .create(&delegate_type("OutAction"), out_int_shape(), &write_then_throw())
        .unwrap();

    let storage = ByRefArg::out(&HostType::int32());
    assert!(d.invoke_dynamic(&[Value::ByRef(storage.clone())]).is_err());
    assert_eq!(storage.value(), Value::I32(42));
}

#[test]
fn test_out_slot_starts_at_default() {
    let factory = DelegateFactory::default();
    let seen = Arc::new(std::sync::Mutex::new(None));
    let record = seen.clone();
    let callee = Value::Function(ScriptFunction::new(move |args: &[Value]| {
        *record.lock().unwrap() = args[0].as_by_ref().map(ByRefArg::value);
        Ok(Value::Null)
    }));
    let d = factory
        .create(&delegate_type("OutAction"), out_int_shape(), &callee)
        .unwrap();

    let mut args = [Value::I32(123)];
    d.invoke(&mut args).unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(Value::I32(0)));
    assert_eq!(args[0], Value::I32(0));
}

#[test]
fn test_delegate_of_other_type_is_rebound() {
    let factory = DelegateFactory::default();
    let shape = DelegateShape::new(vec![DelegateParam::out(&HostType::int32())], &HostType::boolean());
    let callee = Value::Function(ScriptFunction::new(|args: &[Value]| {
        if let Some(slot) = args[0].as_by_ref() {
            slot.set_value(Value::I32(7));
        }
        Ok(Value::Bool(true))
    }));

    let inner = factory
        .create(&delegate_type("TryGet"), shape.clone(), &callee)
        .unwrap();
    let outer = factory
        .create(&delegate_type("Probe"), shape, &Value::Delegate(inner.clone()))
        .unwrap();
    assert!(!outer.ptr_eq(&inner));
    assert_eq!(outer.delegate_type().name(), "Probe");

    let mut args = [Value::I32(0)];
    assert_eq!(outer.invoke(&mut args), Ok(Value::Bool(true)));
    assert_eq!(args[0], Value::I32(7));
}

#[test]
fn test_rebound_delegate_propagates_error_unchanged() {
    let factory = DelegateFactory::default();
    let inner = factory
        .create(&delegate_type("OutAction"), out_int_shape(), &write_then_throw())
        .unwrap();
    let outer = factory
        .create(&delegate_type("OtherAction"), out_int_shape(), &Value::Delegate(inner))
        .unwrap();

    let mut args = [Value::I32(0)];
    assert_eq!(
        outer.invoke(&mut args),
        Err(DispatchError::Invocation(HostError::exception(
            "InvalidOperationException",
            "callee failed"
        )))
    );
    assert_eq!(args[0], Value::I32(42));
}

#[test]
fn test_arity_limit_is_unsupported_shape() {
    let factory = DelegateFactory::default();
    let params = (0..17).map(|_| DelegateParam::value(&HostType::int32())).collect();
    let shape = DelegateShape::new(params, &HostType::void());
    let callee = Value::Function(ScriptFunction::new(|_: &[Value]| Ok(Value::Null)));

    let err = factory
        .create(&delegate_type("Wide"), shape, &callee)
        .unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"UnsupportedShape: 17 parameters exceed the maximum delegate arity of 16"
    );
}

#[test]
fn test_gate_serializes_callers() {
    let factory = DelegateFactory::new(Arc::new(SerialGate::new()));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (a, p) = (active.clone(), peak.clone());
    let callee = Value::Function(ScriptFunction::new(move |_: &[Value]| {
        let now = a.fetch_add(1, Ordering::SeqCst) + 1;
        p.fetch_max(now, Ordering::SeqCst);
        thread::yield_now();
        a.fetch_sub(1, Ordering::SeqCst);
        Ok(Value::Null)
    }));
    let d = factory
        .create(&delegate_type("Tick"), DelegateShape::new(Vec::new(), &HostType::void()), &callee)
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let d = d.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    d.invoke(&mut []).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dispatcher_invokes_callable_values() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher();
    let ctx = CallContext::new();

    let double = Value::Function(ScriptFunction::new(|args: &[Value]| {
        Ok(Value::I32(args[0].as_i32().unwrap_or(0) * 2))
    }));
    assert_eq!(dispatcher.invoke_value(&ctx, &double, &[Value::I32(4)]), Ok(Value::I32(8)));

    let shape = DelegateShape::new(vec![DelegateParam::value(&HostType::int32())], &HostType::int64());
    let d = dispatcher
        .create_delegate(&delegate_type("Doubler"), shape, &double)
        .unwrap();
    assert_eq!(
        dispatcher.invoke_value(&ctx, &Value::Delegate(d), &[Value::I32(4)]),
        Ok(Value::I64(8))
    );
}
