//! Shared helpers for integration tests
// Each test binary uses a different subset of the fixture.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hostbind::binder::{
    BinderArgument, InterfaceMap, InterfaceMapProvider, MemberHandle, OverloadResolver,
    ResolveError, ResolveRequest, ResolveResult,
};
use hostbind::signature::{ApparentType, ArgumentDescriptor};
use hostbind::{Dispatcher, HostError, HostObject, HostTarget, HostType, MethodInfo, TypeKind, Value};

// ==================== Overload table ====================

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub ty: HostType,
    pub by_ref: bool,
}

pub fn param(ty: &HostType) -> Param {
    Param {
        ty: ty.clone(),
        by_ref: false,
    }
}

pub fn by_ref(ty: &HostType) -> Param {
    Param {
        ty: ty.clone(),
        by_ref: true,
    }
}

#[derive(Debug, Clone)]
pub struct Overload {
    pub params: Vec<Param>,
    pub generic_arity: usize,
    pub is_public: bool,
    pub handle: MemberHandle,
}

impl Overload {
    pub fn new<F>(declaring: &HostType, name: &str, is_static: bool, params: Vec<Param>, invoker: F) -> Self
    where
        F: Fn(&HostTarget, &mut [Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        Overload {
            params,
            generic_arity: 0,
            is_public: true,
            handle: MemberHandle::new(name, declaring, is_static, invoker),
        }
    }

    pub fn generic(mut self, arity: usize) -> Self {
        self.generic_arity = arity;
        self
    }

    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }
}

/// Overload resolver over a fixed table that counts every resolution call.
#[derive(Debug)]
pub struct CountingResolver {
    overloads: Vec<Overload>,
    calls: AtomicUsize,
}

impl CountingResolver {
    pub fn new(overloads: Vec<Overload>) -> Self {
        CountingResolver {
            overloads,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn arg_matches(param: &Param, arg: &BinderArgument) -> bool {
    match &arg.descriptor {
        ArgumentDescriptor::OutRef(ty) | ArgumentDescriptor::InOutRef(ty) => {
            param.by_ref && param.ty == *ty
        }
        _ if param.by_ref => false,
        ArgumentDescriptor::Null => !param.ty.is_value_type(),
        ArgumentDescriptor::ZeroValue(ty) => {
            param.ty.is_assignable_from(ty)
                || (*ty == HostType::int32() && param.ty.kind() == TypeKind::Enum)
        }
        ArgumentDescriptor::ByValue(ApparentType::Host(ty)) => param.ty.is_assignable_from(ty),
        ArgumentDescriptor::ByValue(ApparentType::ImportedType) => {
            param.ty == HostType::type_handle() || param.ty == HostType::object()
        }
        ArgumentDescriptor::ByValue(_) => param.ty == HostType::object(),
    }
}

impl OverloadResolver for CountingResolver {
    fn resolve(&self, request: &ResolveRequest<'_>) -> ResolveResult {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let lookup = request.target.lookup_type();
        let applicable: Vec<&Overload> = self
            .overloads
            .iter()
            .filter(|o| o.handle.name() == &*request.scope.name)
            .filter(|o| o.handle.declaring_type().is_assignable_from(lookup))
            .filter(|o| o.generic_arity == request.type_args.len())
            .filter(|o| {
                o.params.len() == request.args.len()
                    && o.params.iter().zip(request.args).all(|(p, a)| arg_matches(p, a))
            })
            .collect();

        let visible: Vec<&&Overload> = applicable
            .iter()
            .filter(|o| o.is_public || request.scope.access.as_ref() == Some(o.handle.declaring_type()))
            .collect();

        match visible.as_slice() {
            [only] => ResolveResult::Member(only.handle.clone()),
            [] if !applicable.is_empty() => ResolveResult::Error(ResolveError::ExcludedByPolicy),
            [] => ResolveResult::Error(ResolveError::NotFound),
            _ => ResolveResult::Error(ResolveError::Ambiguous),
        }
    }
}

// ==================== Host fixture ====================

/// Payload of a `Calculator` instance.
#[derive(Debug)]
pub struct Calculator {
    pub offset: i32,
}

pub struct Fixture {
    pub calculator: HostType,
    pub parser: HostType,
    pub greeter_iface: HostType,
    pub greeter: HostType,
    pub calc_ext: HostType,
    pub mode: HostType,
    pub resolver: Arc<CountingResolver>,
}

impl Fixture {
    pub fn new() -> Self {
        let object = HostType::object();
        let int32 = HostType::int32();
        let string = HostType::string();

        let calculator = HostType::builder("Calculator", TypeKind::Class)
            .base(&object)
            .method(MethodInfo::instance("Add"))
            .method(MethodInfo::instance("Divide"))
            .method(MethodInfo::instance("Inspect"))
            .method(MethodInfo::static_method("Create"))
            .build();
        let parser = HostType::builder("Parser", TypeKind::Class)
            .base(&object)
            .method(MethodInfo::static_method("TryParse"))
            .method(MethodInfo::static_method("ParseStrict"))
            .build();
        let greeter_iface = HostType::builder("IGreeter", TypeKind::Interface)
            .method(MethodInfo::instance("Greet"))
            .build();
        let greeter = HostType::builder("Greeter", TypeKind::Class)
            .base(&object)
            .implements(&greeter_iface)
            .method(MethodInfo::instance("IGreeter.Greet").private())
            .build();
        let calc_ext = HostType::builder("CalculatorExtensions", TypeKind::Class)
            .base(&object)
            .method(MethodInfo::extension("Triple"))
            .build();
        let mode = HostType::builder("Mode", TypeKind::Enum).build();

        let overloads = vec![
            Overload::new(&calculator, "Add", false, vec![param(&int32)], |target, args| {
                let offset = calculator_offset(target);
                Ok(Value::I32(args[0].as_i32().unwrap_or(0) + offset))
            }),
            Overload::new(&calculator, "Add", false, vec![param(&string)], |_, args| {
                Ok(Value::Str(format!("{}!", args[0].as_str().unwrap_or("")).into()))
            }),
            Overload::new(
                &calculator,
                "Divide",
                false,
                vec![param(&int32), param(&int32)],
                |_, args| match (args[0].as_i32(), args[1].as_i32()) {
                    (Some(_), Some(0)) => Err(HostError::exception(
                        "DivideByZeroException",
                        "Attempted to divide by zero.",
                    )),
                    (Some(a), Some(b)) => Ok(Value::I32(a / b)),
                    _ => Err(HostError::type_error("Divide expects Int32 operands")),
                },
            ),
            {
                let ty = calculator.clone();
                Overload::new(&calculator, "Create", true, Vec::new(), move |_, _| {
                    Ok(Value::Object(HostObject::new(&ty, Calculator { offset: 0 })))
                })
            },
            Overload::new(&calculator, "Log", false, vec![param(&object)], |_, _| Ok(Value::Null)),
            Overload::new(&calculator, "Log", false, vec![param(&object)], |_, _| Ok(Value::Null)),
            Overload::new(&calculator, "Describe", false, vec![param(&object)], |_, _| {
                Ok(Value::str("generic"))
            })
            .generic(1),
            Overload::new(
                &calculator,
                "Inspect",
                false,
                vec![param(&HostType::type_handle())],
                |_, args| match args[0].as_type() {
                    Some(ty) => Ok(Value::str(ty.name())),
                    None => Err(HostError::type_error("Inspect expects a type")),
                },
            ),
            {
                let mode = mode.clone();
                Overload::new(&calculator, "CurrentMode", false, Vec::new(), move |_, _| {
                    Ok(Value::enumeration(&mode, 3))
                })
            },
            Overload::new(
                &parser,
                "TryParse",
                true,
                vec![param(&string), by_ref(&int32)],
                |_, args| match args[0].as_str().and_then(|s| s.parse::<i32>().ok()) {
                    Some(n) => {
                        args[1] = Value::I32(n);
                        Ok(Value::Bool(true))
                    }
                    None => {
                        args[1] = Value::I32(0);
                        Ok(Value::Bool(false))
                    }
                },
            ),
            Overload::new(
                &parser,
                "ParseStrict",
                true,
                vec![param(&string), by_ref(&int32)],
                |_, args| {
                    args[1] = Value::I32(-1);
                    Err(HostError::exception("FormatException", "input was not a number"))
                },
            ),
            Overload::new(&greeter, "IGreeter.Greet", false, Vec::new(), |_, _| {
                Ok(Value::str("hello"))
            })
            .private(),
            Overload::new(&object, "GetType", false, Vec::new(), |target, _| {
                Ok(Value::Type(target.runtime_type().unwrap_or_else(HostType::object)))
            }),
            Overload::new(&calc_ext, "Triple", true, vec![param(&calculator)], |_, args| {
                let offset = match &args[0] {
                    Value::Object(o) => o.downcast_ref::<Calculator>().map_or(0, |c| c.offset),
                    _ => 0,
                };
                Ok(Value::I32(offset * 3))
            }),
        ];

        Fixture {
            calculator,
            parser,
            greeter_iface,
            greeter,
            calc_ext,
            mode,
            resolver: Arc::new(CountingResolver::new(overloads)),
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.resolver.clone()).with_interface_maps(Arc::new(GreeterMaps {
            greeter: self.greeter.clone(),
        }))
    }

    pub fn calculator_target(&self, offset: i32) -> HostTarget {
        HostTarget::for_instance(Value::Object(HostObject::new(
            &self.calculator,
            Calculator { offset },
        )))
    }

    pub fn greeter_as_interface(&self) -> HostTarget {
        HostTarget::for_declared(
            &self.greeter_iface,
            Value::Object(HostObject::new(&self.greeter, ())),
        )
    }

    pub fn calls(&self) -> usize {
        self.resolver.calls()
    }
}

fn calculator_offset(target: &HostTarget) -> i32 {
    match target.instance() {
        Some(Value::Object(o)) => o.downcast_ref::<Calculator>().map_or(0, |c| c.offset),
        _ => 0,
    }
}

/// `Greeter` implements `IGreeter.Greet` under its qualified private name.
struct GreeterMaps {
    greeter: HostType,
}

impl InterfaceMapProvider for GreeterMaps {
    fn interface_maps(&self, runtime: &HostType, _interface: &HostType) -> Vec<InterfaceMap> {
        if *runtime != self.greeter {
            return Vec::new();
        }
        vec![InterfaceMap {
            target_type: self.greeter.clone(),
            interface_methods: vec![MethodInfo::instance("Greet")],
            target_methods: vec![MethodInfo::instance("IGreeter.Greet").private()],
        }]
    }
}
