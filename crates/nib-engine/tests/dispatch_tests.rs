//! Dispatch Tests
//!
//! Tests for the unified call protocol:
//! - Bad function handles propagate as errors
//! - Return-shape mismatches degrade to defaults with one report
//! - Array, dynamic and positional argument forms agree
//! - Arity checks, callee faults and re-entrant native calls
//! - Interrupt handler chaining
//!
//! # Running Tests
//! ```bash
//! cargo test --test dispatch_tests
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nib_engine::nib_sdk::{
    create_native, severity, Environment, EnvironmentExt, Function, FunctionMap, Handle,
    InterruptHandler, InterruptResult, NativeArg, NoopInterruptHandler, Opcode, ReturnShape,
    ReturnValue,
};
use nib_engine::{CallFault, ScriptError, Vm, VmValue};

fn math_library(map: &mut dyn FunctionMap) {
    map.insert(
        "add",
        create_native(2, |env, args| {
            let a = args[0].as_int().unwrap_or(0);
            let b = args[1].as_int().unwrap_or(0);
            env.new_int(a.wrapping_add(b))
        }),
    );
    map.insert(
        "add_one_via_add",
        create_native(1, |env, args| {
            let add = env.get_function("add").unwrap();
            let sum = env
                .call_int_function(add, (args[0].clone(), 1i32))
                .unwrap_or_default();
            env.new_int(sum)
        }),
    );
    map.insert(
        "greet",
        create_native(1, |env, args| {
            let name = args[0].as_str().unwrap_or("?");
            env.new_string(&format!("hello, {}", name))
        }),
    );
    map.insert("nothing", create_native(0, |_env, _args| Handle::NULL));
    map.insert(
        "explode",
        create_native(0, |_env, _args| panic!("native body exploded")),
    );
    map.insert(
        "forged",
        create_native(0, |_env, _args| Handle::from_bits(0xdead_0000_0001)),
    );
}

struct Fixture {
    vm: Vm,
    module: Handle,
}

impl Fixture {
    fn new() -> Self {
        let vm = Vm::new();
        let module = vm.load_library("math", &math_library).unwrap();
        vm.define_script_function(module, "text", 0, |_| Ok(Some(VmValue::from("not a number"))))
            .unwrap();
        vm.define_script_function(module, "quiet", 0, |_| Ok(None))
            .unwrap();
        vm.define_script_function(module, "trap", 0, |_| {
            Err(ScriptError::Trap("division by zero".into()))
        })
        .unwrap();
        Self { vm, module }
    }

    fn function(&self, name: &str) -> Handle {
        self.vm.get_function("math", name).unwrap()
    }
}

// ===== Handle Resolution =====

#[test]
fn test_bad_function_handle_is_error() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();

    assert!(env
        .call_int_function_a(Handle::NULL, &[])
        .unwrap_err()
        .is_bad_handle());
    assert!(env
        .call_void_function_a(fx.module, &[])
        .unwrap_err()
        .is_bad_handle());
    let scalar = env.new_int(1);
    assert!(env
        .call_handle_function_a(scalar, &[])
        .unwrap_err()
        .is_bad_handle());
    assert!(env.get_all_errors().is_empty());
}

#[test]
fn test_stale_argument_handle_is_error() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();
    let stale = env.new_int(1);
    assert!(fx.vm.release(stale));

    let add = fx.function("add");
    let err = env
        .call_int_function_a(add, &[NativeArg::Handle(stale), NativeArg::Int(1)])
        .unwrap_err();
    assert!(err.is_bad_handle());
}

#[test]
fn test_get_function_searches_own_module_only() {
    let fx = Fixture::new();
    let other = fx.vm.define_module("other").unwrap();
    let env = fx.vm.module_environment(other).unwrap();

    assert!(env.get_function("add").is_none());
    assert_eq!(
        env.get_function_in(fx.module, "add").unwrap(),
        Some(fx.function("add"))
    );
    assert_eq!(env.get_function_in(fx.module, "missing").unwrap(), None);
    assert!(env
        .get_function_in(Handle::NULL, "add")
        .unwrap_err()
        .is_bad_handle());
}

#[test]
fn test_get_module_is_case_sensitive() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();
    assert_eq!(env.get_module("math"), Some(fx.module));
    assert_eq!(env.get_module("Math"), None);
    assert_eq!(env.current_module(), fx.module);
}

// ===== Return Shapes =====

#[test]
fn test_int_request_against_string_script_function() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();
    let text = fx.function("text");

    assert_eq!(env.call_int_function_a(text, &[]).unwrap(), 0);
    let reports = env.get_all_errors();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].caused_by_native());
    assert_eq!(reports[0].function(), text);
    assert_eq!(reports[0].module(), fx.module);
}

#[test]
fn test_string_request_against_int_native_function() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();
    let add = fx.function("add");

    assert_eq!(env.call_string_function(add, (1i32, 2i32)).unwrap(), "");
    let report = env.get_latest_error().unwrap();
    assert!(!report.caused_by_native());
    assert_eq!(report.function(), add);
    assert!(env.get_latest_error().is_none());
}

#[test]
fn test_int_request_against_string_native_function() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();
    let greet = fx.function("greet");

    assert_eq!(env.call_int_function(greet, ("nib",)).unwrap(), 0);
    let reports = env.get_all_errors();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].caused_by_native());
    assert!(reports[0].cause().is_none());
}

#[test]
fn test_void_callee_through_typed_shape() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();

    let quiet = fx.function("quiet");
    assert_eq!(env.call_long_function_a(quiet, &[]).unwrap(), 0);
    assert_eq!(env.get_all_errors().len(), 1);

    env.call_void_function_a(quiet, &[]).unwrap();
    assert!(env.get_all_errors().is_empty());
}

#[test]
fn test_handle_shape_never_mismatches() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();

    let greeting = env
        .call_handle_function(fx.function("greet"), ("nib",))
        .unwrap();
    assert_eq!(env.get_string(greeting).unwrap(), "hello, nib");

    let nothing = env
        .call_handle_function_a(fx.function("nothing"), &[])
        .unwrap();
    assert!(nothing.is_null());

    assert!(env.get_all_errors().is_empty());
}

#[test]
fn test_handle_shape_returns_same_reference() {
    let fx = Fixture::new();
    let module = fx.module;
    let f = fx
        .vm
        .define_script_function(module, "self_module", 0, move |_| {
            Ok(Some(VmValue::Ref(module)))
        })
        .unwrap();
    let env = fx.vm.module_environment(module).unwrap();
    assert_eq!(env.call_handle_function_a(f, &[]).unwrap(), module);
    assert_eq!(env.local_count(), 0);
}

#[test]
fn test_native_result_promoted_to_caller() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();

    let h = env
        .call_handle_function(fx.function("add"), (20i32, 22i32))
        .unwrap();
    assert!(fx.vm.is_live(h));
    assert_eq!(env.get_int(h, true).unwrap(), 42);
    assert_eq!(env.local_count(), 1);
}

#[test]
fn test_call_function_primitive() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();
    let result = env
        .call_function(
            fx.function("add"),
            ReturnShape::Int,
            &[NativeArg::Int(2), NativeArg::Int(3)],
        )
        .unwrap();
    assert_eq!(result, ReturnValue::Int(5));
}

// ===== Argument Forms =====

#[test]
fn test_argument_forms_agree() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();
    let add = fx.function("add");
    let text = fx.function("text");

    let args = [NativeArg::Int(40), NativeArg::Int(2)];
    let a = env.call_int_function_a(add, &args).unwrap();
    let l = env.call_int_function_l(add, args.to_vec()).unwrap();
    let p = env.call_int_function(add, (40i32, 2i32)).unwrap();
    assert_eq!((a, l, p), (42, 42, 42));
    assert!(env.get_all_errors().is_empty());

    let a = env.call_int_function_a(text, &[]).unwrap();
    let first = env.get_latest_error().unwrap();
    let l = env.call_int_function_l(text, Vec::new()).unwrap();
    let second = env.get_latest_error().unwrap();
    let p = env.call_int_function(text, ()).unwrap();
    let third = env.get_latest_error().unwrap();

    assert_eq!((a, l, p), (0, 0, 0));
    for report in [&second, &third] {
        assert_eq!(report.message(), first.message());
        assert_eq!(report.module(), first.module());
        assert_eq!(report.function(), first.function());
        assert_eq!(report.caused_by_native(), first.caused_by_native());
        assert_eq!(report.severity(), first.severity());
    }
}

#[test]
fn test_handle_arguments_pass_through() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();
    let a = env.new_int(7);
    let b = env.new_byte(3);
    let sum = env
        .call_int_function(fx.function("add"), (a, b))
        .unwrap();
    // A byte argument is not an int; `as_int` yields None and the body uses 0.
    assert_eq!(sum, 7);
}

#[test]
fn test_function_wrapper() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();

    let add = Function::lookup(&env, "add").unwrap();
    assert_eq!(add.handle(), fx.function("add"));
    assert_eq!(add.call_int((1i32, 2i32)).unwrap(), 3);
    assert!(Function::lookup(&env, "missing").is_none());
    assert!(Function::wrap(&env, fx.module).unwrap_err().is_bad_handle());

    let greet = Function::lookup(&env, "greet").unwrap();
    assert_eq!(greet.call_string(("you",)).unwrap(), "hello, you");
}

// ===== Arity & Faults =====

#[test]
fn test_arity_mismatch_skips_callee() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let vm = Vm::new();
    let module = vm
        .load_library("counting", &move |map: &mut dyn FunctionMap| {
            let counter = counter.clone();
            map.insert(
                "tick",
                create_native(1, move |env, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    env.new_int(1)
                }),
            );
        })
        .unwrap();
    let tick = vm.get_function("counting", "tick").unwrap();
    let env = vm.module_environment(module).unwrap();

    assert_eq!(env.call_int_function(tick, (1i32, 2i32)).unwrap(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let report = env.get_latest_error().unwrap();
    assert_eq!(report.severity(), severity::ERROR);
    assert_eq!(report.function(), env.function());

    assert_eq!(env.call_int_function(tick, (5i32,)).unwrap(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_native_panic_is_contained() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();
    let explode = fx.function("explode");

    assert_eq!(env.call_string_function_a(explode, &[]).unwrap(), "");
    let report = env.get_latest_error().unwrap();
    assert!(report.caused_by_native());
    assert_eq!(report.severity(), severity::CRITICAL);
    assert_eq!(report.function(), explode);
    let cause = report.cause().unwrap();
    assert!(cause.to_string().contains("native body exploded"));
    assert!(cause.downcast_ref::<CallFault>().is_some());

    // The VM is still usable afterwards.
    assert_eq!(
        env.call_int_function(fx.function("add"), (1i32, 1i32)).unwrap(),
        2
    );
}

#[test]
fn test_native_stale_return_is_fault() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();
    let h = env.call_handle_function_a(fx.function("forged"), &[]).unwrap();
    assert!(h.is_null());
    let report = env.get_latest_error().unwrap();
    assert!(report.caused_by_native());
}

#[test]
fn test_script_fault_carries_cause() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();

    assert_eq!(env.call_int_function_a(fx.function("trap"), &[]).unwrap(), 0);
    let report = env.get_latest_error().unwrap();
    assert!(!report.caused_by_native());
    let cause = report.cause().unwrap();
    assert_eq!(
        cause.downcast_ref::<ScriptError>(),
        Some(&ScriptError::Trap("division by zero".into()))
    );
}

#[test]
fn test_reentrant_native_call() {
    let fx = Fixture::new();
    let env = fx.vm.module_environment(fx.module).unwrap();
    let baseline = fx.vm.live_handles();

    let f = fx.function("add_one_via_add");
    assert_eq!(env.call_int_function(f, (41i32,)).unwrap(), 42);
    assert!(env.get_all_errors().is_empty());
    assert_eq!(fx.vm.live_handles(), baseline);
}

#[test]
fn test_invoke_from_interpreter() {
    let fx = Fixture::new();
    let add = fx.function("add");
    assert_eq!(
        fx.vm
            .invoke(add, &[VmValue::Int(2), VmValue::Int(40)])
            .unwrap(),
        Some(VmValue::Int(42))
    );
    assert_eq!(fx.vm.invoke(fx.function("nothing"), &[]).unwrap(), None);
}

// ===== Interrupts =====

struct Echo;

impl InterruptHandler for Echo {
    fn handle(
        &self,
        env: &dyn Environment,
        id: u16,
        opcode: Opcode,
        args: &[NativeArg],
    ) -> InterruptResult {
        match id {
            0x10 => InterruptResult::Value(env.new_long(opcode.packed() as i64 + args.len() as i64)),
            0x11 => InterruptResult::Error("echo refused".into()),
            0x12 => panic!("echo handler crashed"),
            0x13 => InterruptResult::Value(Handle::from_bits(0xdead_0000_0001)),
            _ => InterruptResult::Unhandled,
        }
    }
}

#[test]
fn test_interrupt_handlers_tried_in_order() {
    let fx = Fixture::new();
    fx.vm.register_interrupt_handler(Arc::new(NoopInterruptHandler));
    fx.vm.register_interrupt_handler(Arc::new(Echo));
    let env = fx.vm.module_environment(fx.module).unwrap();

    let h = env.call_interrupt_function(0x10, Opcode::new(0, 1, 0), &[NativeArg::Int(0)]);
    assert_eq!(env.get_long(h, true).unwrap(), 0x100 + 1);
    assert!(env.get_all_errors().is_empty());
}

#[test]
fn test_unhandled_interrupt_reports() {
    let fx = Fixture::new();
    fx.vm.register_interrupt_handler(Arc::new(Echo));
    let env = fx.vm.module_environment(fx.module).unwrap();

    assert!(env
        .call_interrupt_function(0x99, Opcode::default(), &[])
        .is_null());
    assert!(env
        .call_interrupt_function(0x11, Opcode::default(), &[])
        .is_null());

    let reports = env.get_all_errors();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| !r.caused_by_native()));
    assert!(reports[1].message().contains("echo refused"));
}

#[test]
fn test_interrupt_handler_panic_is_contained() {
    let fx = Fixture::new();
    fx.vm.register_interrupt_handler(Arc::new(Echo));
    let env = fx.vm.module_environment(fx.module).unwrap();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        env.call_interrupt_function(0x12, Opcode::default(), &[])
    }));
    assert!(result.unwrap().is_null());

    let report = env.get_latest_error().unwrap();
    assert_eq!(report.severity(), severity::CRITICAL);
    assert!(report.caused_by_native());
    assert_eq!(report.module(), fx.module);
    let cause = report.cause().unwrap();
    assert!(cause.to_string().contains("echo handler crashed"));
    assert!(matches!(
        cause.downcast_ref::<CallFault>(),
        Some(CallFault::Panic { .. })
    ));

    // Later interrupts still dispatch.
    let h = env.call_interrupt_function(0x10, Opcode::default(), &[]);
    assert_eq!(env.get_long(h, true).unwrap(), 0);
}

#[test]
fn test_interrupt_stale_value_is_fault() {
    let fx = Fixture::new();
    fx.vm.register_interrupt_handler(Arc::new(Echo));
    let env = fx.vm.module_environment(fx.module).unwrap();

    assert!(env
        .call_interrupt_function(0x13, Opcode::default(), &[])
        .is_null());
    let report = env.get_latest_error().unwrap();
    assert_eq!(report.severity(), severity::CRITICAL);
    assert!(matches!(
        report.cause().unwrap().downcast_ref::<CallFault>(),
        Some(CallFault::StaleReturn(_))
    ));
    assert!(env.get_latest_error().is_none());
}
