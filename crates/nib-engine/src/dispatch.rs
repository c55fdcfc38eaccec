//! Dispatch / call protocol
//!
//! Every call form funnels into [`Vm::call_from`]: resolve the function
//! handle, coerce arguments, run the body with the VM unlocked, then coerce
//! the result to the shape the caller asked for.
//!
//! Only a bad function handle (or a stale argument handle) fails the call.
//! Arity mismatches, callee faults and return-shape mismatches degrade to
//! the shape's default value and queue a report for the caller's module.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use nib_sdk::{
    severity, BridgeError, BridgeResult, DiagnosticReport, Handle, InterruptResult, NativeArg,
    Opcode, ReturnShape, ReturnValue,
};

use crate::coerce::{coerce_return, value_to_arg};
use crate::environment::EngineEnvironment;
use crate::value::{FunctionBody, FunctionObject, Object, VmValue};
use crate::vm::Vm;

/// Fault raised while running a native body or interrupt handler
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallFault {
    /// Native code panicked
    #[error("`{function}` panicked: {message}")]
    Panic {
        /// Function name, or the interrupt label
        function: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// Native code returned a handle that was not live
    #[error("`{0}` returned a stale handle")]
    StaleReturn(String),
}

enum Outcome {
    Returned(Option<VmValue>),
    Faulted(DiagnosticReport),
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn fault_report(module: Handle, function: Handle, fault: CallFault) -> DiagnosticReport {
    DiagnosticReport::new(module, function, true, severity::CRITICAL, fault.to_string())
        .with_cause(Arc::new(fault))
}

impl Vm {
    fn resolve_function(&self, function: Handle) -> BridgeResult<FunctionObject> {
        let state = self.state.lock();
        match state.table.get(function) {
            Some(Object::Function(f)) => Ok(f.clone()),
            Some(other) => Err(BridgeError::bad_handle(format!(
                "{:?} addresses a {}, expected function",
                function,
                other.kind()
            ))),
            None => Err(BridgeError::bad_handle(format!(
                "{:?} is null or stale, expected function",
                function
            ))),
        }
    }

    /// Run a callee body with the VM unlocked
    fn run_body(&self, function: Handle, callee: &FunctionObject, args: &[VmValue]) -> Outcome {
        match &callee.body {
            FunctionBody::Script(body) => match body(args) {
                Ok(value) => Outcome::Returned(value),
                Err(err) => Outcome::Faulted(
                    DiagnosticReport::new(
                        callee.module,
                        function,
                        false,
                        severity::CRITICAL,
                        format!("function `{}` faulted", callee.name),
                    )
                    .with_cause(Arc::new(err)),
                ),
            },
            FunctionBody::Native(native) => {
                let env = EngineEnvironment::new(self, callee.module, function);
                let native_args: Vec<NativeArg> = args.iter().map(value_to_arg).collect();
                let result =
                    panic::catch_unwind(AssertUnwindSafe(|| native.call(&env, &native_args)));
                // Snapshot the value before `env` releases its locals.
                let returned = match result {
                    Ok(handle) => Ok(self.state.lock().value_of(handle)),
                    Err(payload) => Err(panic_message(payload.as_ref())),
                };
                drop(env);
                let fault = match returned {
                    Ok(Some(VmValue::Null)) => return Outcome::Returned(None),
                    Ok(Some(value)) => return Outcome::Returned(Some(value)),
                    Ok(None) => CallFault::StaleReturn(callee.name.clone()),
                    Err(message) => CallFault::Panic {
                        function: callee.name.clone(),
                        message,
                    },
                };
                Outcome::Faulted(fault_report(callee.module, function, fault))
            }
        }
    }

    /// Call `function` on behalf of `env`. Backs every call form.
    pub(crate) fn call_from(
        &self,
        env: &EngineEnvironment<'_>,
        function: Handle,
        shape: ReturnShape,
        args: &[NativeArg],
    ) -> BridgeResult<ReturnValue> {
        let callee = self.resolve_function(function)?;
        let vm_args = {
            let state = self.state.lock();
            args.iter()
                .map(|arg| state.arg_to_value(arg))
                .collect::<BridgeResult<Vec<_>>>()?
        };
        tracing::trace!(
            target: "nib",
            function = %callee.name,
            shape = shape.name(),
            argc = vm_args.len(),
            "dispatch"
        );

        if vm_args.len() != callee.argc {
            let mut state = self.state.lock();
            let message = format!(
                "function `{}` expects {} arguments, got {}",
                callee.name,
                callee.argc,
                vm_args.len()
            );
            state.report(env.site(), true, severity::ERROR, message);
            return Ok(ReturnValue::default_for(shape));
        }

        let outcome = self.run_body(function, &callee, &vm_args);

        let mut state = self.state.lock();
        let value = match outcome {
            Outcome::Returned(value) => value,
            Outcome::Faulted(report) => {
                state.diagnostics.push(env.module, report);
                return Ok(ReturnValue::default_for(shape));
            }
        };

        if shape == ReturnShape::Handle {
            let handle = match value {
                Some(value) => env.mint_in(&mut state, value),
                None => Handle::NULL,
            };
            return Ok(ReturnValue::Handle(handle));
        }

        match coerce_return(value.as_ref(), shape) {
            Some(result) => Ok(result),
            None => {
                let got = value.as_ref().map_or("void", VmValue::type_name);
                let report = DiagnosticReport::new(
                    callee.module,
                    function,
                    false,
                    state.options.default_severity,
                    format!(
                        "function `{}` returned {}, caller expected {}",
                        callee.name,
                        got,
                        shape.name()
                    ),
                );
                state.diagnostics.push(env.module, report);
                Ok(ReturnValue::default_for(shape))
            }
        }
    }

    /// Invoke `function` from the interpreter with VM values.
    ///
    /// Arguments must match the declared arity. Callee faults are queued in
    /// the callee's module and yield `Ok(None)`.
    pub fn invoke(&self, function: Handle, args: &[VmValue]) -> BridgeResult<Option<VmValue>> {
        let callee = self.resolve_function(function)?;
        if args.len() != callee.argc {
            return Err(BridgeError::bad_handle(format!(
                "function `{}` expects {} arguments, got {}",
                callee.name,
                callee.argc,
                args.len()
            )));
        }
        match self.run_body(function, &callee, args) {
            Outcome::Returned(value) => Ok(value),
            Outcome::Faulted(report) => {
                self.state.lock().diagnostics.push(callee.module, report);
                Ok(None)
            }
        }
    }

    /// Dispatch a raw interrupt to the registered handlers in order
    pub(crate) fn interrupt(
        &self,
        env: &EngineEnvironment<'_>,
        id: u16,
        opcode: Opcode,
        args: &[NativeArg],
    ) -> Handle {
        let handlers = self.interrupts.read().clone();
        tracing::trace!(target: "nib", id, opcode = opcode.packed(), argc = args.len(), "interrupt");

        let label = format!("interrupt {:#06x}/{:06x}", id, opcode.packed());

        for handler in &handlers {
            let result =
                panic::catch_unwind(AssertUnwindSafe(|| handler.handle(env, id, opcode, args)));
            let fault = match result {
                Ok(InterruptResult::Value(handle)) => {
                    if handle.is_null() || self.is_live(handle) {
                        return handle;
                    }
                    CallFault::StaleReturn(label.clone())
                }
                Ok(InterruptResult::Unhandled) => continue,
                Ok(InterruptResult::Error(message)) => {
                    let message = format!("{} failed: {}", label, message);
                    self.state
                        .lock()
                        .report(env.site(), false, severity::ERROR, message);
                    return Handle::NULL;
                }
                Err(payload) => CallFault::Panic {
                    function: label.clone(),
                    message: panic_message(payload.as_ref()),
                },
            };
            let site = env.site();
            self.state
                .lock()
                .diagnostics
                .push(site.module, fault_report(site.module, site.function, fault));
            return Handle::NULL;
        }

        let message = format!("unhandled {}", label);
        self.state
            .lock()
            .report(env.site(), false, severity::ERROR, message);
        Handle::NULL
    }
}
