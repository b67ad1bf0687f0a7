//! The top-level `Call` entry point and the native-call trampoline loop
//! (spec §4.5).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use jitcore_environ::{ErrorKind, Listener as _};

use crate::call_engine::{BuiltinIndex, CallEngine, StatusCode};
use crate::instance::Function;
use crate::unwind::RecoveredPanic;

/// The signature generated code is compiled against: takes the address of
/// the live `CallEngine` and transfers control to native code at whatever
/// offset this function pointer was built from. Re-entry after a
/// `CallHost`/`CallBuiltin` dispatch calls this same signature again, at the
/// continuation label the compiler emitted for `exit_context.return_address`
/// (spec §4.5 trampoline loop step 1).
pub type NativeEntry = unsafe extern "C" fn(engine: *mut CallEngine);

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("expected {expected} parameter slots, got {actual}")]
    InvalidArgumentCount { expected: u32, actual: u32 },
    #[error("{0}")]
    Trap(ErrorKind),
    #[error("module closed")]
    ModuleClosed,
    #[error(transparent)]
    Recovered(#[from] RecoveredPanic),
}

/// `Call(ctx, params...) -> results` (spec §4.5 Entry).
///
/// `entry_for` resolves a code address to a callable native entry point;
/// production callers pass a thin wrapper around `std::mem::transmute` over
/// a published `CodeSegment`'s address, kept out of this function so it
/// stays free of the `unsafe` that only matters at the very last step.
pub fn call(
    engine: &mut CallEngine,
    function: &Arc<Function>,
    args: &[u64],
    ensure_termination: bool,
    cancelled: &(dyn Fn() -> bool + Sync),
    entry_for: impl Fn(usize) -> NativeEntry,
) -> Result<Vec<u64>, CallError> {
    let func_type = function.func_type;
    if args.len() != func_type.param_slots as usize {
        return Err(CallError::InvalidArgumentCount {
            expected: func_type.param_slots,
            actual: args.len() as u32,
        });
    }

    if ensure_termination && cancelled() {
        engine.close_module();
        return Err(CallError::ModuleClosed);
    }

    engine.initialize_stack(args, func_type.param_slots, func_type.result_slots);
    engine.module_context.current_function = Some(function.clone());
    engine.module_context.sync_from(&function.module_instance);
    engine.exit_context.return_address = function.code_initial_address;

    // Cooperative cancellation watcher (spec §4.5 step 5): this crate has
    // no embedding-level notion of a background task runtime, so the
    // "watcher" is just this closure, re-polled at every `CheckExitCode`
    // dispatch below rather than on its own thread.
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        run_trampoline_loop(engine, ensure_termination, cancelled, &entry_for)
    }));

    match outcome {
        Ok(()) => {
            if engine.is_module_closed() {
                // spec §4.7 step 6: a close that landed exactly as the call
                // was finishing still wins over a result that happened to
                // complete anyway.
                engine.reset_after_call();
                return Err(CallError::ModuleClosed);
            }
            let result_slots = func_type.result_slots as usize;
            let results = engine.stack().as_slice()[..result_slots].to_vec();
            engine.reset_after_call();
            Ok(results)
        }
        Err(payload) => {
            let recovered = RecoveredPanic::capture(payload.as_ref(), engine);
            engine.reset_after_call();
            Err(CallError::Recovered(recovered))
        }
    }
}

fn run_trampoline_loop(
    engine: &mut CallEngine,
    ensure_termination: bool,
    cancelled: &(dyn Fn() -> bool + Sync),
    entry_for: &impl Fn(usize) -> NativeEntry,
) {
    let mut code_addr = engine.exit_context.return_address;
    loop {
        let entry = entry_for(code_addr);
        // SAFETY: `code_addr` names either a function's published entry
        // point or a continuation label the compiler emitted specifically
        // for resumption after a `CallHost`/`CallBuiltin` dispatch; `engine`
        // outlives the call per the caller's borrow.
        unsafe {
            entry(engine as *mut CallEngine);
        }

        match engine.exit_context.status_code {
            StatusCode::Returned => return,
            StatusCode::CallHost => {
                dispatch_call_host(engine);
                code_addr = engine.exit_context.return_address;
            }
            StatusCode::CallBuiltin => {
                dispatch_builtin(engine, ensure_termination, cancelled);
                code_addr = engine.exit_context.return_address;
            }
            other => cause_trap(other),
        }
    }
}

fn dispatch_call_host(engine: &mut CallEngine) {
    let Some(index) = engine.exit_context.callee_index.take() else {
        panic!("CallHost status with no callee_index recorded in exit_context");
    };
    let Some(instance) = engine.module_context.module_instance.clone() else {
        panic!("CallHost status with no module instance installed");
    };
    let callee = instance
        .functions
        .get(index as usize)
        .unwrap_or_else(|| panic!("CallHost callee index {index} out of range"))
        .clone();
    let crate::compiled::FunctionBody::Host(host_fn) = callee.parent.body() else {
        panic!(
            "CallHost dispatched to {}, which has no host body",
            callee.debug_name()
        );
    };
    let host_fn = host_fn.clone();

    let base = (engine.stack_context.stack_base_pointer / 8) as usize;
    let window_len = callee.func_type.call_frame_offset() as usize;
    let slots = engine.stack_mut().as_mut_slice();
    let window = &mut slots[base..base + window_len];
    (*host_fn)(window);
}

fn dispatch_builtin(
    engine: &mut CallEngine,
    ensure_termination: bool,
    cancelled: &(dyn Fn() -> bool + Sync),
) {
    match engine.exit_context.builtin_index {
        Some(BuiltinIndex::MemoryGrow) => memory_grow(engine),
        Some(BuiltinIndex::GrowStack) => grow_stack(engine),
        Some(BuiltinIndex::TableGrow) => table_grow(engine),
        Some(BuiltinIndex::ListenerBefore) => listener_before(engine),
        Some(BuiltinIndex::ListenerAfter) => listener_after(engine),
        Some(BuiltinIndex::CheckExitCode) => check_exit_code(engine, ensure_termination, cancelled),
        Some(BuiltinIndex::BreakPoint) => {
            let name = engine
                .module_context
                .current_function
                .as_ref()
                .map(|f| f.debug_name());
            log::trace!("jitcore breakpoint hit in {name:?}");
        }
        None => panic!("CallBuiltin status with no builtin_index recorded"),
    }
}

fn memory_grow(engine: &mut CallEngine) {
    let sp = engine.stack_context.stack_pointer as usize;
    let delta_pages = engine.stack().as_slice()[sp - 1] as u32;

    let grower = engine
        .module_context
        .module_instance
        .as_ref()
        .and_then(|inst| inst.memory_grower.clone());

    let result = match grower.and_then(|g| g.grow(delta_pages)) {
        Some((new_pages, new_base, new_len)) => {
            engine.module_context.memory_base = new_base;
            engine.module_context.memory_len = new_len;
            new_pages as u64
        }
        None => 0xFFFF_FFFFu64,
    };

    engine.stack_mut().as_mut_slice()[sp - 1] = result;
}

fn table_grow(engine: &mut CallEngine) {
    let sp = engine.stack_context.stack_pointer as usize;
    let slots = engine.stack().as_slice();
    let table_index = slots[sp - 1] as u32;
    let num = slots[sp - 2] as u32;
    let init = slots[sp - 3];

    let grower = engine
        .module_context
        .module_instance
        .as_ref()
        .and_then(|inst| inst.table_grower.clone());

    let result = grower
        .and_then(|g| g.grow(table_index, num, init))
        .map(|new_size| new_size as u64)
        .unwrap_or(0xFFFF_FFFFu64);

    let slots = engine.stack_mut().as_mut_slice();
    slots[sp - 3] = result;
    engine.stack_context.stack_pointer -= 2; // net: 3 operands popped, 1 result pushed
}

/// spec §4.5 `GrowStack`, §4.5 "Stack growth details": `new_len = 2 *
/// old_len + caller_ceiling`; trap if that would exceed the call-stack
/// ceiling.
fn grow_stack(engine: &mut CallEngine) {
    let caller_ceiling = engine
        .module_context
        .current_function
        .as_ref()
        .map(|f| f.parent.stack_pointer_ceil())
        .unwrap_or(0);
    let old_len = engine.stack().len_slots();
    let new_len = 2 * old_len + caller_ceiling;

    let ceiling = jitcore_environ::Config::default().call_stack_ceiling_slots;
    if new_len > ceiling {
        cause_trap(StatusCode::StackOverflow);
    }

    let live_top = engine.stack_context.stack_pointer;
    engine.stack_mut().grow(new_len, live_top);
    engine.stack_context.stack_element0_address = engine.stack().base_address();
    engine.stack_context.stack_len_in_bytes = engine.stack().len_bytes();
}

fn listener_before(engine: &mut CallEngine) {
    let Some(function) = engine.module_context.current_function.clone() else {
        return;
    };
    let Some(listener) = function.parent.listener().cloned() else {
        return;
    };
    let params = engine.stack_iter().parameters().to_vec();
    let mut stack_walk = engine.stack_iter();
    let ctx = listener.before(&function.def, &params, &mut stack_walk);
    engine.push_listener_ctx(ctx);
}

fn listener_after(engine: &mut CallEngine) {
    let Some(function) = engine.module_context.current_function.clone() else {
        return;
    };
    let Some(listener) = function.parent.listener().cloned() else {
        return;
    };
    let Some(ctx) = engine.pop_listener_ctx() else {
        return;
    };
    let result_slots = function.func_type.result_slots as usize;
    let base = (engine.stack_context.stack_base_pointer / 8) as usize;
    let results = engine.stack().as_slice()[base..base + result_slots].to_vec();
    listener.after(&function.def, ctx, None, &results);
}

fn check_exit_code(
    engine: &mut CallEngine,
    ensure_termination: bool,
    cancelled: &(dyn Fn() -> bool + Sync),
) {
    if ensure_termination && cancelled() {
        engine.close_module();
    }
    if engine.is_module_closed() {
        panic!("{}", ErrorKind::ModuleClosed);
    }
}

fn cause_trap(status: StatusCode) -> ! {
    let kind = status
        .as_trap()
        .expect("cause_trap called on a non-trap status code");
    panic!("{kind}");
}
