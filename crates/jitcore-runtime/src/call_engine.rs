use std::any::Any;
use std::sync::Arc;

use jitcore_environ::ErrorKind;

use crate::instance::{Function, ModuleInstance};
use crate::stack::Stack;
use crate::stack_iter::StackIter;

/// The native-call status code written by generated code before it jumps to
/// the exit trampoline (spec §3 `ErrorKinds`). `Returned`/`CallHost`/
/// `CallBuiltin` are control-transfer statuses, not traps; everything else
/// maps onto `jitcore_environ::ErrorKind` via `as_trap`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StatusCode {
    Returned,
    CallHost,
    CallBuiltin,
    Unreachable,
    InvalidFloatToIntConversion,
    MemoryOutOfBounds,
    InvalidTableAccess,
    TypeMismatchOnIndirectCall,
    IntegerOverflow,
    IntegerDivisionByZero,
    StackOverflow,
    ModuleClosed,
}

impl StatusCode {
    pub fn as_trap(self) -> Option<ErrorKind> {
        match self {
            StatusCode::Returned | StatusCode::CallHost | StatusCode::CallBuiltin => None,
            StatusCode::Unreachable => Some(ErrorKind::Unreachable),
            StatusCode::InvalidFloatToIntConversion => {
                Some(ErrorKind::InvalidFloatToIntConversion)
            }
            StatusCode::MemoryOutOfBounds => Some(ErrorKind::MemoryOutOfBounds),
            StatusCode::InvalidTableAccess => Some(ErrorKind::InvalidTableAccess),
            StatusCode::TypeMismatchOnIndirectCall => Some(ErrorKind::TypeMismatchOnIndirectCall),
            StatusCode::IntegerOverflow => Some(ErrorKind::IntegerOverflow),
            StatusCode::IntegerDivisionByZero => Some(ErrorKind::IntegerDivisionByZero),
            StatusCode::StackOverflow => Some(ErrorKind::StackOverflow),
            StatusCode::ModuleClosed => Some(ErrorKind::ModuleClosed),
        }
    }
}

/// The builtin functions dispatched under `StatusCode::CallBuiltin` (spec
/// §4.5). `BreakPoint` lives only here, not as a top-level `StatusCode`
/// variant — see `DESIGN.md` for why spec §3's listing of it alongside the
/// other status codes is read as shorthand for "reachable via CallBuiltin".
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BuiltinIndex {
    MemoryGrow,
    GrowStack,
    TableGrow,
    ListenerBefore,
    ListenerAfter,
    CheckExitCode,
    BreakPoint,
}

/// Currently executing function and module instance, plus cached base
/// addresses native code reads by byte offset rather than chasing the
/// `module_instance` pointer on every access (spec §3 `module_context`:
/// "currently executing function pointer, module instance pointer, and
/// cached base addresses of globals, memory buffer, memory length, tables,
/// functions array, type-ID array, data-segment array, element-segment
/// array").
#[derive(Default)]
pub struct ModuleContext {
    pub current_function: Option<Arc<Function>>,
    pub module_instance: Option<Arc<ModuleInstance>>,
    pub globals_base: usize,
    pub memory_base: usize,
    pub memory_len: usize,
    pub tables_base: usize,
    pub functions_base: usize,
    pub type_ids_base: usize,
    pub data_segments_base: usize,
    pub element_segments_base: usize,
}

impl ModuleContext {
    /// Refresh every cached address from the module instance, used at call
    /// entry and again whenever a builtin mutates memory or tables (spec
    /// §4.5 `MemoryGrow`: "refresh cached memory base+length pointers on
    /// the call engine").
    pub fn sync_from(&mut self, instance: &Arc<ModuleInstance>) {
        self.globals_base = instance.globals_base;
        self.memory_base = instance.memory_base;
        self.memory_len = instance.memory_len;
        self.tables_base = instance.tables_base;
        self.functions_base = instance.functions.as_ptr() as usize;
        self.type_ids_base = instance.type_ids.as_ptr() as usize;
        self.data_segments_base = instance.data_segments_base;
        self.element_segments_base = instance.element_segments_base;
        self.module_instance = Some(instance.clone());
    }
}

/// Stack bookkeeping (spec §3 `stack_context`). `stack_base_pointer` is in
/// bytes (spec: "stack base pointer (in bytes)"; spec §8 Scenario D's
/// `base = 18<<3` confirms the byte convention); `stack_pointer` is in
/// 8-byte slots.
#[derive(Clone, Copy, Default)]
pub struct StackContext {
    pub stack_base_pointer: u64,
    pub stack_pointer: u64,
    pub stack_element0_address: usize,
    pub stack_len_in_bytes: u64,
}

/// Native-call exit status (spec §3 `exit_context`).
#[derive(Clone)]
pub struct ExitContext {
    pub status_code: StatusCode,
    pub builtin_index: Option<BuiltinIndex>,
    pub return_address: usize,
    pub caller_module_instance: Option<Arc<ModuleInstance>>,
    /// Set by native code alongside `status_code = CallHost` (spec §4.5
    /// "look up the callee's `go_func`"): the callee's index into the
    /// current module instance's functions array. Native code can only
    /// write integers here, never an `Arc`; resolving the index to a
    /// `Function` is the trampoline's job.
    pub callee_index: Option<u32>,
}

impl Default for ExitContext {
    fn default() -> Self {
        ExitContext {
            status_code: StatusCode::Returned,
            builtin_index: None,
            return_address: 0,
            caller_module_instance: None,
            callee_index: None,
        }
    }
}

/// Per-architecture scratch space (spec §3 `arch_context`). Opaque to
/// everything above the trampoline; sized generously enough for a handful
/// of callee-saved registers.
#[derive(Clone, Copy, Default)]
pub struct ArchContext {
    pub scratch: [u64; 4],
}

/// One saved listener context, part of the singly linked context stack
/// (spec §4.7 design note "Listener context stack", §8 Scenario F).
struct ContextFrame {
    ctx: Box<dyn Any + Send>,
    next: Option<Box<ContextFrame>>,
}

/// Per-invocation mutable state (spec §3 `CallEngine`). Reused across
/// top-level calls: state is reset after each one completes, but the
/// `stack` buffer and its capacity are retained (spec "Lifecycles:
/// `CallEngine`: ... reusable after each top-level call completes (state
/// reset, slices retained)").
pub struct CallEngine {
    pub module_context: ModuleContext,
    pub stack_context: StackContext,
    pub exit_context: ExitContext,
    pub arch_context: ArchContext,
    stack: Stack,
    initial_fn: Option<Arc<Function>>,
    ctx: Option<Box<dyn Any + Send>>,
    context_stack: Option<Box<ContextFrame>>,
    module_closed: bool,
}

impl CallEngine {
    pub fn new(initial_len_slots: u64) -> Self {
        let stack = Stack::new(initial_len_slots);
        let stack_element0_address = stack.base_address();
        let stack_len_in_bytes = stack.len_bytes();
        CallEngine {
            module_context: ModuleContext::default(),
            stack_context: StackContext {
                stack_base_pointer: 0,
                stack_pointer: 0,
                stack_element0_address,
                stack_len_in_bytes,
            },
            exit_context: ExitContext::default(),
            arch_context: ArchContext::default(),
            stack,
            initial_fn: None,
            ctx: None,
            context_stack: None,
            module_closed: false,
        }
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    pub fn is_module_closed(&self) -> bool {
        self.module_closed
    }

    pub fn close_module(&mut self) {
        self.module_closed = true;
    }

    /// Push each argument as a slot, reserve `max(0, results - params)` zero
    /// slots, then a zeroed callFrame, and position `stack_pointer` just
    /// above it (spec §4.5 step 4, §8 property 5 / Scenario E).
    pub fn initialize_stack(&mut self, args: &[u64], param_slots: u32, result_slots: u32) {
        debug_assert_eq!(args.len(), param_slots as usize);
        let s = param_slots.max(result_slots) as u64;
        let needed = s + 3;
        if needed > self.stack.len_slots() {
            self.stack.grow(needed.max(self.stack.len_slots()), 0);
            self.stack_context.stack_element0_address = self.stack.base_address();
            self.stack_context.stack_len_in_bytes = self.stack.len_bytes();
        }

        let slots = self.stack.as_mut_slice();
        slots[..args.len()].copy_from_slice(args);
        for slot in &mut slots[args.len()..s as usize] {
            *slot = 0;
        }
        // Initial frame: callFrame is zeroed; unwinding stops on a zero
        // base pointer (spec §3 "Lifecycles").
        slots[s as usize] = 0;
        slots[s as usize + 1] = 0;
        slots[s as usize + 2] = 0;

        self.stack_context.stack_base_pointer = 0;
        self.stack_context.stack_pointer = needed;
    }

    pub fn set_initial_fn(&mut self, f: Option<Arc<Function>>) {
        self.initial_fn = f;
    }

    pub fn initial_fn(&self) -> Option<&Arc<Function>> {
        self.initial_fn.as_ref()
    }

    /// Reset after a top-level call completes, successfully or not (spec
    /// §4.7 step 5, §8 property 6): zero the pointers, restore
    /// `module_context.fn` to the initial function, retain the stack
    /// buffer.
    pub fn reset_after_call(&mut self) {
        self.stack_context.stack_base_pointer = 0;
        self.stack_context.stack_pointer = 0;
        self.module_context.module_instance = None;
        self.module_context.current_function = self.initial_fn.clone();
        self.ctx = None;
        self.context_stack = None;
    }

    pub fn stack_iter(&self) -> StackIter<'_> {
        StackIter::new(
            self.stack.as_slice(),
            self.module_context.current_function.clone(),
            self.stack_context.stack_base_pointer,
        )
    }

    /// Push the current listener context onto the context stack and
    /// install a new one (spec §4.7 "entries have lifetimes bounded by the
    /// surrounding call and are released in LIFO order").
    pub fn push_listener_ctx(&mut self, new_ctx: Box<dyn Any + Send>) {
        let previous = self.ctx.take();
        if let Some(previous) = previous {
            self.context_stack = Some(Box::new(ContextFrame {
                ctx: previous,
                next: self.context_stack.take(),
            }));
        }
        self.ctx = Some(new_ctx);
    }

    /// Pop back to the previously saved listener context (spec §8
    /// Scenario F: "the call engine's context is restored to the
    /// previously saved value; the context-stack head is popped").
    pub fn pop_listener_ctx(&mut self) -> Option<Box<dyn Any + Send>> {
        let popped = self.ctx.take();
        if let Some(frame) = self.context_stack.take() {
            self.ctx = Some(frame.ctx);
            self.context_stack = frame.next;
        }
        popped
    }
}
