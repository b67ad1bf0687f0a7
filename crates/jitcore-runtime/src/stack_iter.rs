use std::sync::Arc;

use jitcore_environ::StackWalk;

use crate::instance::Function;

/// Walks call frames on the managed stack to synthesize a backtrace (spec
/// §4.6). State is `(stack, function, base, started)`, matching spec's
/// wording exactly; `base` is in bytes, same convention as
/// `CallEngine::stack_context.stack_base_pointer`.
pub struct StackIter<'a> {
    stack: &'a [u64],
    function: Option<Arc<Function>>,
    base_bytes: u64,
    started: bool,
}

impl<'a> StackIter<'a> {
    pub fn new(stack: &'a [u64], function: Option<Arc<Function>>, base_bytes: u64) -> Self {
        StackIter {
            stack,
            function,
            base_bytes,
            started: false,
        }
    }

    pub fn current_function(&self) -> Option<&Arc<Function>> {
        self.function.as_ref()
    }

    pub fn base_bytes(&self) -> u64 {
        self.base_bytes
    }
}

impl StackWalk for StackIter<'_> {
    fn next(&mut self) -> bool {
        if !self.started {
            self.started = true;
            return self.function.is_some();
        }

        let Some(func) = self.function.clone() else {
            return false;
        };
        if self.base_bytes == 0 {
            return false;
        }

        let call_frame_offset_slots = func.func_type.call_frame_offset() as u64;
        let base_slot = self.base_bytes / 8;
        let frame_start = (base_slot + call_frame_offset_slots) as usize;
        if frame_start.checked_add(3).is_none_or(|end| end > self.stack.len()) {
            self.function = None;
            self.base_bytes = 0;
            return false;
        }

        let caller_base_bytes = self.stack[frame_start + 1];
        let caller_handle = self.stack[frame_start + 2];
        // SAFETY: the handle at this slot was either zeroed by
        // `CallEngine::initialize_stack` (the "Initial frame" case) or
        // written by `Function::to_handle` for a caller still referenced
        // by its `ModuleInstance` for the duration of this call.
        let caller_function = unsafe { Function::from_handle(caller_handle) };

        self.base_bytes = caller_base_bytes;
        self.function = caller_function;
        self.function.is_some()
    }

    fn parameters(&self) -> &[u64] {
        let Some(func) = &self.function else {
            return &[];
        };
        let base_slot = (self.base_bytes / 8) as usize;
        let n = func.func_type.param_slots as usize;
        match self.stack.get(base_slot..base_slot + n) {
            Some(slice) => slice,
            None => &[],
        }
    }
}
