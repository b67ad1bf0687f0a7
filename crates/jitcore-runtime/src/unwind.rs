//! Panic/trap recovery for the top-level `Call` entry point (spec §4.7).
//!
//! Everything below `Call` — native code, host functions, and builtins —
//! uses panic/abort discipline rather than `Result` plumbing, because a trap
//! can originate from inside generated machine code with no call stack this
//! crate controls. `Call` is the single recovery site all of that converges
//! on.

use std::fmt;

use crate::call_engine::CallEngine;
use crate::stack_iter::StackIter;
use jitcore_environ::StackWalk;

/// One symbolic frame in a composed stack trace (spec §4.7 step 3, §7
/// "stack trace with function DebugNames ... and, when DWARF is present,
/// source lines").
struct Frame {
    debug_name: String,
    wasm_offset: Option<u32>,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.wasm_offset {
            Some(off) => write!(f, "\t{}() @{:#06x}", self.debug_name, off),
            None => write!(f, "\t{}()", self.debug_name),
        }
    }
}

/// The composed result of recovering from a panic raised below `Call` (spec
/// §4.7 step 4: `<original> (recovered by <engine>)` plus a formatted stack
/// trace).
pub struct RecoveredPanic {
    original: String,
    frames: Vec<Frame>,
}

impl RecoveredPanic {
    /// Build the recovered error from a captured panic payload and the call
    /// engine's state at the moment of the panic (spec §4.7 steps 1-3).
    ///
    /// Walks frames via the same rules as `StackIter`, resolving a source
    /// offset for the top frame (the one mid-execution when the panic fired)
    /// via each frame's `source_offset_map` when non-empty.
    pub fn capture(panic_payload: &(dyn std::any::Any + Send), engine: &CallEngine) -> Self {
        let original = payload_to_string(panic_payload);

        let mut frames = Vec::new();
        let mut iter = StackIter::new(
            engine.stack().as_slice(),
            engine.module_context.current_function.clone(),
            engine.stack_context.stack_base_pointer,
        );
        let mut first = true;
        while iter.next() {
            let Some(func) = iter.current_function() else {
                break;
            };
            let wasm_offset = if first {
                let map = func.parent.source_offset_map();
                if map.is_empty() {
                    None
                } else {
                    Some(map.resolve(
                        engine.exit_context.return_address,
                        func.code_initial_address,
                    ))
                }
            } else {
                None
            };
            frames.push(Frame {
                debug_name: func.debug_name().to_string(),
                wasm_offset,
            });
            first = false;
        }

        RecoveredPanic { original, frames }
    }

    pub fn original(&self) -> &str {
        &self.original
    }
}

impl fmt::Display for RecoveredPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (recovered by jitcore)", self.original)?;
        if !self.frames.is_empty() {
            write!(f, "\nwasm stack trace:")?;
            for frame in &self.frames {
                write!(f, "\n{frame}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for RecoveredPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for RecoveredPanic {}

fn payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::{
        CompiledFunction, CompiledFunctionBuilder, CompiledModule, FunctionBody, SourceOffsetMap,
    };
    use crate::instance::{Function, ModuleInstance};
    use jitcore_environ::{FuncType, FunctionDef, TypeId};
    use std::sync::Arc;

    fn make_function(name: &str) -> Arc<Function> {
        let module = CompiledModule::new(vec![CompiledFunctionBuilder {
            body: FunctionBody::Host(Arc::new(|_: &mut [u64]| {})),
            stack_pointer_ceil: 0,
            index_in_module: 0,
            listener: None,
            with_ensure_termination: false,
            source_offset_map: SourceOffsetMap::new(),
            func_type: FuncType::new(0, 0),
            def: FunctionDef {
                name: Some(name.to_string()),
                ..Default::default()
            },
        }]);
        let compiled: Arc<CompiledFunction> = module.functions()[0].clone();
        let instance = Arc::new(ModuleInstance {
            name: None,
            globals_base: 0,
            memory_base: 0,
            memory_len: 0,
            tables_base: 0,
            functions: Vec::new(),
            type_ids: Vec::new(),
            data_segments_base: 0,
            element_segments_base: 0,
            memory_grower: None,
            table_grower: None,
        });
        Arc::new(Function::new(instance, TypeId(0), 0, compiled))
    }

    #[test]
    fn scenario_d_stack_trace_matches_spec_shape() {
        let f1 = make_function("1");
        let f2 = make_function("2");
        let f3 = make_function("3");

        let mut engine = CallEngine::new(32);
        // f2's own callFrame: caller is f1, caller base = 0.
        let slots = engine.stack_mut().as_mut_slice();
        slots[3] = 0;
        slots[4] = 0;
        slots[5] = Function::to_handle(&f1);
        // f3's callFrame at slot 18 (base = 18<<3, per the spec scenario):
        // caller is f2, caller base = 3 slots = 24 bytes.
        slots[18] = 0;
        slots[19] = 24;
        slots[20] = Function::to_handle(&f2);

        engine.stack_context.stack_base_pointer = 18 * 8;
        engine.module_context.current_function = Some(f3);

        let panic_payload: Box<dyn std::any::Any + Send> = Box::new("some error".to_string());
        let recovered = RecoveredPanic::capture(panic_payload.as_ref(), &engine);

        assert_eq!(recovered.original(), "some error");
        let rendered = recovered.to_string();
        assert!(rendered.starts_with("some error (recovered by jitcore)"));
        assert!(rendered.contains("\t3()"));
        assert!(rendered.contains("\t2()"));
        assert!(rendered.contains("\t1()"));

        engine.reset_after_call();
        assert_eq!(engine.stack_context.stack_base_pointer, 0);
        assert_eq!(engine.stack_context.stack_pointer, 0);
        assert!(engine.module_context.module_instance.is_none());
    }
}
