//! Native-code lifecycle, calling convention, and backtrace machinery for
//! running already-compiled functions (spec §3, §4.1, §4.5–§4.8).
//!
//! This crate owns everything that touches raw memory or raw addresses:
//! executable code segments, the managed value stack, call frames, and the
//! per-invocation `CallEngine`. It depends on `jitcore_environ` for the
//! collaborator traits (`Platform`, `Compiler`, `Listener`, ...) and pure
//! data types, but never the other way around.

mod call_engine;
mod code_segment;
mod compiled;
mod instance;
mod source_offset;
mod stack;
mod stack_iter;
mod sys;
mod trampoline;
mod unwind;

pub use call_engine::{
    ArchContext, BuiltinIndex, CallEngine, ExitContext, ModuleContext, StackContext, StatusCode,
};
pub use code_segment::CodeSegment;
pub use compiled::{
    CompiledFunction, CompiledFunctionBuilder, CompiledModule, FunctionBody, HostFunc,
    SourceOffsetMap,
};
pub use instance::{Function, ModuleInstance};
pub use stack::Stack;
pub use stack_iter::StackIter;
pub use sys::NativePlatform;
pub use trampoline::{call, CallError, NativeEntry};
pub use unwind::RecoveredPanic;
