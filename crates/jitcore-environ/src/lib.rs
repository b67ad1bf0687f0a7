//! Shared data model and collaborator contracts for the jitcore JIT engine.
//!
//! This crate has no `unsafe` code and no platform dependencies: it is the
//! vocabulary that `jitcore-runtime` and `jitcore-jit` both speak. See
//! `jitcore-runtime` for the native-code lifecycle and execution engine, and
//! `jitcore-jit` for the compiler driver, code catalog and serialized cache.

mod config;
mod error;
mod module_id;
mod traits;
mod types;

pub use config::Config;
pub use error::{CompileError, Error, ErrorKind, Result};
pub use module_id::ModuleId;
pub use traits::{
    BinaryOpKind, Compiler, ExternalCache, IrOp, Listener, MemArg, MemoryGrower, Platform,
    RawCodeSegment, StackWalk, TableGrower, UnaryOpKind,
};
pub use types::{FuncIndex, FuncType, FunctionDef, TypeId, ValType};
