use std::any::Any;

use crate::error::{CompileError, Error, ErrorKind};
use crate::module_id::ModuleId;
use crate::types::{FuncIndex, FuncType, FunctionDef, TypeId};

/// One element of the linearized Wasm operation stream a function's IR is
/// reduced to upstream of this crate (spec §1: "the intermediate
/// representation (IR) producer" is out of scope; this is its output type).
///
/// This is intentionally not an exhaustive Wasm opcode enumeration — the
/// per-architecture emitter (`Compiler`) is an opaque, externally supplied
/// collaborator (spec §6.1); the categories below are the ones the compiler
/// driver (`jitcore-jit`) itself has to reason about (labels for
/// reachability, calls for builtin/host dispatch wiring).
#[derive(Clone, Debug, PartialEq)]
pub enum IrOp {
    /// A reachability join point. The driver asks the emitter whether code
    /// following it is live (spec §4.4 step 3, §6.1 `compileLabel`).
    Label,
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),
    ConstI32(i32),
    ConstI64(i64),
    ConstF32(u32),
    ConstF64(u64),
    UnaryOp(UnaryOpKind),
    BinaryOp(BinaryOpKind),
    Load(MemArg),
    Store(MemArg),
    MemorySize,
    MemoryGrow,
    TableGet(u32),
    TableSet(u32),
    TableGrow(u32),
    TableSize(u32),
    Call(FuncIndex),
    CallIndirect(TypeId, u32),
    Branch(u32),
    BranchIf(u32),
    BranchTable(Vec<u32>, u32),
    Return,
    Unreachable,
    Drop,
    Select,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOpKind {
    Clz,
    Ctz,
    Popcnt,
    Neg,
    Abs,
    Sqrt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOpKind {
    Add,
    Sub,
    Mul,
    DivSigned,
    DivUnsigned,
    RemSigned,
    RemUnsigned,
    And,
    Or,
    Xor,
    Shl,
    ShrSigned,
    ShrUnsigned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemArg {
    pub offset: u32,
    pub align: u32,
}

/// The raw result of `Platform::mmap_code_segment`: an address and length
/// with no ownership semantics attached. `jitcore-runtime::CodeSegment`
/// wraps this with the release-on-drop discipline spec §4.1 requires.
#[derive(Clone, Copy, Debug)]
pub struct RawCodeSegment {
    pub address: usize,
    pub len: usize,
}

/// Platform facilities (spec §4.1, §6.1): turn a byte buffer into an
/// executable region, and release one by address+length.
pub trait Platform: Send + Sync {
    /// Copy `bytes` into a freshly acquired region mapped read+execute.
    /// Implementations must not leave the region writable after this
    /// returns (spec: "write MUST NOT remain after publication").
    fn mmap_code_segment(&self, bytes: &[u8]) -> Result<RawCodeSegment, Error>;

    /// Unmap the region at `address` of length `len`. Must be idempotent
    /// against a call the caller has already nulled out its reference for,
    /// but a genuine double-unmap of a still-referenced region is a fatal
    /// bug in the caller, not this trait's concern (spec §4.1 policy).
    ///
    /// # Safety
    /// `address`/`len` must be exactly the pair returned by a prior
    /// `mmap_code_segment` call on `self` that has not already been passed
    /// to `munmap_code_segment`.
    unsafe fn munmap_code_segment(&self, address: usize, len: usize) -> Result<(), Error>;

    /// Whether this platform can JIT at all (spec §6.1 `compiler_supported`).
    fn compiler_supported(&self) -> bool {
        true
    }
}

/// The architecture-specific code emitter (spec's `ICompiler`, §4.4, §6.1).
/// One instance per function being compiled.
pub trait Compiler {
    /// Prepare the emitter for a function of the given type. `ensure_termination`
    /// tells the emitter to instrument loop back-edges with a `CheckExitCode`
    /// builtin call so a cooperatively cancelled call can unwind from inside
    /// a long-running loop rather than only at entry (spec §4.5 step 2).
    fn init(
        &mut self,
        func_type: FuncType,
        listener_attached: bool,
        ensure_termination: bool,
    ) -> Result<(), CompileError>;

    /// Emit a trampoline into a host-language closure instead of real Wasm
    /// code (spec §4.4 step 2: `go_func` functions skip the IR entirely).
    fn compile_host_trampoline(&mut self) -> Result<(), CompileError>;

    /// Emit whatever prologue the calling convention requires before the
    /// first IR operation (spec §4.4 step 3).
    fn compile_preamble(&mut self) -> Result<(), CompileError>;

    /// A label operation: returns whether code following it is reachable.
    /// The driver skips operations until the next reachable label when this
    /// returns `false` (spec §4.4 step 3, §6.1 `compileLabel`).
    fn compile_label(&mut self) -> Result<bool, CompileError>;

    /// Dispatch a single (non-`Label`) IR operation to the matching
    /// per-category emitter method.
    fn compile_operation(&mut self, op: &IrOp) -> Result<(), CompileError>;

    /// The native byte offset the next emitted instruction will land at,
    /// used by the driver to build `SourceOffsetMap` entries (spec §4.4
    /// step 3, §4.8).
    fn current_native_offset(&self) -> u32;

    /// Finalize emission, yielding the raw code bytes and the function's
    /// stack-pointer ceiling in slots (spec §4.4 step 4).
    fn finish(self: Box<Self>) -> Result<(Vec<u8>, u64), CompileError>;
}

/// An external, optionally persistent byte store keyed by module identity
/// (spec §4.3, §6.1). Concurrency is the collaborator's concern; this crate
/// treats it as linearizable per key.
pub trait ExternalCache: Send + Sync {
    fn get(&self, id: ModuleId) -> Result<Option<Vec<u8>>, Error>;
    fn add(&self, id: ModuleId, bytes: &[u8]) -> Result<(), Error>;
    fn delete(&self, id: ModuleId) -> Result<(), Error>;
}

/// Read-only access to the managed stack's frame-walking logic, exposed to
/// `Listener::before` so a listener can itself inspect the call stack
/// (spec §4.6, §8 Scenario F). Implemented by `jitcore_runtime::StackIter`.
pub trait StackWalk {
    fn next(&mut self) -> bool;
    fn parameters(&self) -> &[u64];
}

/// Grows a module instance's linear memory by `delta_pages` (spec §4.5
/// `MemoryGrow` builtin). Backing storage and its relocation policy belong
/// to the embedding layer (spec §1: "the top-level embedding API" is an
/// external collaborator); this trait is only the hook the trampoline calls
/// to refresh its cached base+length.
pub trait MemoryGrower: Send + Sync {
    /// Returns the new size in pages, and the new cached
    /// `(base_address, length_in_bytes)`, or `None` if the grow failed
    /// (spec §4.5: "push new-size-in-pages ... on failure").
    fn grow(&self, delta_pages: u32) -> Option<(u32, usize, usize)>;
}

/// Grows one of a module instance's tables (spec §4.5 `TableGrow` builtin).
pub trait TableGrower: Send + Sync {
    /// Returns the new size in elements, or `None` if the grow failed
    /// (spec §4.5: "grow that table; push new size").
    fn grow(&self, table_index: u32, delta: u32, init: u64) -> Option<u32>;
}

/// The before/after callback pair attachable to a `CompiledFunction`
/// (spec §3 `listener`, §4.5 `ListenerBefore`/`ListenerAfter`, §8 Scenario F).
pub trait Listener: Send + Sync {
    /// Called before entering the function. May return an opaque context
    /// object that replaces the call engine's current context until
    /// `after` runs (spec §4.7 "Listener context stack").
    fn before(
        &self,
        def: &FunctionDef,
        params: &[u64],
        stack: &mut dyn StackWalk,
    ) -> Box<dyn Any + Send>;

    /// Called after the function returns or traps.
    fn after(
        &self,
        def: &FunctionDef,
        ctx: Box<dyn Any + Send>,
        err: Option<&ErrorKind>,
        results: &[u64],
    );
}
