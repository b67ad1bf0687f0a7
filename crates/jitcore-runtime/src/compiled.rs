use std::sync::{Arc, Weak};

use jitcore_environ::{FuncType, FunctionDef, Listener, TypeId};

use crate::code_segment::CodeSegment;
use crate::source_offset;

/// Two index-correlated, monotonic non-decreasing sequences mapping each IR
/// operation's native code offset to its Wasm-binary offset (spec §3
/// `source_offset_map`, §4.8).
#[derive(Clone, Debug, Default)]
pub struct SourceOffsetMap {
    native_offsets: Vec<u32>,
    wasm_offsets: Vec<u32>,
}

impl SourceOffsetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the operation at Wasm-binary offset `wasm_offset` emitted
    /// code starting at `native_offset` (spec §4.4 step 3: "If source-offset
    /// tracking is on, record the emitter's current native offset").
    pub fn push(&mut self, native_offset: u32, wasm_offset: u32) {
        debug_assert!(self.native_offsets.last().is_none_or(|&p| p <= native_offset));
        self.native_offsets.push(native_offset);
        self.wasm_offsets.push(wasm_offset);
    }

    pub fn is_empty(&self) -> bool {
        self.native_offsets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.native_offsets.len()
    }

    /// Resolve a native PC to the Wasm-binary offset of the operation it
    /// falls within (spec §4.8). `pc` and `code_initial_address` are both
    /// absolute addresses.
    pub fn resolve(&self, pc: usize, code_initial_address: usize) -> u32 {
        let delta = pc.saturating_sub(code_initial_address) as u32;
        source_offset::resolve(&self.native_offsets, &self.wasm_offsets, delta)
    }
}

/// A host-language closure substituting for a compiled Wasm body (spec §3
/// `go_func`): this compiled function is a trampoline into the embedder's
/// Rust code rather than a real code segment.
pub type HostFunc = Arc<dyn Fn(&mut [u64]) + Send + Sync>;

/// Either a real, mmap'd native code body or a host trampoline — mutually
/// exclusive, matching spec's "go_func: ... exclusive with a real
/// code_segment body".
pub enum FunctionBody {
    Native(CodeSegment),
    Host(HostFunc),
}

impl FunctionBody {
    pub fn is_host(&self) -> bool {
        matches!(self, FunctionBody::Host(_))
    }

    pub fn code_initial_address(&self) -> usize {
        match self {
            FunctionBody::Native(seg) => seg.address(),
            FunctionBody::Host(_) => 0,
        }
    }

    /// The function's native code bytes, or `None` for a host trampoline
    /// (spec §4.3 "Host-module exclusion": closures are not serializable).
    pub fn code_bytes(&self) -> Option<&[u8]> {
        match self {
            FunctionBody::Native(seg) => Some(seg.as_bytes()),
            FunctionBody::Host(_) => None,
        }
    }
}

/// The immutable product of compiling one Wasm function (spec §3).
pub struct CompiledFunction {
    body: FunctionBody,
    stack_pointer_ceil: u64,
    index_in_module: u32,
    source_module: Weak<CompiledModule>,
    listener: Option<Arc<dyn Listener>>,
    with_ensure_termination: bool,
    source_offset_map: SourceOffsetMap,
    func_type: FuncType,
    def: FunctionDef,
}

impl CompiledFunction {
    pub fn body(&self) -> &FunctionBody {
        &self.body
    }

    pub fn stack_pointer_ceil(&self) -> u64 {
        self.stack_pointer_ceil
    }

    pub fn index_in_module(&self) -> u32 {
        self.index_in_module
    }

    pub fn source_module(&self) -> Option<Arc<CompiledModule>> {
        self.source_module.upgrade()
    }

    pub fn listener(&self) -> Option<&Arc<dyn Listener>> {
        self.listener.as_ref()
    }

    pub fn with_ensure_termination(&self) -> bool {
        self.with_ensure_termination
    }

    pub fn source_offset_map(&self) -> &SourceOffsetMap {
        &self.source_offset_map
    }

    pub fn func_type(&self) -> FuncType {
        self.func_type
    }

    pub fn def(&self) -> &FunctionDef {
        &self.def
    }

    pub fn is_host(&self) -> bool {
        self.body.is_host()
    }

    pub fn code_initial_address(&self) -> usize {
        self.body.code_initial_address()
    }

    pub fn code_bytes(&self) -> Option<&[u8]> {
        self.body.code_bytes()
    }

    /// Release the native code segment, if any, ahead of this function's
    /// own `Drop`. Used by the code catalog when a module is evicted while
    /// it is otherwise unreachable, so the release happens promptly rather
    /// than whenever the last `Arc` happens to be dropped.
    pub(crate) fn release(&mut self) {
        if let FunctionBody::Native(seg) = &mut self.body {
            seg.release();
        }
    }
}

/// Everything needed to finish constructing a `CompiledFunction` except the
/// back-reference to its owning `CompiledModule`, which only exists once
/// every function in the module has been built (spec §3 `source_module`).
pub struct CompiledFunctionBuilder {
    pub body: FunctionBody,
    pub stack_pointer_ceil: u64,
    pub index_in_module: u32,
    pub listener: Option<Arc<dyn Listener>>,
    pub with_ensure_termination: bool,
    pub source_offset_map: SourceOffsetMap,
    pub func_type: FuncType,
    pub def: FunctionDef,
}

impl CompiledFunctionBuilder {
    fn finish(self, source_module: Weak<CompiledModule>) -> CompiledFunction {
        CompiledFunction {
            body: self.body,
            stack_pointer_ceil: self.stack_pointer_ceil,
            index_in_module: self.index_in_module,
            source_module,
            listener: self.listener,
            with_ensure_termination: self.with_ensure_termination,
            source_offset_map: self.source_offset_map,
            func_type: self.func_type,
            def: self.def,
        }
    }
}

/// Owns the ordered sequence of `CompiledFunction` for one module (spec §3).
///
/// This is the root owner referenced by spec §4.1's lifecycle policy:
/// dropping a `CompiledModule` drops every `CompiledFunction`, each of which
/// releases its code segment exactly once.
pub struct CompiledModule {
    functions: Vec<Arc<CompiledFunction>>,
    has_host_functions: bool,
}

impl CompiledModule {
    /// Build a module from its functions, wiring each function's
    /// `source_module` weak back-reference to the module being constructed
    /// (hence `Arc::new_cyclic`: the functions need a `Weak` to a
    /// `CompiledModule` that doesn't exist as an `Arc` until this call
    /// returns).
    pub fn new(builders: Vec<CompiledFunctionBuilder>) -> Arc<CompiledModule> {
        let has_host_functions = builders.iter().any(|b| b.body.is_host());
        Arc::new_cyclic(|weak: &Weak<CompiledModule>| {
            let functions = builders
                .into_iter()
                .map(|b| Arc::new(b.finish(weak.clone())))
                .collect();
            CompiledModule {
                functions,
                has_host_functions,
            }
        })
    }

    pub fn functions(&self) -> &[Arc<CompiledFunction>] {
        &self.functions
    }

    pub fn has_host_functions(&self) -> bool {
        self.has_host_functions
    }
}
