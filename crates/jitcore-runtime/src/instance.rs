use std::sync::Arc;

use jitcore_environ::{FuncType, FunctionDef, MemoryGrower, TableGrower, TypeId};

use crate::compiled::CompiledFunction;

/// A per-instance view onto a module's linear memory, tables, globals, and
/// function table — the cached base addresses spec §3 `module_context`
/// reads by byte offset from native code.
///
/// Instantiation itself (parsing imports, running start functions, growing
/// initial memory) is the out-of-scope top-level embedding API (spec §1);
/// this struct only carries the addresses the calling convention needs.
pub struct ModuleInstance {
    pub name: Option<String>,
    pub globals_base: usize,
    pub memory_base: usize,
    pub memory_len: usize,
    pub tables_base: usize,
    pub functions: Vec<Arc<Function>>,
    pub type_ids: Vec<TypeId>,
    pub data_segments_base: usize,
    pub element_segments_base: usize,
    pub memory_grower: Option<Arc<dyn MemoryGrower>>,
    pub table_grower: Option<Arc<dyn TableGrower>>,
}

impl ModuleInstance {
    pub fn func_type_matches(&self, func_index: u32, expected: TypeId) -> bool {
        self.functions
            .get(func_index as usize)
            .is_some_and(|f| f.type_id == expected)
    }
}

/// A per-instance resolved handle onto one compiled function (spec §3
/// `Function`).
pub struct Function {
    pub code_initial_address: usize,
    pub module_instance: Arc<ModuleInstance>,
    pub type_id: TypeId,
    pub index: u32,
    pub func_type: FuncType,
    pub def: FunctionDef,
    pub parent: Arc<CompiledFunction>,
}

impl Function {
    pub fn new(
        module_instance: Arc<ModuleInstance>,
        type_id: TypeId,
        index: u32,
        parent: Arc<CompiledFunction>,
    ) -> Self {
        Function {
            code_initial_address: parent.code_initial_address(),
            module_instance,
            type_id,
            index,
            func_type: parent.func_type(),
            def: parent.def().clone(),
            parent,
        }
    }

    pub fn debug_name(&self) -> &str {
        self.def.debug_name()
    }

    /// Encode a strong reference as the opaque 64-bit handle the calling
    /// convention stores in a callFrame's third slot (spec §3 callFrame
    /// `*caller_function`, §9 "Raw function pointers inside the stack").
    ///
    /// The returned handle does not own a strong count by itself; it is
    /// valid for as long as some other `Arc<Function>` (typically the
    /// owning `ModuleInstance::functions`) keeps the value alive, which
    /// holds for the whole lifetime of the call that wrote it.
    pub fn to_handle(this: &Arc<Function>) -> u64 {
        Arc::as_ptr(this) as usize as u64
    }

    /// Recover a `Function` from a handle written by `to_handle`.
    ///
    /// # Safety
    /// `handle` must be zero (meaning "no caller", spec §3 "Initial frame:
    /// callFrame is zeroed") or a value previously produced by
    /// `Function::to_handle` whose referent is still kept alive by another
    /// live `Arc`.
    pub unsafe fn from_handle(handle: u64) -> Option<Arc<Function>> {
        if handle == 0 {
            return None;
        }
        let ptr = handle as usize as *const Function;
        // SAFETY: caller's contract guarantees `ptr` is a live `Function`
        // kept alive elsewhere; bumping the strong count here and handing
        // back an owned `Arc` mirrors that external ownership rather than
        // stealing it.
        unsafe {
            Arc::increment_strong_count(ptr);
            Some(Arc::from_raw(ptr))
        }
    }
}
