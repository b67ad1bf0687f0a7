//! A thin facade wiring the data model, runtime, compiler driver, and
//! filesystem cache crates together behind a single `Engine` (spec §1's
//! "top-level embedding API" stays out of scope; this only ties the CORE's
//! own pieces together the way an embedder would).

use std::sync::Arc;

pub use jitcore_environ::{
    Config, Error as EnvironError, ErrorKind, FuncType, FunctionDef, IrOp, Listener, ModuleId,
    Platform,
};
pub use jitcore_jit::{CacheFunctionMeta, CodeCatalog, FunctionSource, FunctionToCompile};
pub use jitcore_runtime::{
    CallEngine, CallError, CompiledModule, Function, ModuleInstance, NativeEntry, NativePlatform,
};

use jitcore_environ::{CompileError, Compiler, ExternalCache};

/// Ties the in-memory code catalog, compiler driver, and an optional
/// persistent cache together behind one handle.
pub struct Engine {
    config: Config,
    platform: Arc<dyn Platform>,
    catalog: CodeCatalog,
    cache: Option<Arc<dyn ExternalCache>>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Engine {
            config,
            platform: Arc::new(NativePlatform::new()),
            catalog: CodeCatalog::new(),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ExternalCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &CodeCatalog {
        &self.catalog
    }

    /// Compile `functions` under `id`, publish the result into the code
    /// catalog, and — unless the module has any host function — write it
    /// through to the persistent cache (spec §4.2 `Insert`, §4.3 write
    /// path). A write-through failure is logged, not propagated: a missing
    /// cache entry just means the next process start recompiles.
    pub fn compile<C: Compiler>(
        &self,
        id: ModuleId,
        module_name: Arc<str>,
        functions: Vec<FunctionToCompile>,
        new_emitter: impl Fn() -> C,
    ) -> Result<Arc<CompiledModule>, CompileError> {
        let module = jitcore_jit::compile_module(
            self.platform.clone(),
            module_name,
            functions,
            new_emitter,
        )?;
        self.catalog.insert(id, module.clone());
        if let Some(cache) = &self.cache {
            if let Err(e) =
                jitcore_jit::cache_put(cache.as_ref(), &self.config.engine_version, id, &module)
            {
                log::warn!("writing module {id} to the persistent cache: {e}");
            }
        }
        Ok(module)
    }

    /// Look up a module already resident in the in-memory catalog (spec
    /// §4.2 `Lookup`).
    pub fn lookup(&self, id: ModuleId) -> Option<Arc<CompiledModule>> {
        self.catalog.lookup(id).0
    }

    /// Fetch a module from the persistent cache and publish it into the
    /// catalog on a hit (spec §4.3 Read path). Returns `Ok(None)` on a miss,
    /// including a stale entry that was just deleted; `Err` on a genuine
    /// cache-read failure.
    pub fn fetch_cached(
        &self,
        id: ModuleId,
        module_name: Arc<str>,
        metadata: Vec<CacheFunctionMeta>,
    ) -> Result<Option<Arc<CompiledModule>>, EnvironError> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let module = jitcore_jit::cache_get(
            cache.as_ref(),
            &self.config.engine_version,
            id,
            self.platform.clone(),
            module_name,
            metadata,
        )?;
        if let Some(module) = &module {
            log::debug!("module {id}: hit in persistent cache");
            self.catalog.insert(id, module.clone());
        } else {
            log::debug!("module {id}: miss in persistent cache");
        }
        Ok(module)
    }

    /// Remove a module from the in-memory catalog (spec §4.2 `Delete`).
    /// Does not touch the persistent cache — its retention policy is the
    /// collaborator's own concern.
    pub fn evict(&self, id: ModuleId) {
        self.catalog.delete(id);
    }

    /// Drop every catalog entry (spec §4.2 `Close`).
    pub fn close(&self) {
        self.catalog.close();
    }

    /// A freshly initialized `CallEngine` sized from `Config::initial_stack_slots`
    /// (spec §6.3). `CallEngine` is reusable across calls; callers that serve
    /// many invocations should keep one per worker rather than calling this
    /// per request.
    pub fn new_call_engine(&self) -> CallEngine {
        CallEngine::new(self.config.initial_stack_slots)
    }

    /// Call a compiled function (spec §4.5 Entry). `entry_for` resolves a
    /// native code address to a callable entry point; a production caller
    /// wraps `std::mem::transmute` over a published `CodeSegment` address,
    /// kept out of this crate so the `unsafe` stays at that one call site
    /// (matches `jitcore_runtime::call`'s own contract).
    pub fn call(
        &self,
        call_engine: &mut CallEngine,
        function: &Arc<Function>,
        args: &[u64],
        cancelled: &(dyn Fn() -> bool + Sync),
        entry_for: impl Fn(usize) -> NativeEntry,
    ) -> Result<Vec<u64>, CallError> {
        jitcore_runtime::call(
            call_engine,
            function,
            args,
            self.config.ensure_termination,
            cancelled,
            entry_for,
        )
    }
}
