//! Orchestrates an `ExternalCache` collaborator with the binary format in
//! `cache_format` (spec §4.3).

use std::sync::Arc;

use jitcore_environ::{Error, ExternalCache, FuncType, FunctionDef, Listener, ModuleId, Platform};
use jitcore_runtime::{
    CodeSegment, CompiledFunctionBuilder, CompiledModule, FunctionBody, SourceOffsetMap,
};

use crate::cache_format::{self, Deserialized, SerializedFunction};

/// Everything a function needs besides its ceiling and code bytes to
/// rebuild a `CompiledFunctionBuilder` after a cache hit. None of this is
/// part of the serialized format (spec §4.3's table only carries
/// `stack_pointer_ceil` and code) — the caller already knows it from the
/// module it is re-instantiating and supplies it back in the same order.
pub struct CacheFunctionMeta {
    pub func_type: FuncType,
    pub def: FunctionDef,
    pub listener: Option<Arc<dyn Listener>>,
    pub with_ensure_termination: bool,
}

/// Write a module's compiled functions to `cache`, unless it has any
/// host-defined functions (spec §4.3 "Host-module exclusion: modules whose
/// functions include host closures MUST NOT be written").
pub fn put(
    cache: &dyn ExternalCache,
    engine_version: &str,
    id: ModuleId,
    module: &CompiledModule,
) -> Result<(), Error> {
    if module.has_host_functions() {
        return Ok(());
    }
    let records: Vec<(u64, &[u8])> = module
        .functions()
        .iter()
        .map(|f| {
            (
                f.stack_pointer_ceil(),
                f.code_bytes().expect("host functions excluded above"),
            )
        })
        .collect();
    let functions: Vec<SerializedFunction<'_>> = records
        .iter()
        .map(|(ceil, code)| SerializedFunction {
            stack_pointer_ceil: *ceil,
            code,
        })
        .collect();
    let bytes = cache_format::serialize(engine_version, &functions);
    cache.add(id, &bytes)
}

/// Read path (spec §4.3: "Get -> parse header -> if stale, delete and
/// return miss -> otherwise for each function, read ceil and code, Acquire
/// a code segment; on any mid-stream error, release any functions already
/// acquired in this batch and fail"). The release-on-error half is again
/// free: `builders` owns each `CodeSegment` it has acquired so far, so
/// returning early drops them.
pub fn get(
    cache: &dyn ExternalCache,
    engine_version: &str,
    id: ModuleId,
    platform: Arc<dyn Platform>,
    module_name: Arc<str>,
    metadata: Vec<CacheFunctionMeta>,
) -> Result<Option<Arc<CompiledModule>>, Error> {
    let Some(bytes) = cache.get(id)? else {
        log::debug!("module {id}: cache miss");
        return Ok(None);
    };

    let functions = match cache_format::deserialize(&bytes, engine_version)? {
        Deserialized::Stale => {
            log::debug!("module {id}: cache entry is stale against engine version {engine_version}");
            // Best-effort: a delete failure is ignored, the next read will
            // re-attempt it (spec §7 "a stale blob is a miss after a
            // best-effort delete").
            if let Err(e) = cache.delete(id) {
                log::warn!("module {id}: failed to delete stale cache entry: {e}");
            }
            return Ok(None);
        }
        Deserialized::Functions(functions) => {
            log::debug!("module {id}: cache hit, {} functions", functions.len());
            functions
        }
    };

    if functions.len() != metadata.len() {
        return Err(Error::MalformedCache(format!(
            "cache holds {} functions but {} were expected",
            functions.len(),
            metadata.len()
        )));
    }

    let mut builders = Vec::with_capacity(functions.len());
    for (index, (deserialized, meta)) in functions.into_iter().zip(metadata).enumerate() {
        let segment = CodeSegment::acquire(
            platform.clone(),
            &deserialized.code,
            module_name.clone(),
            index as u32,
        )?;
        builders.push(CompiledFunctionBuilder {
            body: FunctionBody::Native(segment),
            stack_pointer_ceil: deserialized.stack_pointer_ceil,
            index_in_module: index as u32,
            listener: meta.listener,
            with_ensure_termination: meta.with_ensure_termination,
            source_offset_map: SourceOffsetMap::new(),
            func_type: meta.func_type,
            def: meta.def,
        });
    }

    Ok(Some(CompiledModule::new(builders)))
}
