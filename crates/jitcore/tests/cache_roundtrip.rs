//! Compile a module, write it through to a filesystem-backed cache, drop it
//! from the in-memory catalog, and fetch it back (spec §4.2, §4.3).

use std::sync::Arc;

use jitcore::{CacheFunctionMeta, Config, Engine, FunctionSource, FunctionToCompile, ModuleId};
use jitcore_cache::FileCache;
use jitcore_environ::{CompileError, Compiler, FuncType, FunctionDef, IrOp};

struct FakeEmitter {
    bytes: Vec<u8>,
}

impl Compiler for FakeEmitter {
    fn init(
        &mut self,
        _func_type: FuncType,
        _listener_attached: bool,
        _ensure_termination: bool,
    ) -> Result<(), CompileError> {
        Ok(())
    }
    fn compile_host_trampoline(&mut self) -> Result<(), CompileError> {
        unreachable!()
    }
    fn compile_preamble(&mut self) -> Result<(), CompileError> {
        self.bytes.push(0x90);
        Ok(())
    }
    fn compile_label(&mut self) -> Result<bool, CompileError> {
        Ok(true)
    }
    fn compile_operation(&mut self, _op: &IrOp) -> Result<(), CompileError> {
        self.bytes.push(0x90);
        Ok(())
    }
    fn current_native_offset(&self) -> u32 {
        self.bytes.len() as u32
    }
    fn finish(self: Box<Self>) -> Result<(Vec<u8>, u64), CompileError> {
        Ok((self.bytes, 4))
    }
}

fn fake_emitter() -> FakeEmitter {
    FakeEmitter { bytes: Vec::new() }
}

#[test]
fn compiled_module_survives_a_round_trip_through_the_persistent_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FileCache::new(dir.path()).unwrap());
    let engine = Engine::new(Config::default()).with_cache(cache);
    let id = ModuleId::from_bytes([0x42; 32]);

    let functions = vec![FunctionToCompile {
        source: FunctionSource::Wasm {
            ops: vec![(IrOp::ConstI32(7), 0)],
        },
        func_type: FuncType::new(0, 1),
        def: FunctionDef::default(),
        listener: None,
        with_ensure_termination: false,
        track_source_offsets: false,
    }];

    let original = engine
        .compile(id, Arc::from("m"), functions, fake_emitter)
        .unwrap();
    assert_eq!(original.functions().len(), 1);

    // Drop it from the in-memory catalog; only the persistent cache holds
    // it now.
    engine.evict(id);
    assert!(engine.lookup(id).is_none());

    let metadata = vec![CacheFunctionMeta {
        func_type: FuncType::new(0, 1),
        def: FunctionDef::default(),
        listener: None,
        with_ensure_termination: false,
    }];
    let fetched = engine
        .fetch_cached(id, Arc::from("m"), metadata)
        .unwrap()
        .expect("should hit the persistent cache");

    assert_eq!(fetched.functions().len(), 1);
    assert_eq!(fetched.functions()[0].stack_pointer_ceil(), 4);
    assert!(engine.lookup(id).is_some());
}

#[test]
fn a_module_with_no_cache_configured_never_hits() {
    let engine = Engine::new(Config::default());
    let id = ModuleId::from_bytes([0x43; 32]);
    let result = engine.fetch_cached(id, Arc::from("m"), vec![]).unwrap();
    assert!(result.is_none());
}
