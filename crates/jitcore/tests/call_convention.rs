//! Exercises `Engine::call`'s calling convention end to end: argument
//! validation, a clean return, and cancellation before entry (spec §4.5).
//!
//! `entry_for` here ignores the resolved code address and substitutes a
//! hand-written `extern "C" fn`, the same stand-in the unit tests in
//! `jitcore-runtime::trampoline` use in place of a real architecture
//! backend (there is no `Compiler` in this workspace that emits
//! executable machine code; that collaborator is external, spec §6.1).

use std::sync::Arc;

use jitcore::{CallEngine, Config, Engine, Function, ModuleInstance};
use jitcore_environ::{FuncType, FunctionDef, TypeId};
use jitcore_jit::{compile_module, FunctionSource, FunctionToCompile};
use jitcore_runtime::StatusCode;

fn make_function(func_type: FuncType) -> (Arc<Function>, Arc<ModuleInstance>) {
    let functions = vec![FunctionToCompile {
        source: FunctionSource::Wasm { ops: vec![] },
        func_type,
        def: FunctionDef {
            name: Some("identity".to_string()),
            ..Default::default()
        },
        listener: None,
        with_ensure_termination: false,
        track_source_offsets: false,
    }];
    let module = compile_module(
        Arc::new(jitcore::NativePlatform::new()),
        Arc::from("m"),
        functions,
        || NoopEmitter,
    )
    .unwrap();
    let compiled = module.functions()[0].clone();

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
    let f = Arc::new(Function::new(instance.clone(), TypeId(0), 0, compiled));
    (f, instance)
}

struct NoopEmitter;
impl jitcore_environ::Compiler for NoopEmitter {
    fn init(
        &mut self,
        _func_type: FuncType,
        _listener_attached: bool,
        _ensure_termination: bool,
    ) -> Result<(), jitcore_environ::CompileError> {
        Ok(())
    }
    fn compile_host_trampoline(&mut self) -> Result<(), jitcore_environ::CompileError> {
        unreachable!()
    }
    fn compile_preamble(&mut self) -> Result<(), jitcore_environ::CompileError> {
        Ok(())
    }
    fn compile_label(&mut self) -> Result<bool, jitcore_environ::CompileError> {
        Ok(true)
    }
    fn compile_operation(&mut self, _op: &jitcore_environ::IrOp) -> Result<(), jitcore_environ::CompileError> {
        Ok(())
    }
    fn current_native_offset(&self) -> u32 {
        0
    }
    fn finish(self: Box<Self>) -> Result<(Vec<u8>, u64), jitcore_environ::CompileError> {
        Ok((vec![0xc3], 8))
    }
}

unsafe extern "C" fn returning_entry(engine: *mut CallEngine) {
    let engine = unsafe { &mut *engine };
    engine.exit_context.status_code = StatusCode::Returned;
}

#[test]
fn clean_call_copies_arguments_through_as_results() {
    let engine = Engine::new(Config::default());
    let (function, _instance) = make_function(FuncType::new(1, 1));
    let mut call_engine = engine.new_call_engine();

    let results = engine
        .call(&mut call_engine, &function, &[99], &|| false, |_addr| {
            returning_entry
        })
        .unwrap();

    assert_eq!(results, vec![99]);
}

#[test]
fn wrong_argument_count_is_rejected_before_any_native_code_runs() {
    let engine = Engine::new(Config::default());
    let (function, _instance) = make_function(FuncType::new(2, 0));
    let mut call_engine = engine.new_call_engine();

    unsafe extern "C" fn unreachable_entry(_: *mut CallEngine) {
        panic!("native code must not run on an argument-count mismatch");
    }

    let err = engine
        .call(&mut call_engine, &function, &[1], &|| false, |_| {
            unreachable_entry
        })
        .unwrap_err();
    assert!(matches!(
        err,
        jitcore::CallError::InvalidArgumentCount {
            expected: 2,
            actual: 1
        }
    ));
}

#[test]
fn cancellation_before_entry_closes_the_module_without_running_native_code() {
    let mut config = Config::default();
    config.ensure_termination = true;
    let engine = Engine::new(config);
    let (function, _instance) = make_function(FuncType::new(0, 0));
    let mut call_engine = engine.new_call_engine();

    unsafe extern "C" fn unreachable_entry(_: *mut CallEngine) {
        panic!("native code must not run once cancellation closed the module");
    }

    let err = engine
        .call(&mut call_engine, &function, &[], &|| true, |_| {
            unreachable_entry
        })
        .unwrap_err();
    assert!(matches!(err, jitcore::CallError::ModuleClosed));
}
