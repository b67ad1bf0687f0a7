//! Exercises panic recovery in `Engine::call` (spec §4.7): a panic raised
//! from inside "native code" (here a hand-written stand-in, see
//! `call_convention.rs`) is caught at the `Call` boundary and reported as a
//! `CallError::Recovered` carrying the original message and a stack trace.

use std::sync::Arc;

use jitcore::{CallEngine, CallError, Config, Engine, Function, ModuleInstance};
use jitcore_environ::{ErrorKind, FuncType, FunctionDef, TypeId};
use jitcore_runtime::{CompiledFunctionBuilder, CompiledModule, FunctionBody, SourceOffsetMap};

fn make_host_function(func_type: FuncType, name: &str) -> (Arc<Function>, Arc<ModuleInstance>) {
    let module = CompiledModule::new(vec![CompiledFunctionBuilder {
        body: FunctionBody::Host(Arc::new(|_: &mut [u64]| {})),
        stack_pointer_ceil: 8,
        index_in_module: 0,
        listener: None,
        with_ensure_termination: false,
        source_offset_map: SourceOffsetMap::new(),
        func_type,
        def: FunctionDef {
            name: Some(name.to_string()),
            ..Default::default()
        },
    }]);
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

unsafe extern "C" fn trapping_entry(_: *mut CallEngine) {
    panic!("{}", ErrorKind::IntegerDivisionByZero);
}

#[test]
fn a_trap_in_native_code_is_recovered_and_reported_with_its_message() {
    let engine = Engine::new(Config::default());
    let (function, _instance) = make_host_function(FuncType::new(0, 0), "divide");
    let mut call_engine = engine.new_call_engine();

    let err = engine
        .call(&mut call_engine, &function, &[], &|| false, |_| trapping_entry)
        .unwrap_err();

    match err {
        CallError::Recovered(recovered) => {
            assert_eq!(recovered.original(), "integer divide by zero");
            assert!(recovered.to_string().contains("recovered by jitcore"));
        }
        other => panic!("expected a recovered panic, got {other:?}"),
    }
}

#[test]
fn the_call_engine_is_reusable_after_a_recovered_panic() {
    let engine = Engine::new(Config::default());
    let (function, _instance) = make_host_function(FuncType::new(0, 0), "divide");
    let mut call_engine = engine.new_call_engine();

    let _ = engine.call(&mut call_engine, &function, &[], &|| false, |_| trapping_entry);

    unsafe extern "C" fn returning_entry(engine: *mut CallEngine) {
        let engine = unsafe { &mut *engine };
        engine.exit_context.status_code = jitcore_runtime::StatusCode::Returned;
    }
    let (function2, _instance2) = make_host_function(FuncType::new(0, 0), "noop");
    let results = engine
        .call(&mut call_engine, &function2, &[], &|| false, |_| {
            returning_entry
        })
        .unwrap();
    assert!(results.is_empty());
}
