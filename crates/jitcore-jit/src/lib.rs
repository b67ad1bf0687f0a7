//! Compiler driver, in-memory code catalog, and serialized cache codec for
//! the jitcore JIT engine (spec §4.2, §4.3, §4.4).

mod cache;
mod cache_format;
mod catalog;
mod driver;

pub use cache::{get as cache_get, put as cache_put, CacheFunctionMeta};
pub use cache_format::{deserialize, serialize, Deserialized, DeserializedFunction, SerializedFunction};
pub use catalog::CodeCatalog;
pub use driver::{compile_module, FunctionSource, FunctionToCompile};
