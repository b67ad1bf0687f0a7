use std::fmt;

/// The trap taxonomy a running function can fail with (spec §3 `ErrorKinds`,
/// restricted to the subset that represents an actual trap rather than a
/// control-transfer status such as `Returned`/`CallHost`/`CallBuiltin` — see
/// `jitcore_runtime::StatusCode` for the full native-call status enum that
/// multiplexes both).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    Unreachable,
    InvalidFloatToIntConversion,
    MemoryOutOfBounds,
    InvalidTableAccess,
    TypeMismatchOnIndirectCall,
    IntegerOverflow,
    IntegerDivisionByZero,
    StackOverflow,
    ModuleClosed,
}

impl ErrorKind {
    /// The message fragment wasmtime-style trap `Display` impls use, e.g.
    /// `"wasm trap: unreachable"`.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::InvalidFloatToIntConversion => "invalid conversion to integer",
            ErrorKind::MemoryOutOfBounds => "out of bounds memory access",
            ErrorKind::InvalidTableAccess => "undefined element",
            ErrorKind::TypeMismatchOnIndirectCall => "indirect call type mismatch",
            ErrorKind::IntegerOverflow => "integer overflow",
            ErrorKind::IntegerDivisionByZero => "integer divide by zero",
            ErrorKind::StackOverflow => "call stack exhausted",
            ErrorKind::ModuleClosed => "module closed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A per-function compile-time failure (spec §4.4: "Errors are per-function
/// and fatal for the whole module compilation").
#[derive(Debug, thiserror::Error)]
#[error("compiling function {func_index}: {reason}")]
pub struct CompileError {
    pub func_index: FuncIndexForDiagnostics,
    pub reason: String,
}

/// Re-exported under a distinct name to avoid an import cycle with `types`;
/// identical representation to `crate::types::FuncIndex`.
pub type FuncIndexForDiagnostics = u32;

/// The crate-wide error type. Covers compile-time, cache, and (via
/// `jitcore-runtime`'s re-wrap) runtime trap failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("cache entry is malformed: {0}")]
    MalformedCache(String),

    #[error("cache read I/O error: {0}")]
    CacheIo(String),

    #[error("platform error acquiring executable memory: {0}")]
    Platform(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_messages_are_stable() {
        assert_eq!(ErrorKind::Unreachable.message(), "unreachable");
        assert_eq!(ErrorKind::StackOverflow.message(), "call stack exhausted");
    }
}
