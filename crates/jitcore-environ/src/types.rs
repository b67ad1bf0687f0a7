use std::fmt;

/// Position of a function among a module's own (non-imported) functions.
///
/// Diagnostics-only (spec: `CompiledFunction::index_in_module`); never used
/// for addressing.
pub type FuncIndex = u32;

/// Canonical function-type identifier, used for `call_indirect` type checks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TypeId(pub u32);

/// A function's signature, expressed only in the units the calling
/// convention cares about: 8-byte slot counts for parameters and results.
///
/// The actual Wasm value types (i32/i64/f32/f64/ref) are carried separately
/// in `FunctionDef` for diagnostics; the calling convention itself is
/// slot-counted, not type-checked (spec §3 `CallEngine` stack layout).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct FuncType {
    pub param_slots: u32,
    pub result_slots: u32,
}

impl FuncType {
    pub const fn new(param_slots: u32, result_slots: u32) -> Self {
        FuncType {
            param_slots,
            result_slots,
        }
    }

    /// `max(param_slots, result_slots)`: the number of slots reserved for
    /// the callee before the callFrame, and the offset of the callFrame
    /// from `stack_base_pointer` (spec §3, §4.6 `callFrameOffset`).
    pub const fn call_frame_offset(&self) -> u32 {
        if self.param_slots > self.result_slots {
            self.param_slots
        } else {
            self.result_slots
        }
    }
}

/// Symbolic definition of a function, used only for diagnostics (trap
/// messages, stack traces). Never consulted by the calling convention.
#[derive(Clone, Debug, Default)]
pub struct FunctionDef {
    pub module_name: Option<String>,
    pub name: Option<String>,
    pub param_types: Vec<ValType>,
    pub result_types: Vec<ValType>,
}

impl FunctionDef {
    pub fn debug_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unknown>")
    }
}

impl fmt::Display for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.debug_name())?;
        for (i, ty) in self.param_types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ty}")?;
        }
        write!(f, ")")?;
        if !self.result_types.is_empty() {
            write!(f, " -> (")?;
            for (i, ty) in self.result_types.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{ty}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Wasm value types, kept here only for rendering parameter/result lists in
/// diagnostics (spec §7 "param/result type lists").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    FuncRef,
    ExternRef,
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
            ValType::FuncRef => "funcref",
            ValType::ExternRef => "externref",
        };
        f.write_str(s)
    }
}
