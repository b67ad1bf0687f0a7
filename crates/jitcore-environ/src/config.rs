/// Tunables for the engine. Deliberately small: the out-of-scope embedding
/// API (store/instantiation configuration) is not this crate's concern, so
/// this only carries the knobs spec.md §6.3 and §4.5 name directly.
#[derive(Clone, Debug)]
pub struct Config {
    /// Hard ceiling on managed-stack growth, in 8-byte slots (spec §6.3:
    /// 5,000,000 slots == 40 MiB by default).
    pub call_stack_ceiling_slots: u64,

    /// Size of a freshly allocated managed stack when no function's ceiling
    /// demands more (spec §6.3: 512 slots).
    pub initial_stack_slots: u64,

    /// Enables cooperative termination checks: back-edge `CheckExitCode`
    /// builtin calls emitted by the compiler driver, and the cancellation
    /// watcher registered at `Call` entry (spec §4.5, §5).
    pub ensure_termination: bool,

    /// The version string embedded in, and checked against, the serialized
    /// cache header (spec §4.3 staleness rule).
    pub engine_version: String,
}

impl Config {
    pub const DEFAULT_CALL_STACK_CEILING_SLOTS: u64 = 5_000_000;
    pub const DEFAULT_INITIAL_STACK_SLOTS: u64 = 512;
}

impl Default for Config {
    fn default() -> Self {
        Config {
            call_stack_ceiling_slots: Self::DEFAULT_CALL_STACK_CEILING_SLOTS,
            initial_stack_slots: Self::DEFAULT_INITIAL_STACK_SLOTS,
            ensure_termination: false,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.call_stack_ceiling_slots, 5_000_000);
        assert_eq!(cfg.initial_stack_slots, 512);
        assert!(!cfg.ensure_termination);
    }
}
