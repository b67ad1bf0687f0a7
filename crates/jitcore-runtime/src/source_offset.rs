//! Resolves a native program counter to the Wasm-binary offset of the IR
//! operation it falls within (spec §4.8).
//!
//! `native_offsets`/`wasm_offsets` are index-correlated and both monotonic
//! non-decreasing. We binary-search for the first native offset `>= delta`
//! (an implicit past-the-end sentinel always satisfies this), then answer
//! with the Wasm offset one entry back — the last operation whose code
//! begins at or before `delta`.
///
/// Below the first recorded offset there is no preceding operation to
/// attribute the PC to, so that case returns 0. Past the last recorded
/// offset the PC still belongs to the last operation's code (its native
/// range extends to the end of the function), so that case returns the
/// last Wasm offset rather than 0 — see `DESIGN.md` for why this resolves
/// in favor of spec §8's boundary-behavior wording over §4.8's literal
/// "i == n returns 0".
pub fn resolve(native_offsets: &[u32], wasm_offsets: &[u32], delta: u32) -> u32 {
    debug_assert_eq!(native_offsets.len(), wasm_offsets.len());
    let n = native_offsets.len();
    if n == 0 {
        return 0;
    }
    let i = native_offsets.partition_point(|&x| x < delta);
    if i == 0 {
        0
    } else if i == n {
        wasm_offsets[n - 1]
    } else {
        wasm_offsets[i - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_resolves_to_zero() {
        assert_eq!(resolve(&[], &[], 5), 0);
    }

    #[test]
    fn below_first_offset_resolves_to_zero() {
        let native = [10, 20, 30];
        let wasm = [1, 2, 3];
        assert_eq!(resolve(&native, &wasm, 0), 0);
        assert_eq!(resolve(&native, &wasm, 9), 0);
    }

    #[test]
    fn exact_and_mid_range_hits() {
        let native = [10, 20, 30];
        let wasm = [100, 200, 300];
        assert_eq!(resolve(&native, &wasm, 10), 0); // i==0: 10 is not < 10 anywhere before it
        assert_eq!(resolve(&native, &wasm, 15), 100);
        assert_eq!(resolve(&native, &wasm, 25), 200);
    }

    #[test]
    fn above_last_offset_resolves_to_last_wasm_offset() {
        let native = [10, 20, 30];
        let wasm = [100, 200, 300];
        assert_eq!(resolve(&native, &wasm, 31), 300);
        assert_eq!(resolve(&native, &wasm, 1_000_000), 300);
    }
}
