use std::sync::Arc;

use jitcore_environ::{Error, Platform, RawCodeSegment};

/// An executable region of native code, owned exclusively by whichever
/// `CompiledFunction` acquired it (spec §4.1).
///
/// Released exactly once: `release` takes the stored address+length via
/// `Option::take`, so a second call is a no-op against the now-nulled
/// reference (spec: "Release MUST be idempotent against a nulled-out
/// reference"). If the underlying unmap itself fails — which can only
/// happen if something outside this type's control already tore down the
/// mapping, i.e. a genuine double release of the *same live region* — that
/// is fatal: we panic naming the owning module and function index (spec:
/// "a double release MUST panic with a diagnostic naming the module and
/// function index"), because continuing would leave dangling references
/// to unmapped memory that `Function::code_initial_address` and baked-in
/// return addresses on the managed stack still point at.
pub struct CodeSegment {
    platform: Arc<dyn Platform>,
    raw: Option<RawCodeSegment>,
    module_name: Arc<str>,
    func_index: u32,
}

impl CodeSegment {
    pub fn acquire(
        platform: Arc<dyn Platform>,
        bytes: &[u8],
        module_name: Arc<str>,
        func_index: u32,
    ) -> Result<Self, Error> {
        let raw = platform.mmap_code_segment(bytes)?;
        Ok(CodeSegment {
            platform,
            raw: Some(raw),
            module_name,
            func_index,
        })
    }

    pub fn address(&self) -> usize {
        self.raw.map(|r| r.address).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.raw.map(|r| r.len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the mapped bytes back out, e.g. to serialize a `CompiledModule`
    /// into the persistent cache format (spec §4.3). The mapping is
    /// read+execute, never write-only, so this is a plain read.
    pub fn as_bytes(&self) -> &[u8] {
        let Some(raw) = self.raw else { return &[] };
        // SAFETY: `raw.address`/`raw.len` describe a live read+execute
        // mapping for as long as `self.raw` holds it.
        unsafe { std::slice::from_raw_parts(raw.address as *const u8, raw.len) }
    }

    /// Release this region back to the platform. Idempotent: a second call
    /// after the first (or after `Drop`) observes `raw == None` and returns
    /// immediately.
    pub fn release(&mut self) {
        let Some(raw) = self.raw.take() else {
            return;
        };
        // SAFETY: `raw` was returned by `Platform::mmap_code_segment` and
        // has not been passed to `munmap_code_segment` before (`raw.take()`
        // above guarantees this is the only release of this value).
        let result = unsafe { self.platform.munmap_code_segment(raw.address, raw.len) };
        if let Err(e) = result {
            panic!(
                "fatal: releasing code segment for {}#{} failed (region already unmapped?): {e}",
                self.module_name, self.func_index
            );
        }
    }
}

impl Drop for CodeSegment {
    fn drop(&mut self) {
        self.release();
    }
}
