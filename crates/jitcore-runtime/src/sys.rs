//! The native `Platform` implementation (spec §4.1, §6.1): turns a byte
//! buffer into an executable mapping using the host OS's page protection
//! primitives, via the `region` crate.
//!
//! `region::alloc` hands back an RAII `Allocation` that unmaps on drop; the
//! `Platform` trait's contract is address+length based instead (`Acquire`
//! returns a pair, `Release` takes the same pair back), so `NativePlatform`
//! keeps the live `Allocation`s in a side table keyed by address and lets
//! removing an entry do the actual unmap.

use std::collections::HashMap;

use parking_lot::Mutex;
use region::{Allocation, Protection};

use jitcore_environ::{Error, Platform, RawCodeSegment};

pub struct NativePlatform {
    live: Mutex<HashMap<usize, Allocation>>,
}

impl Default for NativePlatform {
    fn default() -> Self {
        NativePlatform {
            live: Mutex::new(HashMap::new()),
        }
    }
}

impl NativePlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Platform for NativePlatform {
    fn mmap_code_segment(&self, bytes: &[u8]) -> Result<RawCodeSegment, Error> {
        let mut alloc = region::alloc(bytes.len().max(1), Protection::READ_WRITE)
            .map_err(|e| Error::Platform(format!("mmap {} bytes: {e}", bytes.len())))?;

        // SAFETY: `alloc` was just created with write permission and is
        // large enough for `bytes.len()` by construction above.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), alloc.as_mut_ptr::<u8>(), bytes.len());
        }

        // SAFETY: `alloc.as_ptr()`/`alloc.len()` describe the mapping just
        // allocated; no other thread can observe it before this call
        // returns and inserts it into `self.live`.
        unsafe {
            region::protect(alloc.as_ptr::<u8>(), alloc.len(), Protection::READ_EXECUTE)
                .map_err(|e| Error::Platform(format!("mprotect read+execute: {e}")))?;
        }

        let address = alloc.as_ptr::<u8>() as usize;
        let len = bytes.len();
        self.live.lock().insert(address, alloc);
        Ok(RawCodeSegment { address, len })
    }

    unsafe fn munmap_code_segment(&self, address: usize, len: usize) -> Result<(), Error> {
        match self.live.lock().remove(&address) {
            Some(_allocation) => Ok(()), // dropped here, unmapping the pages
            None => Err(Error::Platform(format!(
                "munmap: address {address:#x} (len {len}) is not a live mapping"
            ))),
        }
    }
}
