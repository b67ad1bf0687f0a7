//! The process-wide code catalog: `ModuleId` -> `CompiledModule` (spec §4.2).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use jitcore_environ::ModuleId;
use jitcore_runtime::CompiledModule;

/// Guards a `HashMap` with a readers-writer lock (spec §4.2, §5 "Code
/// catalog: readers-writer lock. Readers: lookups, enumeration. Writers:
/// insert/delete/close").
///
/// Dropping a previous entry on `insert`, or removing one on `delete`/
/// `close`, releases its code segments via `CompiledModule`'s own `Drop`
/// (spec §4.1 "the code catalog is the root owner").
#[derive(Default)]
pub struct CodeCatalog {
    entries: RwLock<HashMap<ModuleId, Arc<CompiledModule>>>,
}

impl CodeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-locked (spec §4.2 `Lookup`). The `bool` mirrors the source
    /// wording "(CompiledModule?, bool)"; it is simply whether the lookup
    /// hit, which is already implied by the `Option` — kept as a named
    /// field-free pair so callers that only want the hit/miss outcome don't
    /// need to inspect the `Option` itself.
    pub fn lookup(&self, id: ModuleId) -> (Option<Arc<CompiledModule>>, bool) {
        let found = self.entries.read().get(&id).cloned();
        let hit = found.is_some();
        (found, hit)
    }

    /// Write-locked; overwrites any previous entry (spec §4.2 `Insert`).
    pub fn insert(&self, id: ModuleId, module: Arc<CompiledModule>) {
        self.entries.write().insert(id, module);
    }

    /// Write-locked (spec §4.2 `Delete`). Does not touch the external
    /// cache; that collaborator's retention policy is its own concern.
    pub fn delete(&self, id: ModuleId) {
        self.entries.write().remove(&id);
    }

    /// Approximate reader; no strict consistency requirement (spec §4.2
    /// `Count`).
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    /// Drops every entry (spec §4.2 `Close`: "equivalent to Delete on all
    /// keys").
    pub fn close(&self) {
        self.entries.write().clear();
    }
}
