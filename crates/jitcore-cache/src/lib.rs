//! A filesystem-backed `ExternalCache` (spec §4.3, §6.1): one file per
//! module, named by its content hash, written atomically via a temp file
//! rename so a reader never observes a partial write.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use jitcore_environ::{Error, ExternalCache, ModuleId};

pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Creates `root` (and any missing parents) if it doesn't already
    /// exist.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(FileCache { root })
    }

    fn path_for(&self, id: ModuleId) -> PathBuf {
        self.root.join(id.to_string())
    }
}

impl ExternalCache for FileCache {
    fn get(&self, id: ModuleId) -> Result<Option<Vec<u8>>, Error> {
        match fs::read(self.path_for(id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::CacheIo(e.to_string())),
        }
    }

    fn add(&self, id: ModuleId, bytes: &[u8]) -> Result<(), Error> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)
            .map_err(|e| Error::CacheIo(e.to_string()))?;
        tmp.write_all(bytes)
            .map_err(|e| Error::CacheIo(e.to_string()))?;
        tmp.persist(self.path_for(id))
            .map_err(|e| Error::CacheIo(e.error.to_string()))?;
        Ok(())
    }

    fn delete(&self, id: ModuleId) -> Result<(), Error> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::CacheIo(e.to_string())),
        }
    }
}
