use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One mutex per destination directory.
///
/// Holding a directory's guard covers the whole list-versions / pick N /
/// write file / append manifest sequence for that directory. Directories
/// never go away, so entries are never evicted.
#[derive(Debug, Default)]
pub struct DirLocks {
    slots: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DirLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(dir.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` while holding the lock for `dir`.
    pub fn with_dir<T>(&self, dir: &Path, f: impl FnOnce() -> T) -> T {
        let slot = self.slot(dir);
        let _guard: MutexGuard<'_, ()> = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
