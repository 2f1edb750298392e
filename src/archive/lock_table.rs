use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("{0} is already open, close it before opening it again")]
    AlreadyOpen(String),
}

/// The archive paths of every file currently open for editing.
#[derive(Debug, Default)]
pub struct LockTable {
    open: Mutex<HashSet<String>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `path` as open. Fails when it already is.
    pub fn lock(&self, path: &str) -> Result<(), LockError> {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if !open.insert(path.to_string()) {
            return Err(LockError::AlreadyOpen(path.to_string()));
        }
        Ok(())
    }

    pub fn unlock(&self, path: &str) {
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }

    pub fn is_locked(&self, path: &str) -> bool {
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }

    /// Every path still open, sorted.
    pub fn locked(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}
