use crate::errors::{EngineError, Result};
use std::path::{Component, Path, PathBuf};

/// Source for `[FILE: name]` references.
pub trait FileStore: Send + Sync {
    /// `Ok(None)` when no file with that name exists.
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

/// Files served from a local directory. Names may not escape the root.
#[derive(Debug, Clone)]
pub struct DirFileStore {
    root: PathBuf,
}

impl DirFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> Option<PathBuf> {
        let rel = Path::new(name);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(rel))
    }
}

impl FileStore for DirFileStore {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.path_for(name) else {
            return Err(EngineError::TemplateResolution(format!(
                "invalid file name: {name}"
            )));
        };
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::TemplateResolution(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }
}
