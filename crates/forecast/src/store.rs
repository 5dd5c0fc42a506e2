//! Model store seam.

use std::collections::HashMap;
use std::sync::RwLock;

use stockcast_core::{EngineResult, ForecastError, Subject};

use crate::artifact::ModelArtifact;

/// Owns trained model artifacts, keyed by subject.
///
/// `save` replaces any previous artifact atomically: concurrent readers see
/// either the old or the new artifact, never a partial write. `load` returns
/// `Ok(None)` when nothing was ever saved and `ArtifactVersionMismatch` for
/// artifacts from an incompatible fitting version.
pub trait ModelStore: Send + Sync {
    fn load(&self, subject: &Subject) -> EngineResult<Option<ModelArtifact>>;
    fn save(&self, artifact: &ModelArtifact) -> EngineResult<()>;
    fn exists(&self, subject: &Subject) -> EngineResult<bool>;
}

/// Keeps encoded artifacts in memory, so loads go through the same
/// version check as persistent stores.
#[derive(Debug, Default)]
pub struct InMemoryModelStore {
    artifacts: RwLock<HashMap<Subject, Vec<u8>>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes, bypassing encoding (used to simulate foreign artifacts).
    pub fn put_raw(&self, subject: Subject, bytes: Vec<u8>) -> EngineResult<()> {
        self.artifacts
            .write()
            .map_err(|_| ForecastError::storage("model store lock poisoned"))?
            .insert(subject, bytes);
        Ok(())
    }

    pub fn remove(&self, subject: &Subject) -> EngineResult<()> {
        self.artifacts
            .write()
            .map_err(|_| ForecastError::storage("model store lock poisoned"))?
            .remove(subject);
        Ok(())
    }
}

impl ModelStore for InMemoryModelStore {
    fn load(&self, subject: &Subject) -> EngineResult<Option<ModelArtifact>> {
        let artifacts = self
            .artifacts
            .read()
            .map_err(|_| ForecastError::storage("model store lock poisoned"))?;
        artifacts.get(subject).map(|bytes| ModelArtifact::decode(bytes)).transpose()
    }

    fn save(&self, artifact: &ModelArtifact) -> EngineResult<()> {
        let bytes = artifact.encode()?;
        self.put_raw(artifact.subject.clone(), bytes)
    }

    fn exists(&self, subject: &Subject) -> EngineResult<bool> {
        Ok(self
            .artifacts
            .read()
            .map_err(|_| ForecastError::storage("model store lock poisoned"))?
            .contains_key(subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_versions_are_rejected_on_load() {
        let store = InMemoryModelStore::new();
        let subject = Subject::sku("SAR-001").unwrap();
        assert!(store.load(&subject).unwrap().is_none());

        store
            .put_raw(subject.clone(), br#"{"format_version": 0, "model": {}}"#.to_vec())
            .unwrap();
        assert!(store.exists(&subject).unwrap());
        assert_eq!(
            store.load(&subject).unwrap_err(),
            ForecastError::ArtifactVersionMismatch { found: 0, expected: 1 }
        );
    }
}
