//! File-backed model store.
//!
//! One JSON artifact per subject under a root directory. Saves write a
//! temporary sibling file and rename it over the target, so readers observe
//! either the previous or the new artifact.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use stockcast_core::{EngineResult, ForecastError, Subject};
use stockcast_forecast::{ModelArtifact, ModelStore};

#[derive(Debug, Clone)]
pub struct FileModelStore {
    root: PathBuf,
}

impl FileModelStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> EngineResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| io_error("create model directory", &root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, subject: &Subject) -> PathBuf {
        self.root.join(format!("{}.json", file_stem(&subject.storage_key())))
    }
}

/// Percent-encodes every byte outside `[A-Za-z0-9_.-]`, `%` included, so
/// distinct keys never share a file.
fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

impl ModelStore for FileModelStore {
    fn load(&self, subject: &Subject) -> EngineResult<Option<ModelArtifact>> {
        let path = self.path_for(subject);
        match fs::read(&path) {
            Ok(bytes) => {
                let artifact = ModelArtifact::decode(&bytes)?;
                if artifact.subject != *subject {
                    return Err(ForecastError::storage(format!(
                        "{} holds the model for {}, not {subject}",
                        path.display(),
                        artifact.subject
                    )));
                }
                Ok(Some(artifact))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read artifact", &path, e)),
        }
    }

    fn save(&self, artifact: &ModelArtifact) -> EngineResult<()> {
        let path = self.path_for(&artifact.subject);
        let tmp = self.root.join(format!(".{}.tmp", artifact.id));
        let bytes = artifact.encode()?;

        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(&bytes)?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(io_error("write artifact", &tmp, e));
        }
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            io_error("replace artifact", &path, e)
        })?;

        debug!(subject = %artifact.subject, path = %path.display(), "artifact saved");
        Ok(())
    }

    fn exists(&self, subject: &Subject) -> EngineResult<bool> {
        Ok(self.path_for(subject).is_file())
    }
}

fn io_error(operation: &str, path: &Path, err: io::Error) -> ForecastError {
    ForecastError::storage(format!("{operation} {}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use stockcast_core::ObservationSeries;
    use stockcast_forecast::{FeatureEngineer, FittedModel, SmoothingModel};

    fn artifact(subject: &Subject, level: f64) -> ModelArtifact {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let series = ObservationSeries::from_values(start, vec![level; 14]);
        let rows = FeatureEngineer::default().engineer(&series, &Default::default(), &[], subject);
        let model = SmoothingModel::fit(subject, &rows, 0.3).unwrap();
        ModelArtifact::new(
            subject.clone(),
            FittedModel::ExponentialSmoothing(model),
            start,
            level,
            14,
            Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn save_then_load_returns_the_same_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::open(dir.path().join("models")).unwrap();
        let subject = Subject::sku("SAR-001").unwrap();

        assert!(store.load(&subject).unwrap().is_none());
        assert!(!store.exists(&subject).unwrap());

        let saved = artifact(&subject, 12.0);
        store.save(&saved).unwrap();

        assert!(store.exists(&subject).unwrap());
        assert_eq!(store.load(&subject).unwrap(), Some(saved));
    }

    #[test]
    fn resave_replaces_without_leaving_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::open(dir.path()).unwrap();
        let subject = Subject::category("sarees").unwrap();

        store.save(&artifact(&subject, 5.0)).unwrap();
        let newer = artifact(&subject, 9.0);
        store.save(&newer).unwrap();

        assert_eq!(store.load(&subject).unwrap().map(|a| a.id), Some(newer.id));
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn similar_codes_keep_separate_models() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::open(dir.path()).unwrap();
        let underscore = Subject::sku("SAR_001").unwrap();
        let spaced = Subject::sku("SAR 001").unwrap();
        let starred = Subject::sku("SAR*001").unwrap();

        store.save(&artifact(&underscore, 4.0)).unwrap();

        assert!(!store.exists(&spaced).unwrap());
        assert!(store.load(&spaced).unwrap().is_none());
        assert!(store.load(&starred).unwrap().is_none());

        store.save(&artifact(&spaced, 8.0)).unwrap();
        assert_eq!(store.load(&underscore).unwrap().map(|a| a.subject), Some(underscore));
        assert_eq!(store.load(&spaced).unwrap().map(|a| a.subject), Some(spaced));
    }

    #[test]
    fn escaped_stems_are_distinct() {
        assert_eq!(file_stem("sku-SAR_001"), "sku-SAR_001");
        assert_eq!(file_stem("sku-SAR 001"), "sku-SAR%20001");
        assert_eq!(file_stem("sku-SAR%20001"), "sku-SAR%2520001");
    }

    #[test]
    fn artifact_under_the_wrong_key_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::open(dir.path()).unwrap();
        let owner = Subject::sku("SAR-001").unwrap();
        let other = Subject::sku("SAR-002").unwrap();
        fs::write(store.path_for(&other), artifact(&owner, 3.0).encode().unwrap()).unwrap();

        assert!(matches!(store.load(&other), Err(ForecastError::Storage(_))));
    }

    #[test]
    fn foreign_versions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::open(dir.path()).unwrap();
        let subject = Subject::sku("SAR-001").unwrap();
        fs::write(store.path_for(&subject), br#"{"format_version": 99}"#).unwrap();

        assert_eq!(
            store.load(&subject).unwrap_err(),
            ForecastError::ArtifactVersionMismatch { found: 99, expected: 1 }
        );
    }
}
