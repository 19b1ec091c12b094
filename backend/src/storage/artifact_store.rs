use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use shared::ModelKind;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::error::StorageError;

const JPEG_QUALITY: u8 = 95;

/// Annotated frames on disk, one file per request, at most one retained per model type.
pub struct ArtifactStore {
    root: PathBuf,
    latest: Mutex<HashMap<ModelKind, PathBuf>>,
}

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub base64: String,
}

impl ArtifactStore {
    /// Creates the directory if needed and keeps only the newest leftover artifact per model type.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let store = Self {
            root: root.into(),
            latest: Mutex::new(HashMap::new()),
        };
        store.ensure_dir()?;
        store.adopt_existing();
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_dir(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.root).map_err(|source| StorageError::CreateDir {
            path: self.root.display().to_string(),
            source,
        })
    }

    pub fn artifact_path(&self, kind: ModelKind, request_id: Uuid) -> PathBuf {
        self.root.join(format!("{}_{}.jpg", kind, request_id))
    }

    /// Writes the frame, reads the same file back as base64, then retires the previous artifact.
    pub fn encode(
        &self,
        frame: &RgbImage,
        kind: ModelKind,
        request_id: Uuid,
    ) -> Result<StoredArtifact, StorageError> {
        self.ensure_dir()?;
        let path = self.artifact_path(kind, request_id);
        let bytes = match write_jpeg(frame, &path).and_then(|()| {
            std::fs::read(&path).map_err(|source| StorageError::Read {
                path: path.display().to_string(),
                source,
            })
        }) {
            Ok(bytes) => bytes,
            Err(e) => {
                // Never promoted, so nothing else would clean it up.
                remove_quietly(&path);
                return Err(e);
            }
        };
        let base64 = STANDARD.encode(&bytes);
        log::info!("Stored {} ({} bytes)", path.display(), bytes.len());

        self.promote(kind, path.clone());
        Ok(StoredArtifact { path, base64 })
    }

    pub fn latest(&self, kind: ModelKind) -> Option<PathBuf> {
        self.latest
            .lock()
            .ok()
            .and_then(|latest| latest.get(&kind).cloned())
    }

    fn promote(&self, kind: ModelKind, path: PathBuf) {
        let previous = match self.latest.lock() {
            Ok(mut latest) => latest.insert(kind, path),
            Err(_) => {
                log::warn!("Artifact table poisoned, keeping previous {} artifact", kind);
                return;
            }
        };
        if let Some(previous) = previous {
            remove_quietly(&previous);
        }
    }

    fn adopt_existing(&self) {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return;
        };
        let files: Vec<(PathBuf, std::time::SystemTime)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((entry.path(), modified))
            })
            .collect();

        for kind in ModelKind::iter() {
            let prefix = format!("{}_", kind);
            let mut owned: Vec<&(PathBuf, std::time::SystemTime)> = files
                .iter()
                .filter(|(path, _)| {
                    path.extension().is_some_and(|ext| ext == "jpg")
                        && path
                            .file_name()
                            .and_then(|name| name.to_str())
                            .is_some_and(|name| name.starts_with(&prefix))
                })
                .collect();
            owned.sort_by_key(|(_, modified)| *modified);

            if let Some((newest, _)) = owned.pop() {
                for (stale, _) in owned {
                    remove_quietly(stale);
                }
                self.promote(kind, newest.clone());
            }
        }
    }
}

fn write_jpeg(frame: &RgbImage, path: &Path) -> Result<(), StorageError> {
    let file = File::create(path).map_err(|e| StorageError::Write {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
        .encode_image(frame)
        .map_err(|e| StorageError::Write {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    writer.flush().map_err(|e| StorageError::Write {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove old artifact {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    fn artifacts_for(dir: &Path, kind: ModelKind) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .unwrap()
                    .to_string_lossy()
                    .starts_with(&format!("{}_", kind))
            })
            .collect()
    }

    #[test]
    fn open_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("nested").join("predictions");
        let store = ArtifactStore::open(&root).unwrap();
        assert!(root.is_dir());
        // Idempotent.
        store.ensure_dir().unwrap();
    }

    #[test]
    fn encoded_payload_matches_file_on_disk() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();
        let frame = RgbImage::from_pixel(32, 32, Rgb([200, 10, 10]));
        let id = Uuid::new_v4();

        let artifact = store.encode(&frame, ModelKind::Soil, id).unwrap();
        assert_eq!(artifact.path, tmp.path().join(format!("soil_{}.jpg", id)));

        let on_disk = std::fs::read(&artifact.path).unwrap();
        assert_eq!(STANDARD.decode(&artifact.base64).unwrap(), on_disk);
        assert!(image::load_from_memory(&on_disk).is_ok());
    }

    #[test]
    fn sequential_predictions_leave_one_artifact_per_model() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();
        let frame = RgbImage::new(16, 16);

        let first = store.encode(&frame, ModelKind::Soil, Uuid::new_v4()).unwrap();
        let other = store.encode(&frame, ModelKind::Vegetation, Uuid::new_v4()).unwrap();
        let second = store.encode(&frame, ModelKind::Soil, Uuid::new_v4()).unwrap();

        assert!(!first.path.exists());
        assert_eq!(artifacts_for(tmp.path(), ModelKind::Soil), vec![second.path.clone()]);
        assert_eq!(artifacts_for(tmp.path(), ModelKind::Vegetation), vec![other.path]);
        assert_eq!(store.latest(ModelKind::Soil), Some(second.path));
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();

        let err = store
            .encode(&RgbImage::new(0, 0), ModelKind::Soil, Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, StorageError::Write { .. }));
        assert!(artifacts_for(tmp.path(), ModelKind::Soil).is_empty());
        assert_eq!(store.latest(ModelKind::Soil), None);

        let ok = store
            .encode(&RgbImage::new(8, 8), ModelKind::Soil, Uuid::new_v4())
            .unwrap();
        assert_eq!(artifacts_for(tmp.path(), ModelKind::Soil), vec![ok.path]);
    }

    #[test]
    fn reopening_prunes_stale_leftovers() {
        let tmp = TempDir::new().unwrap();
        let frame = RgbImage::new(8, 8);
        let old = tmp.path().join("vegetation_old.jpg");
        write_jpeg(&frame, &old).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let new = tmp.path().join("vegetation_new.jpg");
        write_jpeg(&frame, &new).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"keep me").unwrap();

        let store = ArtifactStore::open(tmp.path()).unwrap();
        assert!(!old.exists());
        assert!(new.exists());
        assert!(tmp.path().join("notes.txt").exists());
        assert_eq!(store.latest(ModelKind::Vegetation), Some(new));
        assert_eq!(store.latest(ModelKind::Soil), None);
    }
}
