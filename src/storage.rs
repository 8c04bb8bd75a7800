use crate::error::{Error, Result};
use facemind_capture::Embedding;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One persisted gallery row: a label and its embedding blob
/// (D little-endian f32 values).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: String,
    pub name: String,
    #[serde(with = "serde_bytes")]
    pub embedding: Vec<u8>,
}

impl FaceRecord {
    pub fn new(name: &str, embedding: &Embedding) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            embedding: embedding.to_le_bytes(),
        }
    }

    pub fn decode(&self) -> Result<Embedding> {
        Embedding::from_le_bytes(&self.embedding).map_err(|e| {
            Error::Corrupt(format!("record {:?} ({}): {}", self.name, self.id, e))
        })
    }
}

/// Durable backing storage for a gallery. Labels are not unique-keyed here;
/// uniqueness is enforced by [`crate::Gallery`].
pub trait GalleryStore {
    fn load_records(&self) -> Result<Vec<FaceRecord>>;

    /// Append one record. Must not return `Ok` unless the record is durable.
    fn append_record(&mut self, record: FaceRecord) -> Result<()>;
}

/// In-process store, for tests and throwaway galleries
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<FaceRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<FaceRecord>) -> Self {
        Self { records }
    }
}

impl GalleryStore for MemoryStore {
    fn load_records(&self) -> Result<Vec<FaceRecord>> {
        Ok(self.records.clone())
    }

    fn append_record(&mut self, record: FaceRecord) -> Result<()> {
        self.records.push(record);
        Ok(())
    }
}

/// Single postcard file holding every record
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> Error {
        Error::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Replace the file in one step: write a sibling temp file, sync, rename.
    fn write_records(&self, records: &[FaceRecord]) -> Result<()> {
        let data = postcard::to_allocvec(records).map_err(|source| Error::Codec {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            }
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let written = File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(&data)?;
                file.sync_all()
            })
            .and_then(|()| std::fs::rename(&tmp, &self.path));

        if let Err(e) = written {
            if let Err(cleanup) = std::fs::remove_file(&tmp) {
                debug!("could not remove {}: {}", tmp.display(), cleanup);
            }
            return Err(self.io_err(e));
        }
        Ok(())
    }
}

impl GalleryStore for FileStore {
    fn load_records(&self) -> Result<Vec<FaceRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }

        let data = std::fs::read(&self.path).map_err(|e| self.io_err(e))?;
        postcard::from_bytes(&data).map_err(|source| Error::Codec {
            path: self.path.clone(),
            source,
        })
    }

    fn append_record(&mut self, record: FaceRecord) -> Result<()> {
        let mut records = self.load_records()?;
        records.push(record);
        self.write_records(&records)?;
        debug!(
            "wrote {} record(s) to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, values: Vec<f32>) -> FaceRecord {
        FaceRecord::new(name, &Embedding::new(values).unwrap())
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested/gallery.bin"));
        assert!(store.load_records().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/gallery.bin");
        let mut store = FileStore::new(&path);

        store.append_record(record("alice", vec![1.0, 0.0])).unwrap();
        store.append_record(record("bob", vec![0.0, 1.0])).unwrap();

        let records = FileStore::new(&path).load_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "alice");
        assert_eq!(records[1].decode().unwrap().to_vec(), vec![0.0, 1.0]);
        assert!(!dir.path().join("nested/gallery.bin.tmp").exists());
    }

    #[test]
    fn test_failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.bin");
        // A directory in the way makes the final rename fail
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let store = FileStore::new(&path);
        let err = store
            .write_records(&[record("alice", vec![1.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(!dir.path().join("gallery.bin.tmp").exists());
        assert!(path.join("keep").exists());
    }

    #[test]
    fn test_garbage_file_is_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.bin");
        std::fs::write(&path, [0xff, 0xff, 0xff]).unwrap();

        let err = FileStore::new(&path).load_records().unwrap_err();
        assert!(matches!(err, Error::Codec { .. }));
        assert!(err.is_storage());
    }

    #[test]
    fn test_bad_blob_is_corrupt() {
        let rec = FaceRecord {
            id: "x".into(),
            name: "broken".into(),
            embedding: vec![1, 2, 3],
        };
        assert!(matches!(rec.decode(), Err(Error::Corrupt(_))));
    }
}
