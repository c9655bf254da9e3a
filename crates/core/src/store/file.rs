use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;

use super::Store;
use crate::Error;

/// A store keeping every slot in one JSON object file.
///
/// Each update rewrites the file through a temporary sibling and a rename,
/// so a crash mid-write leaves the previous state in place.
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Creates a store backed by `path`. The file and its parent directories
    /// are created on the first write.
    #[inline]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_slots(&self) -> Result<Map<String, Value>, Error> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == IoErrorKind::NotFound => {
                return Ok(Map::new());
            }
            Err(source) => {
                return Err(Error::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&content)? {
            Value::Object(slots) => Ok(slots),
            _ => Err(Error::Corrupted(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
        }
    }

    async fn write_slots(&self, slots: &Map<String, Value>) -> Result<(), Error> {
        let io_err = |source| Error::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let content = serde_json::to_vec_pretty(slots)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content).await.map_err(io_err)?;
        fs::rename(&tmp_path, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        let mut slots = self.read_slots().await?;
        Ok(slots.remove(key))
    }

    async fn update(&self, key: &str, value: Value) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let mut slots = self.read_slots().await?;
        slots.insert(key.to_owned(), value);
        self.write_slots(&slots).await?;
        trace!("wrote slot {key} to {}", self.path.display());
        Ok(())
    }
}
