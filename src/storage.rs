use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One enrolled reference face.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceRecord {
    pub id: String,
    pub name: String,
    pub embedding: Vec<f32>,
}

impl FaceRecord {
    pub fn new(name: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            embedding,
        }
    }
}

/// postcard-encoded gallery of enrolled faces under one directory.
#[derive(Debug, Clone)]
pub struct FaceStore {
    dir: PathBuf,
}

impl FaceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self) -> PathBuf {
        self.dir.join("faces.bin")
    }

    pub fn load(&self) -> Result<Vec<FaceRecord>> {
        let file = self.file();
        if !file.exists() {
            return Ok(vec![]);
        }

        let data = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
        postcard::from_bytes(&data).with_context(|| format!("decoding {}", file.display()))
    }

    pub fn save(&self, record: FaceRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let mut records = self.load()?;
        records.push(record);
        let file = self.file();
        let data = postcard::to_allocvec(&records)?;
        std::fs::write(&file, data).with_context(|| format!("writing {}", file.display()))?;
        Ok(())
    }

    /// Remove the gallery file. The directory goes too, but only once empty.
    pub fn purge(&self) -> Result<()> {
        let file = self.file();
        match std::fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("removing {}", file.display())),
        }
        if let Err(e) = std::fs::remove_dir(&self.dir) {
            log::debug!("keeping {}: {}", self.dir.display(), e);
        }
        Ok(())
    }
}
