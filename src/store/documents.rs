//! Whole-document storage backends.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The two documents the food log persists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Document {
    /// List of detection records.
    History,
    /// Map of date to daily summary.
    DailyLog,
}

impl Document {
    pub fn file_name(self) -> &'static str {
        match self {
            Document::History => "detection_history.json",
            Document::DailyLog => "calorie_logs.json",
        }
    }

    /// Contents written when the document does not exist yet.
    pub fn empty_contents(self) -> &'static str {
        match self {
            Document::History => "[]",
            Document::DailyLog => "{}",
        }
    }
}

/// Reads and replaces whole documents. No partial writes.
pub trait DocumentStore: Send + Sync {
    /// Returns `None` when the document does not exist.
    fn read(&self, doc: Document) -> Result<Option<String>>;

    fn write(&self, doc: Document, contents: &str) -> Result<()>;
}

/// One JSON file per document under a data directory.
#[derive(Clone, Debug)]
pub struct FsDocuments {
    root: PathBuf,
}

impl FsDocuments {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|e| anyhow!("failed to create data dir {}: {}", root.display(), e))?;
        Ok(Self { root })
    }

    pub fn path(&self, doc: Document) -> PathBuf {
        self.root.join(doc.file_name())
    }
}

impl DocumentStore for FsDocuments {
    fn read(&self, doc: Document) -> Result<Option<String>> {
        let path = self.path(doc);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow!("failed to read {}: {}", path.display(), e)),
        }
    }

    fn write(&self, doc: Document, contents: &str) -> Result<()> {
        let path = self.path(doc);
        write_atomic(&path, contents.as_bytes())
            .map_err(|e| anyhow!("failed to write {}: {}", path.display(), e))
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

/// Documents held in memory; for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryDocuments {
    docs: Mutex<HashMap<Document, String>>,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryDocuments {
    fn read(&self, doc: Document) -> Result<Option<String>> {
        let docs = self
            .docs
            .lock()
            .map_err(|_| anyhow!("document lock poisoned"))?;
        Ok(docs.get(&doc).cloned())
    }

    fn write(&self, doc: Document, contents: &str) -> Result<()> {
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| anyhow!("document lock poisoned"))?;
        docs.insert(doc, contents.to_string());
        Ok(())
    }
}
