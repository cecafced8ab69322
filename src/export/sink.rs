//! Attachment sinks: where extracted attachment bytes end up.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// Where a saved attachment ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedAttachment {
    /// Final name, after any collision suffix was applied.
    pub name: String,
    /// Human-readable location (a path for the directory sink).
    pub location: String,
    pub size: u64,
}

/// Persistent storage for attachment bytes.
///
/// Callers pass names that are already unique (timestamp prefixed); a sink
/// must still never overwrite an existing entry.
pub trait AttachmentSink: Send {
    fn save(&mut self, name: &str, data: &[u8]) -> Result<SavedAttachment>;
}

/// Writes attachments as files in one directory.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Open the sink, creating `dir` if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| SyncError::io(&dir, e))?;
            tracing::info!(dir = %dir.display(), "Created attachments directory");
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl AttachmentSink for DirectorySink {
    fn save(&mut self, name: &str, data: &[u8]) -> Result<SavedAttachment> {
        let path = unique_path(&self.dir.join(name));
        let final_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());

        // The final name only ever holds complete files.
        let temp_path = self.dir.join(format!(".{final_name}.tmp"));
        fs::write(&temp_path, data).map_err(|e| SyncError::io(&temp_path, e))?;
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(SyncError::io(&path, e));
        }

        Ok(SavedAttachment {
            name: final_name,
            location: path.display().to_string(),
            size: data.len() as u64,
        })
    }
}

/// If `path` already exists, append a counter to make it unique.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or(Path::new("."));

    for i in 1..1000 {
        let candidate = if ext.is_empty() {
            parent.join(format!("{stem}_{i}"))
        } else {
            parent.join(format!("{stem}_{i}.{ext}"))
        };
        if !candidate.exists() {
            return candidate;
        }
    }

    parent.join(format!("{stem}_dup.{ext}"))
}

/// Keeps attachments in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub saved: Vec<(String, Vec<u8>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<&str> {
        self.saved.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl AttachmentSink for MemorySink {
    fn save(&mut self, name: &str, data: &[u8]) -> Result<SavedAttachment> {
        self.saved.push((name.to_string(), data.to_vec()));
        Ok(SavedAttachment {
            name: name.to_string(),
            location: format!("memory:{name}"),
            size: data.len() as u64,
        })
    }
}
