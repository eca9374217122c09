// ai
//! 📂 File Source: "It's just a file", said no sysadmin ever before the disk filled up.
//!
//! Development mode. Instead of waiting for a bucket notification, point the loader
//! at a gzipped export sitting on local disk. Same reader contract as S3, different
//! origin story. The bucket half of the location is ignored; the key is the path,
//! optionally resolved under a root directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::File;
use tracing::debug;

use crate::backends::{ObjectReader, ObjectSource, SourceObject};
use crate::event::ObjectLocation;

#[derive(Debug, Clone, Default)]
pub struct FileSource {
    root: Option<PathBuf>,
}

impl FileSource {
    /// 🏗️ `root = None` means keys are used as paths as-is (relative to cwd, or absolute).
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(key),
            None => Path::new(key).to_path_buf(),
        }
    }
}

#[async_trait]
impl ObjectSource for FileSource {
    async fn open(&self, location: &ObjectLocation) -> Result<SourceObject> {
        let the_path = self.resolve(&location.key);
        // -- 💀 the door is locked, or missing, or the filesystem lied to you
        let the_file = File::open(&the_path).await.with_context(|| {
            format!(
                "💀 The door to '{}' would not budge. It might not exist. Permissions might be wrong. \
                 Relative paths are resolved against the current directory, which is rarely the one you think.",
                the_path.display()
            )
        })?;

        // 📏 metadata failing is survivable: the report falls back to bytes read
        let the_size = the_file.metadata().await.map(|m| m.len()).ok();
        debug!("📂 opened {} ({:?} bytes)", the_path.display(), the_size);

        let the_reader: ObjectReader = Box::new(the_file);
        Ok(SourceObject {
            reader: the_reader,
            content_length: the_size,
            label: the_path.display().to_string(),
        })
    }
}
