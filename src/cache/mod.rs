//! Durable record of processed illustrations and the cached API credential.
//!
//! The cache is a single JSON file, parsed fully into memory at load and
//! rewritten in full after every mutation. Mutation happens only through
//! [`CacheStore::mark_seen`] and [`CacheStore::set_credential`], each of
//! which persists synchronously before returning; a crash therefore leaves
//! the file at the state of the last completed mutation.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app::Result;
use crate::domain::Credential;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheRecord {
    seen_ids: BTreeSet<u64>,
    credential: Option<Credential>,
}

pub struct CacheStore {
    path: PathBuf,
    record: CacheRecord,
}

impl CacheStore {
    /// Load the cache from `path`. A missing file is an empty cache.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let record = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheRecord::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self { path, record })
    }

    pub fn is_seen(&self, id: u64) -> bool {
        self.record.seen_ids.contains(&id)
    }

    pub fn seen_count(&self) -> usize {
        self.record.seen_ids.len()
    }

    /// Record `id` as delivered and persist.
    pub fn mark_seen(&mut self, id: u64) -> Result<()> {
        self.record.seen_ids.insert(id);
        self.persist()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.record.credential.as_ref()
    }

    /// Replace the cached credential and persist.
    pub fn set_credential(&mut self, credential: Credential) -> Result<()> {
        self.record.credential = Some(credential);
        self.persist()
    }

    /// Rewrite the whole file. Write-then-rename keeps a reader (or a crash
    /// mid-write) from ever observing a partial file.
    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string(&self.record)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;

        Ok(())
    }
}
