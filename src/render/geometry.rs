// src/render/geometry.rs

//! File-backed cache of learned render geometry.
//!
//! External renderers don't always produce exactly the size they were asked
//! for (browser chrome, DPI rounding...). Finding the request that yields
//! the right output is slow, so the adjusted request is remembered per
//! requested size.
//!
//! - The file is ignored and removed once its mtime is older than the expiry.
//! - Within a process there is a single writer (the `Mutex`).
//! - Persistence writes a sibling temp file and renames it over the target,
//!   so readers never see a torn file. Two processes writing at once still
//!   race on which version wins.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn key(self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[derive(Debug)]
pub struct GeometryCache {
    path: PathBuf,
    expiry: Duration,
    /// `None` until the file has been read once.
    entries: Mutex<Option<BTreeMap<String, Geometry>>>,
}

impl GeometryCache {
    pub fn new(path: impl Into<PathBuf>, expiry: Duration) -> Self {
        Self {
            path: path.into(),
            expiry,
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adjusted geometry previously learned for `requested`, if still fresh.
    pub fn lookup(&self, requested: Geometry) -> Option<Geometry> {
        let mut guard = self.entries.lock().ok()?;
        let entries = guard.get_or_insert_with(|| self.load());
        let hit = entries.get(&requested.key()).copied();
        if let Some(adjusted) = hit {
            info!(
                requested = %requested.key(),
                adjusted = %adjusted.key(),
                "using cached geometry"
            );
        }
        hit
    }

    /// Remember `adjusted` for `requested` and persist the whole map.
    pub fn store(&self, requested: Geometry, adjusted: Geometry) -> Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("geometry cache lock poisoned"))?;
        let entries = guard.get_or_insert_with(|| self.load());
        entries.insert(requested.key(), adjusted);
        self.persist(entries)
    }

    fn load(&self) -> BTreeMap<String, Geometry> {
        match self.read_fresh() {
            Ok(Some(entries)) => entries,
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "ignoring unreadable geometry cache");
                BTreeMap::new()
            }
        }
    }

    fn read_fresh(&self) -> Result<Option<BTreeMap<String, Geometry>>> {
        let metadata = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("stat {:?}", self.path)),
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
            .unwrap_or_default();

        if age >= self.expiry {
            debug!(path = ?self.path, ?age, "geometry cache expired; removing");
            let _ = fs::remove_file(&self.path);
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {:?}", self.path))?;
        let entries = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {:?}", self.path))?;
        Ok(Some(entries))
    }

    fn persist(&self, entries: &BTreeMap<String, Geometry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating dir {:?}", parent))?;
            }
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(format!(".{}.tmp", std::process::id()));
        let tmp_path = PathBuf::from(tmp_name);

        let body = serde_json::to_vec_pretty(entries)?;
        fs::write(&tmp_path, body).with_context(|| format!("writing {:?}", tmp_path))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming {:?} to {:?}", tmp_path, self.path))?;

        debug!(path = ?self.path, entries = entries.len(), "geometry cache persisted");
        Ok(())
    }
}
