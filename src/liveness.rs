// src/liveness.rs

//! Liveness marker: a file whose mtime is refreshed by every cycle that
//! produced something worth showing.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::errors::Result;

/// Result of comparing the marker's age against the refresh interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy { age: Duration },
    Stale { age: Duration },
    Missing,
}

impl Health {
    pub fn is_healthy(self) -> bool {
        matches!(self, Health::Healthy { .. })
    }
}

/// Create the file (and its parent directories) if needed and set its mtime
/// to now.
pub fn touch(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.set_modified(SystemTime::now())?;

    debug!(path = ?path, "liveness marker touched");
    Ok(())
}

/// Healthy iff the file exists and was modified less than `max_age` ago.
pub fn check(path: &Path, max_age: Duration) -> Health {
    let Ok(mtime) = fs::metadata(path).and_then(|m| m.modified()) else {
        return Health::Missing;
    };

    // A marker from the future (clock step) counts as fresh.
    let age = SystemTime::now()
        .duration_since(mtime)
        .unwrap_or_default();

    if age < max_age {
        Health::Healthy { age }
    } else {
        Health::Stale { age }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_creates_parents_and_check_sees_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("healthz");

        assert_eq!(check(&path, Duration::from_secs(60)), Health::Missing);
        touch(&path).unwrap();
        assert!(check(&path, Duration::from_secs(60)).is_healthy());
    }

    #[test]
    fn old_marker_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("healthz");
        touch(&path).unwrap();

        let file = OpenOptions::new().append(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(600))
            .unwrap();

        assert!(matches!(
            check(&path, Duration::from_secs(60)),
            Health::Stale { .. }
        ));
    }

    #[test]
    fn touch_refreshes_an_existing_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("healthz");
        fs::write(&path, b"").unwrap();
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(600))
            .unwrap();

        touch(&path).unwrap();
        assert!(check(&path, Duration::from_secs(60)).is_healthy());
    }
}
