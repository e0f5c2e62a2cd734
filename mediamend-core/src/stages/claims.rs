//! Destinations reserved by items that are still in flight.
//!
//! Workers pick library and trash paths independently, so a path is only
//! handed out under this lock. A claim lives until its owner reaches a
//! terminal state; after that the file on disk speaks for itself.

use crate::utils::unique_destination;

use log::debug;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// How a successful [`DestinationClaims::claim`] came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Nobody held the path before.
    Fresh,
    /// The owner already held it, from an earlier attempt.
    Held,
}

/// Shared path reservations, keyed by path, valued by owning item id.
#[derive(Debug, Default)]
pub struct DestinationClaims {
    owners: Mutex<HashMap<PathBuf, String>>,
}

impl DestinationClaims {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, String>> {
        self.owners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserves `path` for `owner`. Fails with the current holder when
    /// another item has it.
    pub fn claim(&self, path: &Path, owner: &str) -> Result<Claim, String> {
        let mut owners = self.lock();
        match owners.get(path) {
            Some(holder) if holder == owner => Ok(Claim::Held),
            Some(holder) => Err(holder.clone()),
            None => {
                owners.insert(path.to_path_buf(), owner.to_string());
                Ok(Claim::Fresh)
            }
        }
    }

    /// Reserves the first variant of `file_name` in `dir` that neither exists
    /// nor is claimed (`name`, `name_1`, ...).
    pub fn claim_unique(&self, dir: &Path, file_name: &Path, owner: &str) -> PathBuf {
        let mut owners = self.lock();
        let path = unique_destination(dir, file_name, |candidate| owners.contains_key(candidate));
        owners.insert(path.clone(), owner.to_string());
        path
    }

    pub fn release(&self, path: &Path, owner: &str) {
        let mut owners = self.lock();
        if owners.get(path).is_some_and(|holder| holder == owner) {
            owners.remove(path);
        }
    }

    /// Drops every claim of `owner`.
    pub fn release_all(&self, owner: &str) {
        let mut owners = self.lock();
        let before = owners.len();
        owners.retain(|_, holder| holder != owner);
        let released = before - owners.len();
        if released > 0 {
            debug!("Released {} destination(s) of {}", released, owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn second_owner_is_refused_until_release() {
        let claims = DestinationClaims::new();
        let path = Path::new("/lib/Movies/Heat (1995).mkv");

        assert_eq!(claims.claim(path, "a"), Ok(Claim::Fresh));
        assert_eq!(claims.claim(path, "a"), Ok(Claim::Held));
        assert_eq!(claims.claim(path, "b"), Err("a".to_string()));

        claims.release(path, "b");
        assert_eq!(claims.claim(path, "b"), Err("a".to_string()));
        claims.release_all("a");
        assert_eq!(claims.claim(path, "b"), Ok(Claim::Fresh));
    }

    #[test]
    fn concurrent_unique_claims_never_share_a_name() {
        let dir = tempfile::tempdir().unwrap();
        let claims = Arc::new(DestinationClaims::new());

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let claims = Arc::clone(&claims);
                let dir = dir.path().to_path_buf();
                thread::spawn(move || {
                    claims.claim_unique(&dir, Path::new("Heat.1995.mkv"), &format!("item-{}", n))
                })
            })
            .collect();
        let mut paths: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);
        assert!(paths.contains(&dir.path().join("Heat.1995.mkv")));
    }
}
