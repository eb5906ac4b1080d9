use crate::config::Config;
use crate::error::Result;
use crate::io::ensure_dir;
use crate::lock::FileLock;
use crate::paths;
use crate::signed::SignedStore;
use crate::state::{Section, StateDocument};
use std::path::{Path, PathBuf};

/// Typed wrapper around the signed state file.
///
/// Every read-modify-write runs under the cross-process file lock, so
/// overlapping hook invocations serialize their mutations and the net effect
/// of N concurrent updates is some serial order of those N updates.
pub struct StateStore {
    state_path: PathBuf,
    signed: SignedStore,
    lock: FileLock,
}

impl StateStore {
    pub fn open(root: &Path, config: &Config) -> Result<Self> {
        ensure_dir(&paths::warden_dir(root))?;
        Ok(Self {
            state_path: paths::state_path(root),
            signed: SignedStore::open(root)?,
            lock: FileLock::new(
                paths::lock_path(root),
                config.lock.wait_ms,
                config.lock.poll_ms,
            ),
        })
    }

    /// Current document, fully defaults-populated. A missing, corrupt, or
    /// tampered state file reads as "no prior state" — never an error.
    pub fn load(&self) -> StateDocument {
        self.signed.read(&self.state_path).unwrap_or_default()
    }

    /// Locked read-modify-write. Returns the document as persisted.
    pub fn update<F>(&self, f: F) -> Result<StateDocument>
    where
        F: FnOnce(&mut StateDocument),
    {
        let _guard = self.lock.acquire();
        let mut doc = self.load();
        f(&mut doc);
        self.signed.write(&self.state_path, &doc)?;
        Ok(doc)
    }

    /// Restore one section to schema defaults.
    pub fn reset(&self, section: Section) -> Result<StateDocument> {
        self.update(|doc| doc.reset_section(section))
    }

    /// Reset every section except the listed ones. Used at session start to
    /// clear transient state while preserving durable sections — notably the
    /// circuit breaker, which must survive a session restart (a new session
    /// must not be an escape hatch from a tripped breaker).
    pub fn reset_except(&self, keep: &[Section]) -> Result<StateDocument> {
        self.update(|doc| {
            for &section in Section::all() {
                if !keep.contains(&section) {
                    doc.reset_section(section);
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> StateStore {
        StateStore::open(dir.path(), &Config::default()).unwrap()
    }

    #[test]
    fn load_without_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert_eq!(store.load(), StateDocument::default());
    }

    #[test]
    fn update_persists() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .update(|doc| doc.edits.record_edit("src/lib.rs"))
            .unwrap();

        let reopened = open_store(&dir);
        let doc = reopened.load();
        assert_eq!(doc.edits.count, 1);
        assert!(doc.edits.unique_files.contains("src/lib.rs"));
    }

    #[test]
    fn sequential_updates_accumulate() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        for _ in 0..5 {
            store.update(|doc| doc.edits.count += 1).unwrap();
        }
        assert_eq!(store.load().edits.count, 5);
    }

    #[test]
    fn concurrent_updates_lose_nothing() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        // Bootstrap the secret before spawning so all threads share a key.
        open_store(&dir);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let root = root.clone();
                std::thread::spawn(move || {
                    let store = StateStore::open(&root, &Config::default()).unwrap();
                    for _ in 0..10 {
                        store.update(|doc| doc.edits.count += 1).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let store = open_store(&dir);
        assert_eq!(store.load().edits.count, 80);
    }

    #[test]
    fn tampered_file_reads_as_defaults() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.update(|doc| doc.breaker.failures = 2).unwrap();

        let path = paths::state_path(dir.path());
        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, raw.replace("\"failures\": 2", "\"failures\": 0")).unwrap();

        assert_eq!(store.load(), StateDocument::default());
    }

    #[test]
    fn reset_except_preserves_breaker() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .update(|doc| {
                for _ in 0..3 {
                    doc.breaker.record_failure("UNKNOWN", "boom", 3);
                }
                doc.research.mark_complete("docs");
                doc.edits.record_edit("src/lib.rs");
                doc.overrides.safe_mode = true;
            })
            .unwrap();

        let doc = store.reset_except(&[Section::Breaker]).unwrap();
        assert!(doc.breaker.tripped);
        assert!(doc.research.categories.is_empty());
        assert_eq!(doc.edits.count, 0);
        assert!(!doc.overrides.safe_mode);
    }

    #[test]
    fn reset_one_section_only() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .update(|doc| {
                doc.breaker.failures = 2;
                doc.edits.record_edit("a.rs");
            })
            .unwrap();

        let doc = store.reset(Section::Breaker).unwrap();
        assert_eq!(doc.breaker.failures, 0);
        assert_eq!(doc.edits.count, 1);
    }
}
