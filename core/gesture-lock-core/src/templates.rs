//! Gesture template storage and the "is this package protected" gate.
//!
//! Two pieces of state are kept per package, mirroring the persisted layout:
//!
//! - the **template library**: every saved gesture sample, keyed by package
//! - the **enrolment set**: which packages currently have a gesture assigned
//!
//! A package is protected only when it is enrolled *and* has at least
//! `min_samples` samples. Partial enrolments exist but do not gate anything.
//!
//! # Failure policy
//!
//! Adding a sample is all-or-nothing: if persisting fails, neither memory nor
//! disk changes. Removing a package's samples is **fail-open**: when the
//! template data cannot be purged, the enrolment flag is still cleared so the
//! user is never locked out of an app by a storage fault. The stale samples stay
//! in the library but no longer protect anything, trading strictness for
//! availability.
//!
//! Read paths fail open as well: if the store's lock is poisoned, a package is
//! reported as having no samples and therefore unprotected.
//!
//! Other processes may rewrite the backing files. [`TemplateStore::refresh`]
//! compares the backend's [`StoreStamp`] and reloads when it moved.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use fs_err as fs;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{LockError, Result};
use crate::storage::{read_json, write_json_atomic};
use crate::types::GestureSample;

pub type TemplateLibrary = BTreeMap<String, Vec<GestureSample>>;

const FILE_VERSION: u32 = 1;

/// Modification time and length of each backing file; `None` for a missing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStamp(Vec<Option<(SystemTime, u64)>>);

/// Persistence for the template library and enrolment set.
pub trait TemplateBackend: Send + Sync {
    fn load_library(&self) -> Result<TemplateLibrary>;
    fn save_library(&self, library: &TemplateLibrary) -> Result<()>;
    fn load_enrolled(&self) -> Result<BTreeSet<String>>;
    fn save_enrolled(&self, enrolled: &BTreeSet<String>) -> Result<()>;

    /// Changes whenever the persisted data may have changed. Backends that
    /// cannot be written by anyone else return `None` and are never reloaded.
    fn stamp(&self) -> Option<StoreStamp> {
        None
    }
}

/// Backend that keeps everything in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    library: Mutex<TemplateLibrary>,
    enrolled: Mutex<BTreeSet<String>>,
}

impl TemplateBackend for MemoryBackend {
    fn load_library(&self) -> Result<TemplateLibrary> {
        Ok(self
            .library
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_library(&self, library: &TemplateLibrary) -> Result<()> {
        *self.library.lock().unwrap_or_else(PoisonError::into_inner) = library.clone();
        Ok(())
    }

    fn load_enrolled(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .enrolled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_enrolled(&self, enrolled: &BTreeSet<String>) -> Result<()> {
        *self.enrolled.lock().unwrap_or_else(PoisonError::into_inner) = enrolled.clone();
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LibraryFile {
    version: u32,
    templates: TemplateLibrary,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnrolledFile {
    version: u32,
    packages: BTreeSet<String>,
}

/// JSON files on disk, written atomically via temp file + rename.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    templates_path: PathBuf,
    enrolled_path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(templates_path: PathBuf, enrolled_path: PathBuf) -> Self {
        Self {
            templates_path,
            enrolled_path,
        }
    }
}

fn file_stamp(path: &Path) -> Option<(SystemTime, u64)> {
    let metadata = fs::metadata(path).ok()?;
    Some((metadata.modified().ok()?, metadata.len()))
}

impl TemplateBackend for JsonFileBackend {
    fn load_library(&self) -> Result<TemplateLibrary> {
        Ok(read_json::<LibraryFile>(&self.templates_path)?
            .map(|file| file.templates)
            .unwrap_or_default())
    }

    fn save_library(&self, library: &TemplateLibrary) -> Result<()> {
        write_json_atomic(
            &self.templates_path,
            &LibraryFile {
                version: FILE_VERSION,
                templates: library.clone(),
            },
        )
    }

    fn load_enrolled(&self) -> Result<BTreeSet<String>> {
        Ok(read_json::<EnrolledFile>(&self.enrolled_path)?
            .map(|file| file.packages)
            .unwrap_or_default())
    }

    fn save_enrolled(&self, enrolled: &BTreeSet<String>) -> Result<()> {
        write_json_atomic(
            &self.enrolled_path,
            &EnrolledFile {
                version: FILE_VERSION,
                packages: enrolled.clone(),
            },
        )
    }

    fn stamp(&self) -> Option<StoreStamp> {
        Some(StoreStamp(vec![
            file_stamp(&self.templates_path),
            file_stamp(&self.enrolled_path),
        ]))
    }
}

/// How far a package is from being protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentProgress {
    pub samples: usize,
    pub required: usize,
    pub remaining: usize,
}

impl EnrollmentProgress {
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

#[derive(Debug, Default)]
struct TemplateState {
    library: TemplateLibrary,
    enrolled: BTreeSet<String>,
    /// Backend stamp as of the last load or write made through this store.
    stamp: Option<StoreStamp>,
}

impl TemplateState {
    fn is_protected(&self, package: &str, min_samples: usize) -> bool {
        self.enrolled.contains(package)
            && self.library.get(package).map(Vec::len).unwrap_or(0) >= min_samples
    }
}

pub struct TemplateStore {
    backend: Box<dyn TemplateBackend>,
    min_samples: usize,
    state: Mutex<TemplateState>,
}

impl TemplateStore {
    pub fn open(backend: Box<dyn TemplateBackend>, min_samples: usize) -> Result<Self> {
        // Taken first so a write racing the load is picked up by the next refresh.
        let stamp = backend.stamp();
        let library = backend.load_library()?;
        let enrolled = backend.load_enrolled()?;
        debug!(
            packages = library.len(),
            enrolled = enrolled.len(),
            "Template store opened"
        );
        Ok(Self {
            backend,
            min_samples,
            state: Mutex::new(TemplateState {
                library,
                enrolled,
                stamp,
            }),
        })
    }

    pub fn in_memory(min_samples: usize) -> Self {
        Self {
            backend: Box::<MemoryBackend>::default(),
            min_samples,
            state: Mutex::new(TemplateState::default()),
        }
    }

    /// Appends a sample for `package` and returns the new sample count.
    pub fn add_template(&self, package: &str, sample: GestureSample) -> Result<usize> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| LockError::Poisoned("template store"))?;

        let mut library = state.library.clone();
        library
            .entry(package.to_string())
            .or_default()
            .push(sample);
        let count = library.get(package).map(Vec::len).unwrap_or(0);

        self.backend
            .save_library(&library)
            .map_err(|err| storage_error(package, err))?;

        let mut enrolled = state.enrolled.clone();
        enrolled.insert(package.to_string());
        if let Err(err) = self.backend.save_enrolled(&enrolled) {
            if let Err(rollback) = self.backend.save_library(&state.library) {
                warn!(
                    package = %package,
                    error = %rollback,
                    "Failed to roll back template library after enrolment write failed"
                );
            }
            return Err(storage_error(package, err));
        }

        state.library = library;
        state.enrolled = enrolled;
        state.stamp = self.backend.stamp();
        info!(package = %package, samples = count, "Gesture sample saved");
        Ok(count)
    }

    /// Removes every sample for `package` and un-enrols it.
    ///
    /// Returns an error when the template data could not be purged. The
    /// enrolment flag is cleared either way (fail-open, see module docs).
    pub fn remove_all_templates(&self, package: &str) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| LockError::Poisoned("template store"))?;

        let mut library = state.library.clone();
        library.remove(package);
        let purge = self.backend.save_library(&library);
        if purge.is_ok() {
            state.library = library;
        }

        state.enrolled.remove(package);
        if let Err(err) = self.backend.save_enrolled(&state.enrolled) {
            warn!(
                package = %package,
                error = %err,
                "Failed to persist enrolment removal; cleared in memory only"
            );
        }
        state.stamp = self.backend.stamp();

        match purge {
            Ok(()) => {
                info!(package = %package, "All gesture samples removed");
                Ok(())
            }
            Err(err) => {
                warn!(
                    package = %package,
                    error = %err,
                    "Template purge failed; protection removed anyway"
                );
                Err(storage_error(package, err))
            }
        }
    }

    pub fn sample_count(&self, package: &str) -> usize {
        match self.state.lock() {
            Ok(state) => state.library.get(package).map(Vec::len).unwrap_or(0),
            Err(_) => {
                warn!(package = %package, "Template store poisoned; treating as unprotected");
                0
            }
        }
    }

    pub fn is_enrolled(&self, package: &str) -> bool {
        match self.state.lock() {
            Ok(state) => state.enrolled.contains(package),
            Err(_) => false,
        }
    }

    pub fn is_protected(&self, package: &str) -> bool {
        match self.state.lock() {
            Ok(state) => state.is_protected(package, self.min_samples),
            Err(_) => false,
        }
    }

    pub fn has_any_templates(&self) -> bool {
        match self.state.lock() {
            Ok(state) => state.library.values().any(|samples| !samples.is_empty()),
            Err(_) => false,
        }
    }

    /// Packages that currently gate foreground access, sorted.
    pub fn protected_packages(&self) -> Vec<String> {
        match self.state.lock() {
            Ok(state) => state
                .enrolled
                .iter()
                .filter(|package| state.is_protected(package, self.min_samples))
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Reloads from the backend if someone else changed it since the last load
    /// or write. Returns whether a reload happened. On error the previous data
    /// stays in place and the next call tries again.
    pub fn refresh(&self) -> Result<bool> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| LockError::Poisoned("template store"))?;

        let stamp = self.backend.stamp();
        if stamp.is_none() || stamp == state.stamp {
            return Ok(false);
        }

        let library = self.backend.load_library()?;
        let enrolled = self.backend.load_enrolled()?;
        info!(
            packages = library.len(),
            enrolled = enrolled.len(),
            "Template store changed on disk; reloaded"
        );
        state.library = library;
        state.enrolled = enrolled;
        state.stamp = stamp;
        Ok(true)
    }

    pub fn enrollment_progress(&self, package: &str) -> EnrollmentProgress {
        let samples = self.sample_count(package);
        EnrollmentProgress {
            samples,
            required: self.min_samples,
            remaining: self.min_samples.saturating_sub(samples),
        }
    }

    /// Runs `f` against the current library without cloning it.
    pub fn with_library<R>(&self, f: impl FnOnce(&TemplateLibrary) -> R) -> R {
        match self.state.lock() {
            Ok(state) => f(&state.library),
            Err(_) => f(&TemplateLibrary::new()),
        }
    }
}

fn storage_error(package: &str, err: LockError) -> LockError {
    LockError::TemplateStorage {
        package: package.to_string(),
        details: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn sample(offset: f64) -> GestureSample {
        GestureSample::new(vec![vec![
            Point::new(offset, 0.0),
            Point::new(offset + 10.0, 10.0),
            Point::new(offset + 20.0, 0.0),
        ]])
        .expect("sample")
    }

    /// Memory backend whose library writes can be switched off.
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        fail_library_saves: Arc<AtomicBool>,
        fail_enrolled_saves: Arc<AtomicBool>,
    }

    impl TemplateBackend for FlakyBackend {
        fn load_library(&self) -> Result<TemplateLibrary> {
            self.inner.load_library()
        }

        fn save_library(&self, library: &TemplateLibrary) -> Result<()> {
            if self.fail_library_saves.load(Ordering::SeqCst) {
                return Err(LockError::Io {
                    context: "disk full".to_string(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.inner.save_library(library)
        }

        fn load_enrolled(&self) -> Result<BTreeSet<String>> {
            self.inner.load_enrolled()
        }

        fn save_enrolled(&self, enrolled: &BTreeSet<String>) -> Result<()> {
            if self.fail_enrolled_saves.load(Ordering::SeqCst) {
                return Err(LockError::Io {
                    context: "read-only".to_string(),
                    source: std::io::Error::other("read-only"),
                });
            }
            self.inner.save_enrolled(enrolled)
        }
    }

    #[test]
    fn package_is_protected_only_at_min_samples() {
        let store = TemplateStore::in_memory(3);
        store.add_template("bank", sample(0.0)).expect("add 1");
        store.add_template("bank", sample(1.0)).expect("add 2");
        assert_eq!(store.sample_count("bank"), 2);
        assert!(!store.is_protected("bank"));

        let count = store.add_template("bank", sample(2.0)).expect("add 3");
        assert_eq!(count, 3);
        assert!(store.is_protected("bank"));
        assert_eq!(store.protected_packages(), vec!["bank".to_string()]);
    }

    #[test]
    fn enrollment_progress_counts_down_to_zero() {
        let store = TemplateStore::in_memory(3);
        store.add_template("bank", sample(0.0)).expect("add");
        let progress = store.enrollment_progress("bank");
        assert_eq!(progress.samples, 1);
        assert_eq!(progress.remaining, 2);
        assert!(!progress.is_complete());

        for i in 0..3 {
            store.add_template("bank", sample(i as f64)).expect("add");
        }
        let progress = store.enrollment_progress("bank");
        assert_eq!(progress.remaining, 0);
        assert!(progress.is_complete());
    }

    #[test]
    fn failed_add_leaves_previous_templates_intact() {
        let backend = FlakyBackend::default();
        let fail = Arc::clone(&backend.fail_library_saves);
        let store = TemplateStore::open(Box::new(backend), 3).expect("open");

        store.add_template("bank", sample(0.0)).expect("add");
        fail.store(true, Ordering::SeqCst);
        let err = store.add_template("bank", sample(1.0)).expect_err("save fails");

        assert!(matches!(err, LockError::TemplateStorage { .. }));
        assert_eq!(store.sample_count("bank"), 1);
    }

    #[test]
    fn failed_enrolment_write_rolls_back_library() {
        let backend = FlakyBackend::default();
        let fail = Arc::clone(&backend.fail_enrolled_saves);
        let store = TemplateStore::open(Box::new(backend), 1).expect("open");

        fail.store(true, Ordering::SeqCst);
        assert!(store.add_template("bank", sample(0.0)).is_err());
        assert_eq!(store.sample_count("bank"), 0);
        assert!(!store.is_enrolled("bank"));
        assert!(!store.has_any_templates());
    }

    // Documented fail-open policy: a storage fault during removal must not
    // leave the package protected.
    #[test]
    fn removal_failure_still_unprotects_package() {
        let backend = FlakyBackend::default();
        let fail = Arc::clone(&backend.fail_library_saves);
        let store = TemplateStore::open(Box::new(backend), 3).expect("open");
        for i in 0..3 {
            store.add_template("bank", sample(i as f64)).expect("add");
        }
        assert!(store.is_protected("bank"));

        fail.store(true, Ordering::SeqCst);
        let result = store.remove_all_templates("bank");

        assert!(result.is_err());
        assert!(!store.is_protected("bank"));
        // Template data survives; only the mapping was cleared.
        assert_eq!(store.sample_count("bank"), 3);
    }

    #[test]
    fn removal_purges_samples() {
        let store = TemplateStore::in_memory(3);
        for i in 0..3 {
            store.add_template("bank", sample(i as f64)).expect("add");
        }
        store.remove_all_templates("bank").expect("remove");
        assert_eq!(store.sample_count("bank"), 0);
        assert!(!store.has_any_templates());
    }

    #[test]
    fn json_backend_persists_across_reopen() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let backend = JsonFileBackend::new(
            temp_dir.path().join("gestures.json"),
            temp_dir.path().join("enrolled.json"),
        );

        let store = TemplateStore::open(Box::new(backend.clone()), 2).expect("open");
        store.add_template("bank", sample(0.0)).expect("add");
        store.add_template("bank", sample(5.0)).expect("add");
        drop(store);

        let reopened = TemplateStore::open(Box::new(backend), 2).expect("reopen");
        assert_eq!(reopened.sample_count("bank"), 2);
        assert!(reopened.is_protected("bank"));
    }

    #[test]
    fn refresh_picks_up_changes_from_another_store() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let backend = JsonFileBackend::new(
            temp_dir.path().join("gestures.json"),
            temp_dir.path().join("enrolled.json"),
        );
        let writer = TemplateStore::open(Box::new(backend.clone()), 2).expect("open writer");
        writer.add_template("bank", sample(0.0)).expect("add");
        writer.add_template("bank", sample(1.0)).expect("add");

        let reader = TemplateStore::open(Box::new(backend), 2).expect("open reader");
        assert!(reader.is_protected("bank"));
        assert!(!reader.refresh().expect("unchanged"));

        writer.remove_all_templates("bank").expect("remove");
        assert!(reader.refresh().expect("changed"));
        assert!(!reader.is_protected("bank"));
        assert!(!reader.refresh().expect("settled"));
    }

    #[test]
    fn own_writes_do_not_trigger_reload() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let backend = JsonFileBackend::new(
            temp_dir.path().join("gestures.json"),
            temp_dir.path().join("enrolled.json"),
        );
        let store = TemplateStore::open(Box::new(backend), 1).expect("open");
        store.add_template("bank", sample(0.0)).expect("add");
        assert!(!store.refresh().expect("refresh"));
    }

    #[test]
    fn memory_backend_never_reloads() {
        let store = TemplateStore::in_memory(1);
        store.add_template("bank", sample(0.0)).expect("add");
        assert!(!store.refresh().expect("refresh"));
        assert!(store.is_protected("bank"));
    }

    #[test]
    fn json_backend_rejects_invalid_stored_sample() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let templates_path = temp_dir.path().join("gestures.json");
        fs::write(
            &templates_path,
            r#"{"version":1,"templates":{"bank":[{"strokes":[[]]}]}}"#,
        )
        .expect("write library");
        let backend = JsonFileBackend::new(templates_path, temp_dir.path().join("enrolled.json"));

        let err = TemplateStore::open(Box::new(backend), 1).err().expect("invalid sample");
        assert!(matches!(err, LockError::Json { .. }));
    }

    #[test]
    fn json_backend_treats_empty_file_as_absent() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let templates_path = temp_dir.path().join("gestures.json");
        fs::write(&templates_path, "  \n").expect("write empty");
        let backend = JsonFileBackend::new(templates_path, temp_dir.path().join("enrolled.json"));

        let store = TemplateStore::open(Box::new(backend), 3).expect("open");
        assert!(!store.has_any_templates());
    }

    #[test]
    fn json_backend_reports_corrupt_library() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let templates_path = temp_dir.path().join("gestures.json");
        fs::write(&templates_path, "{not json").expect("write corrupt");
        let backend = JsonFileBackend::new(templates_path, temp_dir.path().join("enrolled.json"));

        let err = TemplateStore::open(Box::new(backend), 3).err().expect("corrupt");
        assert!(matches!(err, LockError::Json { .. }));
    }
}
