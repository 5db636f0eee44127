// src/session.rs

use crate::aggregate::ResultSet;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Identity of a batch of input files: names and sizes, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSet {
    files: Vec<(PathBuf, u64)>,
    fingerprint: String,
}

impl InputSet {
    /// Stat every path. A file that cannot be read counts with size 0,
    /// so it still shows up in the identity and later fails extraction.
    pub fn from_paths(paths: &[PathBuf]) -> Self {
        let files = paths
            .iter()
            .map(|p| (p.clone(), fs::metadata(p).map(|m| m.len()).unwrap_or(0)))
            .collect();
        Self::from_entries(files)
    }

    pub fn from_entries(files: Vec<(PathBuf, u64)>) -> Self {
        let fingerprint = Self::generate_fingerprint(&files);
        Self { files, fingerprint }
    }

    /// SHA-256 over each file name and size.
    fn generate_fingerprint(files: &[(PathBuf, u64)]) -> String {
        let mut hasher = Sha256::new();
        for (path, size) in files {
            hasher.update(display_name(path).as_bytes());
            hasher.update([0u8]);
            hasher.update(size.to_le_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// The file name a record is reported under.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Remembers the last processed input set so an unchanged set is not
/// sent through extraction and the model again.
#[derive(Debug, Default)]
pub struct ProcessingContext {
    last: Option<(String, ResultSet)>,
    saved: bool,
}

impl ProcessingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when there are no results yet or the set differs from the last one.
    pub fn needs_processing(&self, inputs: &InputSet) -> bool {
        match &self.last {
            Some((fingerprint, _)) => fingerprint != inputs.fingerprint(),
            None => true,
        }
    }

    pub fn record(&mut self, inputs: &InputSet, results: ResultSet) {
        self.last = Some((inputs.fingerprint().to_string(), results));
        self.saved = false;
    }

    pub fn results(&self) -> Option<&ResultSet> {
        self.last.as_ref().map(|(_, results)| results)
    }

    /// Results recorded but not yet written out.
    pub fn unsaved_results(&self) -> Option<&ResultSet> {
        self.results().filter(|_| !self.saved)
    }

    pub fn mark_saved(&mut self) {
        self.saved = true;
    }

    pub fn clear(&mut self) {
        self.last = None;
        self.saved = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::BillRecord;

    fn set(entries: &[(&str, u64)]) -> InputSet {
        InputSet::from_entries(
            entries
                .iter()
                .map(|(name, size)| (PathBuf::from(name), *size))
                .collect(),
        )
    }

    #[test]
    fn test_fingerprint_generation() {
        let a = set(&[("bills/jan.pdf", 1000), ("bills/feb.pdf", 2000)]);
        let b = set(&[("other/jan.pdf", 1000), ("other/feb.pdf", 2000)]);
        let c = set(&[("bills/jan.pdf", 1001), ("bills/feb.pdf", 2000)]);
        let d = set(&[("bills/feb.pdf", 2000), ("bills/jan.pdf", 1000)]);

        assert_eq!(a.fingerprint(), b.fingerprint()); // names + sizes only
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_ne!(a.fingerprint(), d.fingerprint()); // order matters
    }

    #[test]
    fn test_unchanged_set_is_skipped() {
        let inputs = set(&[("jan.pdf", 10), ("feb.pdf", 20)]);
        let mut ctx = ProcessingContext::new();
        assert!(ctx.needs_processing(&inputs));

        let mut results = ResultSet::new();
        results.push(BillRecord::failed("jan.pdf", "boom"));
        ctx.record(&inputs, results);

        assert!(!ctx.needs_processing(&set(&[("jan.pdf", 10), ("feb.pdf", 20)])));
        assert!(ctx.needs_processing(&set(&[("jan.pdf", 10), ("feb.pdf", 21)])));
        assert!(ctx.needs_processing(&set(&[("jan.pdf", 10)])));
        assert_eq!(ctx.results().map(ResultSet::len), Some(1));

        ctx.clear();
        assert!(ctx.needs_processing(&inputs));
        assert!(ctx.results().is_none());
    }

    #[test]
    fn test_saved_state_follows_latest_results() {
        let inputs = set(&[("jan.pdf", 10)]);
        let mut ctx = ProcessingContext::new();
        assert!(ctx.unsaved_results().is_none());

        ctx.record(&inputs, ResultSet::new());
        assert!(ctx.unsaved_results().is_some());
        ctx.mark_saved();
        assert!(ctx.unsaved_results().is_none());

        ctx.record(&set(&[("jan.pdf", 11)]), ResultSet::new());
        assert!(ctx.unsaved_results().is_some());
    }

    #[test]
    fn test_from_paths_reads_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bill.pdf");
        std::fs::write(&path, b"12345").unwrap();

        let before = InputSet::from_paths(&[path.clone()]);
        std::fs::write(&path, b"123456").unwrap();
        let after = InputSet::from_paths(&[path.clone()]);

        assert_eq!(before.len(), 1);
        assert_ne!(before.fingerprint(), after.fingerprint());
        assert_eq!(after.paths(), vec![path]);
    }
}
