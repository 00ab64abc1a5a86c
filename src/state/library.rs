use crate::error::{Result, SnipError};
use crate::state::data::{ArtifactKind, SnipRecord};
use crate::state::name::{self, NameField};
use crate::store::artifacts::ArtifactStore;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The Library manages one user's master index.
/// It holds every snip record in memory, newest first, and writes the whole
/// list back to `descriptions/master.json` on save.
pub struct Library {
    records: Vec<SnipRecord>,
    index_path: PathBuf,
    /// Set when the index on disk could not be read and the library started empty
    load_warning: Option<SnipError>,
}

impl Library {
    /// Load the index for a user.
    ///
    /// - Missing file: empty library, no warning
    /// - Unreadable or malformed file: empty library, `IndexCorrupt` warning,
    ///   and the broken file is copied aside to `master.corrupt.json`
    pub fn load(index_path: &Path) -> Self {
        let mut library = Library {
            records: Vec::new(),
            index_path: index_path.to_path_buf(),
            load_warning: None,
        };

        let raw = match fs::read(index_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %index_path.display(), "no index yet, starting empty");
                return library;
            }
            Err(err) => {
                library.backup_corrupt_file();
                library.mark_corrupt(err.to_string());
                return library;
            }
        };

        // Invalid UTF-8 fails here too, and takes the same backup path
        match serde_json::from_slice::<Vec<SnipRecord>>(&raw) {
            Ok(records) => {
                info!(path = %index_path.display(), count = records.len(), "📁 index loaded");
                library.records = records;
            }
            Err(err) => {
                library.backup_corrupt_file();
                library.mark_corrupt(err.to_string());
            }
        }

        library
    }

    fn mark_corrupt(&mut self, reason: String) {
        warn!(path = %self.index_path.display(), %reason, "⚠️  index unreadable, starting with an empty library");
        self.load_warning = Some(SnipError::IndexCorrupt {
            path: self.index_path.clone(),
            reason,
        });
    }

    fn backup_corrupt_file(&self) {
        let backup = self.index_path.with_file_name("master.corrupt.json");
        if let Err(err) = fs::copy(&self.index_path, &backup) {
            warn!(path = %backup.display(), error = %err, "could not back up corrupt index");
        }
    }

    /// Warning produced by [`Library::load`], if the index had to be discarded
    pub fn load_warning(&self) -> Option<&SnipError> {
        self.load_warning.as_ref()
    }

    /// Get the path to the index file
    pub fn path(&self) -> &Path {
        &self.index_path
    }

    /// All records, newest first
    pub fn records(&self) -> &[SnipRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, identifier: &str) -> Option<&SnipRecord> {
        self.records.iter().find(|record| record.identifier == identifier)
    }

    fn position(&self, identifier: &str) -> Option<usize> {
        self.records.iter().position(|record| record.identifier == identifier)
    }

    /// Replace the record with the same identifier, or insert it as the newest
    pub fn upsert(&mut self, record: SnipRecord) {
        match self.position(&record.identifier) {
            Some(index) => self.records[index] = record,
            None => self.records.insert(0, record),
        }
    }

    /// Swap the record stored under `identifier` for `record`, keeping its position.
    /// Returns false when no record has that identifier.
    pub fn replace(&mut self, identifier: &str, record: SnipRecord) -> bool {
        match self.position(identifier) {
            Some(index) => {
                self.records[index] = record;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, identifier: &str) -> Option<SnipRecord> {
        self.take(identifier).map(|(_, record)| record)
    }

    /// Remove a record and report where it was, so it can be put back with [`Library::restore`]
    pub fn take(&mut self, identifier: &str) -> Option<(usize, SnipRecord)> {
        self.position(identifier)
            .map(|index| (index, self.records.remove(index)))
    }

    /// Put a record back at its old position
    pub fn restore(&mut self, position: usize, record: SnipRecord) {
        let position = position.min(self.records.len());
        self.records.insert(position, record);
    }

    /// Write the whole index to disk.
    ///
    /// The list is written to a temporary file next to the index and renamed
    /// over it, so readers see either the old or the new index, never half of one.
    pub fn save(&self) -> Result<()> {
        let io_error = |err: std::io::Error| SnipError::IoFailure {
            kind: ArtifactKind::Index,
            identifier: self.index_path.display().to_string(),
            source: err,
        };

        let parent = self
            .index_path
            .parent()
            .ok_or_else(|| io_error(std::io::Error::new(std::io::ErrorKind::InvalidInput, "index path has no parent")))?;
        fs::create_dir_all(parent).map_err(io_error)?;

        let body = to_json(&self.records).map_err(|err| io_error(err.into()))?;

        let temp_path = parent.join(format!("master.json.tmp.{}", std::process::id()));
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(&body)?;
            file.sync_all()?;
            fs::rename(&temp_path, &self.index_path)
        };

        if let Err(err) = write() {
            let _ = fs::remove_file(&temp_path);
            return Err(io_error(err));
        }

        debug!(path = %self.index_path.display(), count = self.records.len(), "index saved");
        Ok(())
    }

    /// Case-insensitive match on identifier, summary and keywords
    pub fn search(&self, query: &str) -> Vec<&SnipRecord> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.records.iter().collect();
        }

        self.records
            .iter()
            .filter(|record| {
                record.identifier.to_lowercase().contains(&needle)
                    || record.summary.to_lowercase().contains(&needle)
                    || record.keywords.iter().any(|keyword| keyword.contains(&needle))
            })
            .collect()
    }

    /// Group records by one identifier field (Context, Type, Source, ...).
    /// Records whose identifier no longer parses land under "Unparsed".
    pub fn group_by(&self, field: NameField) -> BTreeMap<String, Vec<&SnipRecord>> {
        let mut groups: BTreeMap<String, Vec<&SnipRecord>> = BTreeMap::new();
        for record in &self.records {
            let key = name::parse(&record.identifier)
                .map(|parsed| parsed.field(field))
                .unwrap_or_else(|_| "Unparsed".to_string());
            groups.entry(key).or_default().push(record);
        }
        groups
    }

    /// Distinct Source fields, for source filtering
    pub fn sources(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .filter_map(|record| name::parse(&record.identifier).ok())
            .map(|parsed| parsed.source)
            .collect()
    }

    /// Records whose snip file is gone from disk
    pub fn verify(&self, store: &ArtifactStore) -> Vec<&SnipRecord> {
        let missing: Vec<&SnipRecord> = self
            .records
            .iter()
            .filter(|record| !store.exists(&record.identifier, ArtifactKind::Snip))
            .collect();

        if !missing.is_empty() {
            warn!(count = missing.len(), "⚠️  index records without a snip file");
        }

        missing
    }
}

/// Pretty JSON with 4-space indentation, the layout existing indexes use
fn to_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut body = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut body, formatter);
    value.serialize(&mut serializer)?;
    Ok(body)
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("index_path", &self.index_path)
            .field("records", &self.records.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(identifier: &str, summary: &str) -> SnipRecord {
        SnipRecord {
            path: "/lib/alice".into(),
            user: "alice".into(),
            identifier: identifier.into(),
            ext: "uti".into(),
            flipbook: None,
            snapshot: None,
            summary: summary.into(),
            keywords: vec!["sop".into(), "flip".into()],
            date: "2024-05-01".into(),
            time: "10:00:00".into(),
            size: 42,
        }
    }

    fn index_path(dir: &TempDir) -> PathBuf {
        dir.path().join("descriptions").join("master.json")
    }

    #[test]
    fn test_missing_index_loads_empty() {
        let dir = TempDir::new().unwrap();
        let library = Library::load(&index_path(&dir));
        assert!(library.is_empty());
        assert!(library.load_warning().is_none());
    }

    #[test]
    fn test_malformed_index_loads_empty_with_warning() {
        let dir = TempDir::new().unwrap();
        let path = index_path(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let library = Library::load(&path);

        assert!(library.is_empty());
        assert!(matches!(library.load_warning(), Some(SnipError::IndexCorrupt { .. })));
        let backup = path.with_file_name("master.corrupt.json");
        assert_eq!(fs::read_to_string(backup).unwrap(), "{ not json");
    }

    #[test]
    fn test_non_utf8_index_is_backed_up() {
        let dir = TempDir::new().unwrap();
        let path = index_path(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"[{\"user\": \"caf\xE9\"}]").unwrap();

        let library = Library::load(&path);

        assert!(library.is_empty());
        assert!(matches!(library.load_warning(), Some(SnipError::IndexCorrupt { .. })));
        let backup = path.with_file_name("master.corrupt.json");
        assert_eq!(fs::read(backup).unwrap(), fs::read(&path).unwrap());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = index_path(&dir);
        let mut library = Library::load(&path);
        library.upsert(record("SOP_flip_a_alice_v01", "first"));
        library.upsert(record("SOP_flip_b_alice_v01", "second"));
        library.save().unwrap();

        let reloaded = Library::load(&path);
        let ids: Vec<&str> = reloaded.records().iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, ["SOP_flip_b_alice_v01", "SOP_flip_a_alice_v01"]);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("[\n    {"));
        assert!(raw.contains("\"File Name\": \"SOP_flip_a_alice_v01\""));
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let dir = TempDir::new().unwrap();
        let mut library = Library::load(&index_path(&dir));
        library.upsert(record("SOP_flip_a_alice_v01", "old"));
        library.upsert(record("SOP_flip_b_alice_v01", "other"));
        library.upsert(record("SOP_flip_a_alice_v01", "new"));

        assert_eq!(library.len(), 2);
        assert_eq!(library.records()[1].summary, "new");
    }

    #[test]
    fn test_replace_and_remove() {
        let dir = TempDir::new().unwrap();
        let mut library = Library::load(&index_path(&dir));
        library.upsert(record("SOP_flip_a_alice_v01", "a"));

        assert!(library.replace("SOP_flip_a_alice_v01", record("SOP_flip_a_alice_v02", "a")));
        assert!(library.find("SOP_flip_a_alice_v01").is_none());
        assert!(library.find("SOP_flip_a_alice_v02").is_some());
        assert!(!library.replace("SOP_missing_x_y_v01", record("SOP_x_y_z_v01", "")));

        assert!(library.remove("SOP_flip_a_alice_v02").is_some());
        assert!(library.remove("SOP_flip_a_alice_v02").is_none());
    }

    #[test]
    fn test_take_and_restore_keep_position() {
        let dir = TempDir::new().unwrap();
        let mut library = Library::load(&index_path(&dir));
        for id in ["SOP_a_x_alice_v01", "SOP_b_x_alice_v01", "SOP_c_x_alice_v01"] {
            library.upsert(record(id, ""));
        }

        let (position, taken) = library.take("SOP_b_x_alice_v01").unwrap();
        assert_eq!(position, 1);
        library.restore(position, taken);

        let ids: Vec<&str> = library.records().iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, ["SOP_c_x_alice_v01", "SOP_b_x_alice_v01", "SOP_a_x_alice_v01"]);
    }

    #[test]
    fn test_save_failure_is_an_index_io_failure() {
        let dir = TempDir::new().unwrap();
        // A file where the descriptions directory should be
        fs::write(dir.path().join("descriptions"), "").unwrap();
        let library = Library::load(&index_path(&dir));

        let err = library.save().unwrap_err();
        assert_eq!(err.artifact_kind(), Some(ArtifactKind::Index));
    }

    #[test]
    fn test_search_group_and_sources() {
        let dir = TempDir::new().unwrap();
        let mut library = Library::load(&index_path(&dir));
        library.upsert(record("SOP_flip_tank_alice_v01", "Tank fill with whitewater"));
        library.upsert(record("DOP_pyro_torch_bob_v02", "small torch"));

        assert_eq!(library.search("WHITEWATER").len(), 1);
        assert_eq!(library.search("torch").len(), 1);
        assert_eq!(library.search("").len(), 2);

        let groups = library.group_by(NameField::Context);
        assert_eq!(groups.keys().cloned().collect::<Vec<_>>(), ["DOP", "SOP"]);

        let sources: Vec<String> = library.sources().into_iter().collect();
        assert_eq!(sources, ["alice", "bob"]);
    }
}
