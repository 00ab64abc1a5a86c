use crate::error::{Result, SnipError};
use crate::state::data::{ArtifactKind, ArtifactSet, FRAME_TOKEN};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extension used for flipbook frames and snapshots
pub const PREVIEW_EXTENSION: &str = "png";

/// Filesystem side of a user's library.
///
/// Layout under the user root:
/// - `<identifier>.<ext>` snip file
/// - `preview/flipbook/<identifier>/<identifier>.<NNNN>.png` flipbook frames
/// - `preview/snapshot/<identifier>.png` snapshot
/// - `descriptions/master.json` index
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    user_root: PathBuf,
    extension: String,
}

impl ArtifactStore {
    pub fn new(user_root: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            user_root: user_root.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn user_root(&self) -> &Path {
        &self.user_root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Create the directory skeleton of the library
    pub fn ensure_layout(&self) -> io::Result<()> {
        for dir in [
            self.user_root.clone(),
            self.user_root.join("descriptions"),
            self.flipbook_root(),
            self.snapshot_root(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    fn flipbook_root(&self) -> PathBuf {
        self.user_root.join("preview").join("flipbook")
    }

    fn snapshot_root(&self) -> PathBuf {
        self.user_root.join("preview").join("snapshot")
    }

    /// Scratch space for captures that are not installed yet
    pub fn staging_dir(&self, identifier: &str) -> PathBuf {
        self.user_root.join("preview").join(".staging").join(identifier)
    }

    pub fn index_path(&self) -> PathBuf {
        self.user_root.join("descriptions").join("master.json")
    }

    pub fn snip_path(&self, identifier: &str) -> PathBuf {
        self.user_root.join(format!("{}.{}", identifier, self.extension))
    }

    pub fn flipbook_dir(&self, identifier: &str) -> PathBuf {
        self.flipbook_root().join(identifier)
    }

    pub fn flipbook_pattern(&self, identifier: &str) -> PathBuf {
        self.flipbook_dir(identifier)
            .join(format!("{}.{}.{}", identifier, FRAME_TOKEN, PREVIEW_EXTENSION))
    }

    pub fn frame_path(&self, identifier: &str, frame: u32) -> PathBuf {
        self.flipbook_dir(identifier)
            .join(format!("{}.{:04}.{}", identifier, frame, PREVIEW_EXTENSION))
    }

    /// Animated GIF rendered next to the frames
    pub fn flipbook_gif_path(&self, identifier: &str) -> PathBuf {
        self.flipbook_dir(identifier).join(format!("{}.gif", identifier))
    }

    pub fn snapshot_path(&self, identifier: &str) -> PathBuf {
        self.snapshot_root().join(format!("{}.{}", identifier, PREVIEW_EXTENSION))
    }

    pub fn artifact_set(&self, identifier: &str) -> ArtifactSet {
        ArtifactSet {
            snip: self.snip_path(identifier),
            flipbook_dir: self.flipbook_dir(identifier),
            flipbook_pattern: self.flipbook_pattern(identifier),
            snapshot: self.snapshot_path(identifier),
            index: self.index_path(),
        }
    }

    /// Resolve a record reference (`/preview/...`) against the user root
    pub fn resolve_reference(&self, reference: &str) -> PathBuf {
        self.user_root.join(reference.trim_start_matches(['/', '\\']))
    }

    pub fn exists(&self, identifier: &str, kind: ArtifactKind) -> bool {
        match kind {
            ArtifactKind::Snip => self.snip_path(identifier).is_file(),
            ArtifactKind::Flipbook => self.flipbook_dir(identifier).is_dir(),
            ArtifactKind::Snapshot => self.snapshot_path(identifier).is_file(),
            ArtifactKind::Index => self.index_path().is_file(),
        }
    }

    /// Frame files of a flipbook, in frame order
    pub fn frames(&self, identifier: &str) -> Result<Vec<PathBuf>> {
        let dir = self.flipbook_dir(identifier);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut frames = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry
                .map_err(io::Error::from)
                .map_err(SnipError::io(ArtifactKind::Flipbook, identifier))?;
            let file_name = entry.file_name().to_string_lossy();
            if frame_number(identifier, &file_name).is_some() {
                frames.push(entry.into_path());
            }
        }
        Ok(frames)
    }

    /// Install a flipbook from an ordered list of source images.
    ///
    /// Frames are copied into `<identifier>.<NNNN>.png`, numbered from 1.
    /// Any frames already present for the identifier are replaced.
    pub fn create_flipbook(&self, identifier: &str, source_frames: &[PathBuf]) -> Result<PathBuf> {
        let fail = |err: io::Error| SnipError::io(ArtifactKind::Flipbook, identifier)(err);

        if source_frames.is_empty() {
            return Err(fail(io::Error::new(
                io::ErrorKind::InvalidInput,
                "flipbook needs at least one frame",
            )));
        }

        let dir = self.flipbook_dir(identifier);
        if dir.exists() {
            for old in self.frames(identifier)? {
                fs::remove_file(&old).map_err(fail)?;
            }
        }
        fs::create_dir_all(&dir).map_err(fail)?;

        for (index, source) in source_frames.iter().enumerate() {
            let target = self.frame_path(identifier, index as u32 + 1);
            fs::copy(source, &target).map_err(fail)?;
        }

        info!(identifier, frames = source_frames.len(), "🎞️  flipbook installed");
        Ok(self.flipbook_pattern(identifier))
    }

    /// Install a snapshot image
    pub fn write_snapshot(&self, identifier: &str, source: &Path) -> Result<PathBuf> {
        let target = self.snapshot_path(identifier);
        let fail = SnipError::io(ArtifactKind::Snapshot, identifier);
        let copy = || -> io::Result<()> {
            fs::create_dir_all(self.snapshot_root())?;
            fs::copy(source, &target)?;
            Ok(())
        };
        copy().map_err(fail)?;
        info!(identifier, "📸 snapshot installed");
        Ok(target)
    }

    /// Move every existing artifact from `old` to `new`.
    ///
    /// Stops at the first failure and does not undo earlier moves.
    /// Returns the kinds that were moved; absent kinds are skipped.
    pub fn rename(&self, old: &str, new: &str) -> Result<Vec<ArtifactKind>> {
        let mut moved = Vec::new();
        for kind in ArtifactKind::FILESYSTEM {
            if self.rename_kind(old, new, kind)? {
                moved.push(kind);
            }
        }
        Ok(moved)
    }

    /// Move one artifact kind. Returns false when it does not exist under `old`.
    pub fn rename_kind(&self, old: &str, new: &str, kind: ArtifactKind) -> Result<bool> {
        if !self.exists(old, kind) {
            return Ok(false);
        }

        // Attributed to the identifier the artifact currently lives under
        let fail = SnipError::io(kind, old);
        match kind {
            ArtifactKind::Snip => fs::rename(self.snip_path(old), self.snip_path(new)).map_err(fail)?,
            ArtifactKind::Snapshot => {
                fs::rename(self.snapshot_path(old), self.snapshot_path(new)).map_err(fail)?
            }
            ArtifactKind::Flipbook => self.rename_flipbook(old, new).map_err(fail)?,
            ArtifactKind::Index => return Ok(false),
        }

        debug!(old, new, %kind, "moved");
        Ok(true)
    }

    /// Rename every `<old>.*` file inside the directory, then the directory itself.
    /// On failure the frames already renamed get their old names back.
    fn rename_flipbook(&self, old: &str, new: &str) -> io::Result<()> {
        let old_dir = self.flipbook_dir(old);
        let new_dir = self.flipbook_dir(new);
        if new_dir.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", new_dir.display()),
            ));
        }

        let prefix = format!("{}.", old);
        let entries = WalkDir::new(&old_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut renamed: Vec<(PathBuf, PathBuf)> = Vec::new();
        let result = entries
            .iter()
            .try_for_each(|entry| {
                let file_name = entry.file_name().to_string_lossy().to_string();
                if let Some(rest) = file_name.strip_prefix(&prefix) {
                    let target = old_dir.join(format!("{}.{}", new, rest));
                    fs::rename(entry.path(), &target)?;
                    renamed.push((entry.path().to_path_buf(), target));
                }
                Ok(())
            })
            .and_then(|_| fs::rename(&old_dir, &new_dir));

        if result.is_err() {
            for (from, to) in renamed.iter().rev() {
                if let Err(err) = fs::rename(to, from) {
                    warn!(frame = %to.display(), error = %err, "frame not restored");
                }
            }
        }
        result
    }

    /// Remove every existing artifact of an identifier.
    ///
    /// Stops at the first failure. Kinds that do not exist are not an error.
    pub fn delete(&self, identifier: &str) -> Result<Vec<ArtifactKind>> {
        let mut deleted = Vec::new();
        for kind in ArtifactKind::FILESYSTEM {
            if self.delete_kind(identifier, kind)? {
                deleted.push(kind);
            }
        }
        Ok(deleted)
    }

    /// Remove one artifact kind. Returns false when there was nothing to remove.
    pub fn delete_kind(&self, identifier: &str, kind: ArtifactKind) -> Result<bool> {
        if !self.exists(identifier, kind) {
            return Ok(false);
        }

        let fail = SnipError::io(kind, identifier);
        match kind {
            ArtifactKind::Snip => fs::remove_file(self.snip_path(identifier)).map_err(fail)?,
            ArtifactKind::Snapshot => fs::remove_file(self.snapshot_path(identifier)).map_err(fail)?,
            ArtifactKind::Flipbook => fs::remove_dir_all(self.flipbook_dir(identifier)).map_err(fail)?,
            ArtifactKind::Index => return Ok(false),
        }

        debug!(identifier, %kind, "removed");
        Ok(true)
    }

    /// Drop the staging directory of an identifier, if any
    pub fn discard_staging(&self, identifier: &str) {
        let staging = self.staging_dir(identifier);
        if staging.exists() {
            if let Err(err) = fs::remove_dir_all(&staging) {
                warn!(path = %staging.display(), error = %err, "could not remove staging directory");
            }
        }
    }

    /// Size of the snip file in bytes, 0 when it is missing
    pub fn snip_size(&self, identifier: &str) -> u64 {
        fs::metadata(self.snip_path(identifier))
            .map(|meta| meta.len())
            .unwrap_or(0)
    }
}

/// Frame number of `<identifier>.<digits>.<ext>`, if the file name has that shape
pub fn frame_number(identifier: &str, file_name: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(identifier)?.strip_prefix('.')?;
    let (digits, extension) = rest.split_once('.')?;
    if digits.is_empty() || extension.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const OLD: &str = "SOP_flip_basicSetup_userA_v01";
    const NEW: &str = "SOP_flip_basicSetup_userA_v02";

    fn store(dir: &TempDir) -> ArtifactStore {
        let store = ArtifactStore::new(dir.path().join("userA"), "uti");
        store.ensure_layout().unwrap();
        store
    }

    fn write_png(path: &Path) {
        image::RgbaImage::from_pixel(4, 4, image::Rgba([200, 10, 10, 255]))
            .save(path)
            .unwrap();
    }

    fn source_frames(dir: &TempDir, count: usize) -> Vec<PathBuf> {
        let capture = dir.path().join("capture");
        fs::create_dir_all(&capture).unwrap();
        (0..count)
            .map(|i| {
                let path = capture.join(format!("render_{i}.png"));
                write_png(&path);
                path
            })
            .collect()
    }

    #[test]
    fn test_layout_paths() {
        let store = ArtifactStore::new("/lib/userA", ".uti");
        assert_eq!(store.snip_path(OLD), PathBuf::from(format!("/lib/userA/{OLD}.uti")));
        assert_eq!(
            store.frame_path(OLD, 7),
            PathBuf::from(format!("/lib/userA/preview/flipbook/{OLD}/{OLD}.0007.png"))
        );
        assert_eq!(
            store.flipbook_pattern(OLD),
            PathBuf::from(format!("/lib/userA/preview/flipbook/{OLD}/{OLD}.$F4.png"))
        );
        assert_eq!(
            store.snapshot_path(OLD),
            PathBuf::from(format!("/lib/userA/preview/snapshot/{OLD}.png"))
        );
        assert_eq!(
            store.index_path(),
            PathBuf::from("/lib/userA/descriptions/master.json")
        );
        let set = store.artifact_set(OLD);
        assert_eq!(set.snip, store.snip_path(OLD));
        assert_eq!(set.flipbook_dir, store.flipbook_dir(OLD));
        assert_eq!(set.index, store.index_path());
        assert_eq!(
            store.resolve_reference("/preview/snapshot/x.png"),
            PathBuf::from("/lib/userA/preview/snapshot/x.png")
        );
    }

    #[test]
    fn test_frame_number() {
        assert_eq!(frame_number(OLD, &format!("{OLD}.0012.png")), Some(12));
        assert_eq!(frame_number(OLD, &format!("{OLD}.gif")), None);
        assert_eq!(frame_number(OLD, "other.0001.png"), None);
        assert_eq!(frame_number(OLD, &format!("{OLD}.00a1.png")), None);
    }

    #[test]
    fn test_create_flipbook_renumbers_frames() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let sources = source_frames(&dir, 3);

        let pattern = store.create_flipbook(OLD, &sources).unwrap();

        assert_eq!(pattern, store.flipbook_pattern(OLD));
        let frames = store.frames(OLD).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], store.frame_path(OLD, 1));
        assert_eq!(frames[2], store.frame_path(OLD, 3));
    }

    #[test]
    fn test_create_flipbook_rejects_empty_sequence() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let err = store.create_flipbook(OLD, &[]).unwrap_err();
        assert_eq!(err.artifact_kind(), Some(ArtifactKind::Flipbook));
        assert!(!store.exists(OLD, ArtifactKind::Flipbook));
    }

    #[test]
    fn test_create_flipbook_replaces_previous_frames() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create_flipbook(OLD, &source_frames(&dir, 5)).unwrap();
        store.create_flipbook(OLD, &source_frames(&dir, 2)).unwrap();
        assert_eq!(store.frames(OLD).unwrap().len(), 2);
    }

    #[test]
    fn test_rename_moves_all_existing_kinds() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.snip_path(OLD), b"nodes").unwrap();
        store.create_flipbook(OLD, &source_frames(&dir, 12)).unwrap();
        fs::write(store.flipbook_gif_path(OLD), b"gif").unwrap();
        write_png(&store.snapshot_path(OLD));

        let moved = store.rename(OLD, NEW).unwrap();

        assert_eq!(moved, ArtifactKind::FILESYSTEM.to_vec());
        for kind in ArtifactKind::FILESYSTEM {
            assert!(!store.exists(OLD, kind), "{kind} left under old name");
            assert!(store.exists(NEW, kind), "{kind} missing under new name");
        }
        let frames = store.frames(NEW).unwrap();
        assert_eq!(frames.len(), 12);
        assert_eq!(frames[11], store.frame_path(NEW, 12));
        assert!(store.flipbook_gif_path(NEW).is_file());
    }

    #[test]
    fn test_rename_skips_missing_optional_kinds() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.snip_path(OLD), b"nodes").unwrap();

        assert_eq!(store.rename(OLD, NEW).unwrap(), vec![ArtifactKind::Snip]);
        assert_eq!(store.rename(OLD, NEW).unwrap(), vec![]);
    }

    #[test]
    fn test_rename_flipbook_refuses_existing_target() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create_flipbook(OLD, &source_frames(&dir, 1)).unwrap();
        fs::create_dir_all(store.flipbook_dir(NEW)).unwrap();

        let err = store.rename_kind(OLD, NEW, ArtifactKind::Flipbook).unwrap_err();
        assert_eq!(err.artifact_kind(), Some(ArtifactKind::Flipbook));
    }

    #[test]
    fn test_delete_is_tolerant_and_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.snip_path(OLD), b"nodes").unwrap();
        store.create_flipbook(OLD, &source_frames(&dir, 2)).unwrap();

        let deleted = store.delete(OLD).unwrap();
        assert_eq!(deleted, vec![ArtifactKind::Snip, ArtifactKind::Flipbook]);
        assert_eq!(store.delete(OLD).unwrap(), vec![]);
    }
}
