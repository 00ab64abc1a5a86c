/// Contracts for the host application pieces the library relies on
///
/// Saving and loading graph fragments and capturing viewport images belong to
/// the host. The library only calls through these traits; failures come back
/// as plain reason strings.

use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Writes the selected graph items to a snip file
pub trait SceneSaver {
    fn save(&self, selected_items: &[String], destination: &Path) -> Result<(), String>;
}

/// Reads a snip file back into the host graph
pub trait SceneLoader {
    fn load(&self, source: &Path, target_context: &str) -> Result<(), String>;
}

/// Produces preview images at caller-chosen locations
pub trait Capture {
    /// Capture a frame sequence into `staging_dir`.
    /// One entry per frame; a failed frame does not stop the others.
    fn capture_frames(&self, staging_dir: &Path) -> Vec<Result<PathBuf, String>>;

    /// Capture a single still to `destination`, or `Ok(None)` when there is nothing to capture
    fn capture_snapshot(&self, destination: &Path) -> Result<Option<PathBuf>, String>;
}

/// Saver that copies an already-exported file into place
///
/// Used when a snip is imported from disk instead of from a live selection.
#[derive(Debug, Clone)]
pub struct FileImport {
    pub source: PathBuf,
}

impl SceneSaver for FileImport {
    fn save(&self, _selected_items: &[String], destination: &Path) -> Result<(), String> {
        if !self.source.is_file() {
            return Err(format!("source file does not exist: {}", self.source.display()));
        }
        fs::copy(&self.source, destination)
            .map(|_| ())
            .map_err(|e| format!("Failed to copy {}: {}", self.source.display(), e))
    }
}

/// Capture backed by images that were rendered beforehand
#[derive(Debug, Clone, Default)]
pub struct ExistingImages {
    /// Directory whose PNG/JPEG files form the flipbook, in file name order
    pub frames_dir: Option<PathBuf>,
    pub snapshot: Option<PathBuf>,
}

impl Capture for ExistingImages {
    fn capture_frames(&self, staging_dir: &Path) -> Vec<Result<PathBuf, String>> {
        let Some(frames_dir) = &self.frames_dir else {
            return Vec::new();
        };
        if let Err(e) = fs::create_dir_all(staging_dir) {
            return vec![Err(format!("Failed to create staging directory: {}", e))];
        }

        WalkDir::new(frames_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && is_image(entry.path()))
            .map(|entry| {
                let target = staging_dir.join(entry.file_name());
                fs::copy(entry.path(), &target)
                    .map(|_| target)
                    .map_err(|e| format!("Failed to stage {}: {}", entry.path().display(), e))
            })
            .collect()
    }

    fn capture_snapshot(&self, destination: &Path) -> Result<Option<PathBuf>, String> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(None);
        };
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }
        fs::copy(snapshot, destination)
            .map(|_| Some(destination.to_path_buf()))
            .map_err(|e| format!("Failed to stage snapshot {}: {}", snapshot.display(), e))
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            matches!(ext.as_str(), "png" | "jpg" | "jpeg")
        })
        .unwrap_or(false)
}
