/// Create coordinator
///
/// Saves a new snip through the host's scene saver, installs whatever
/// previews the capture produced and adds the record to the index. When the
/// snip file or the index cannot be written, everything this call created is
/// removed again.

use crate::coordinator::LibraryContext;
use crate::error::{Result, SnipError};
use crate::preview::processor;
use crate::state::data::{ArtifactKind, SnipRecord};
use crate::state::edit;
use crate::state::name::{self, SnipName};
use crate::store::collaborators::{Capture, SceneSaver};
use chrono::Local;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

pub struct CreateRequest<'r> {
    pub name: SnipName,
    pub summary: String,
    /// Host graph items handed to the saver
    pub selected_items: Vec<String>,
    pub saver: &'r dyn SceneSaver,
    pub capture: Option<&'r dyn Capture>,
}

#[derive(Debug)]
pub struct CreateOutcome {
    pub record: SnipRecord,
    /// Flipbook frames installed
    pub frames: usize,
    /// Frames in the generated GIF, when one was written
    pub gif_frames: Option<usize>,
    /// Capture or preview problems that did not stop the create
    pub warnings: Vec<String>,
}

pub fn create(ctx: &mut LibraryContext<'_>, request: CreateRequest<'_>) -> Result<CreateOutcome> {
    let identifier = request.name.identifier();
    // Re-parse so only canonical identifiers reach the disk
    name::parse(&identifier)?;

    if ctx.library.find(&identifier).is_some() || ctx.store.exists(&identifier, ArtifactKind::Snip) {
        return Err(SnipError::NameCollision(identifier));
    }

    ctx.store
        .ensure_layout()
        .map_err(SnipError::io(ArtifactKind::Snip, &identifier))?;

    let snip_path = ctx.store.snip_path(&identifier);
    let saved = request
        .saver
        .save(&request.selected_items, &snip_path)
        .and_then(|_| {
            snip_path
                .is_file()
                .then_some(())
                .ok_or_else(|| "saver reported success but wrote no file".to_string())
        });
    if let Err(reason) = saved {
        let mut cleaned = Vec::new();
        if snip_path.exists() && fs::remove_file(&snip_path).is_ok() {
            cleaned.push(ArtifactKind::Snip);
        }
        return Err(SnipError::CreateFailed {
            identifier: identifier.clone(),
            failed: ArtifactKind::Snip,
            cleaned,
            source: Box::new(SnipError::Collaborator {
                operation: "save",
                identifier,
                reason,
            }),
        });
    }

    let mut warnings = Vec::new();
    let mut installed = Installed::default();
    if let Some(capture) = request.capture {
        installed = install_previews(ctx, &identifier, capture, &mut warnings);
        ctx.store.discard_staging(&identifier);
    }

    let (date, time) = edit::timestamp(Local::now());
    let summary = request.summary.trim().to_string();
    let record = SnipRecord {
        path: ctx.store.user_root().display().to_string(),
        user: ctx.user.to_string(),
        identifier: identifier.clone(),
        ext: ctx.store.extension().to_string(),
        flipbook: (installed.frames > 0).then(|| SnipRecord::flipbook_reference(&identifier)),
        snapshot: installed.snapshot.then(|| SnipRecord::snapshot_reference(&identifier)),
        keywords: edit::generate_keywords(&summary, &request.name),
        summary,
        date,
        time,
        size: ctx.store.snip_size(&identifier),
    };

    ctx.library.upsert(record.clone());
    if let Err(err) = ctx.library.save() {
        ctx.library.remove(&identifier);
        let cleaned = ctx.store.delete(&identifier).unwrap_or_else(|cleanup| {
            warn!(identifier = %identifier, error = %cleanup, "could not remove new artifacts");
            Vec::new()
        });
        ctx.notify(&identifier);
        return Err(SnipError::CreateFailed {
            identifier,
            failed: ArtifactKind::Index,
            cleaned,
            source: Box::new(err),
        });
    }

    ctx.notify(&identifier);
    info!(
        identifier = %identifier,
        frames = installed.frames,
        snapshot = installed.snapshot,
        "✨ snip created"
    );

    Ok(CreateOutcome {
        record,
        frames: installed.frames,
        gif_frames: installed.gif_frames,
        warnings,
    })
}

#[derive(Debug, Default)]
struct Installed {
    frames: usize,
    gif_frames: Option<usize>,
    snapshot: bool,
}

/// Capture into staging and install the results. Every failure here is a warning.
fn install_previews(
    ctx: &LibraryContext<'_>,
    identifier: &str,
    capture: &dyn Capture,
    warnings: &mut Vec<String>,
) -> Installed {
    let mut installed = Installed::default();
    let staging = ctx.store.staging_dir(identifier);
    if let Err(err) = fs::create_dir_all(&staging) {
        warnings.push(format!("staging directory unavailable: {}", err));
        return installed;
    }

    let mut frames: Vec<PathBuf> = Vec::new();
    for (index, frame) in capture.capture_frames(&staging).into_iter().enumerate() {
        match frame {
            Ok(path) => frames.push(path),
            Err(reason) => {
                warn!(identifier, frame = index + 1, %reason, "frame capture failed, skipping");
                warnings.push(format!("frame {}: {}", index + 1, reason));
            }
        }
    }

    if !frames.is_empty() {
        match ctx.store.create_flipbook(identifier, &frames) {
            Ok(_) => {
                installed.frames = frames.len();
                installed.gif_frames = write_gif(ctx, identifier, warnings);
            }
            Err(err) => {
                warn!(identifier, error = %err, "flipbook not installed");
                warnings.push(err.to_string());
            }
        }
    }

    let snapshot_target = staging.join(format!("{}.png", identifier));
    match capture.capture_snapshot(&snapshot_target) {
        Ok(Some(path)) => match ctx.store.write_snapshot(identifier, &path) {
            Ok(_) => installed.snapshot = true,
            Err(err) => {
                warn!(identifier, error = %err, "snapshot not installed");
                warnings.push(err.to_string());
            }
        },
        Ok(None) => {}
        Err(reason) => {
            warn!(identifier, %reason, "snapshot capture failed");
            warnings.push(format!("snapshot: {}", reason));
        }
    }

    installed
}

fn write_gif(ctx: &LibraryContext<'_>, identifier: &str, warnings: &mut Vec<String>) -> Option<usize> {
    let frames = match ctx.store.frames(identifier) {
        Ok(frames) => frames,
        Err(err) => {
            warnings.push(err.to_string());
            return None;
        }
    };

    let gif = ctx.store.flipbook_gif_path(identifier);
    match processor::encode_flipbook_gif(&frames, &gif, ctx.preview.max_size(), ctx.preview.frame_rate) {
        Ok(count) => Some(count),
        Err(reason) => {
            warn!(identifier, %reason, "GIF not written");
            let _ = fs::remove_file(&gif);
            warnings.push(format!("gif: {}", reason));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::testing::{Fixture, Recorder};
    use crate::store::collaborators::{ExistingImages, FileImport};
    use std::path::Path;

    struct FailingSaver;

    impl SceneSaver for FailingSaver {
        fn save(&self, _items: &[String], destination: &Path) -> std::result::Result<(), String> {
            fs::write(destination, b"half").unwrap();
            Err("host refused the selection".to_string())
        }
    }

    /// Every other frame fails
    struct FlakyCapture {
        frames: Vec<PathBuf>,
    }

    impl Capture for FlakyCapture {
        fn capture_frames(&self, staging_dir: &Path) -> Vec<std::result::Result<PathBuf, String>> {
            self.frames
                .iter()
                .enumerate()
                .map(|(i, source)| {
                    if i % 2 == 1 {
                        return Err("viewport lost".to_string());
                    }
                    let target = staging_dir.join(format!("frame_{i}.png"));
                    fs::copy(source, &target).map_err(|e| e.to_string())?;
                    Ok(target)
                })
                .collect()
        }

        fn capture_snapshot(&self, _destination: &Path) -> std::result::Result<Option<PathBuf>, String> {
            Err("no viewport".to_string())
        }
    }

    fn exported(fx: &Fixture) -> FileImport {
        let source = fx.dir.path().join("export.uti");
        fs::write(&source, b"exported nodes").unwrap();
        FileImport { source }
    }

    fn name() -> SnipName {
        SnipName::new("sop", "flip", "basic setup", "userA", 1).unwrap()
    }

    #[test]
    fn test_create_with_previews() {
        let mut fx = Fixture::new();
        let saver = exported(&fx);
        let frames_dir = fx.source_frames(5)[0].parent().unwrap().to_path_buf();
        let snapshot = fx.dir.path().join("still.png");
        Fixture::write_png(&snapshot);
        let capture = ExistingImages {
            frames_dir: Some(frames_dir),
            snapshot: Some(snapshot),
        };
        let mut recorder = Recorder::default();

        let outcome = {
            let mut ctx = fx.context(&mut recorder);
            create(
                &mut ctx,
                CreateRequest {
                    name: name(),
                    summary: " Splash tank setup ".into(),
                    selected_items: vec!["/obj/geo1/flip".into()],
                    saver: &saver,
                    capture: Some(&capture),
                },
            )
            .unwrap()
        };

        let id = "SOP_flip_basicSetup_userA_v01";
        assert_eq!(outcome.record.identifier, id);
        assert_eq!(outcome.frames, 5);
        assert_eq!(outcome.gif_frames, Some(5));
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.record.size, 14);
        assert_eq!(outcome.record.summary, "Splash tank setup");
        assert!(outcome.record.keywords.contains(&"splash".to_string()));
        assert_eq!(fx.store.frames(id).unwrap().len(), 5);
        assert!(fx.store.flipbook_gif_path(id).is_file());
        assert!(fx.store.exists(id, ArtifactKind::Snapshot));
        assert!(!fx.store.staging_dir(id).exists());
        assert_eq!(fx.library.records()[0].identifier, id);
        assert_eq!(recorder.0, [id]);
    }

    #[test]
    fn test_failed_frames_are_skipped() {
        let mut fx = Fixture::new();
        let saver = exported(&fx);
        let capture = FlakyCapture {
            frames: fx.source_frames(4),
        };
        let mut recorder = Recorder::default();

        let outcome = {
            let mut ctx = fx.context(&mut recorder);
            create(
                &mut ctx,
                CreateRequest {
                    name: name(),
                    summary: String::new(),
                    selected_items: vec![],
                    saver: &saver,
                    capture: Some(&capture),
                },
            )
            .unwrap()
        };

        assert_eq!(outcome.frames, 2);
        assert_eq!(outcome.warnings.len(), 3);
        assert!(outcome.record.flipbook.is_some());
        assert!(outcome.record.snapshot.is_none());
    }

    #[test]
    fn test_saver_failure_leaves_nothing_behind() {
        let mut fx = Fixture::new();
        let mut recorder = Recorder::default();

        let err = {
            let mut ctx = fx.context(&mut recorder);
            create(
                &mut ctx,
                CreateRequest {
                    name: name(),
                    summary: String::new(),
                    selected_items: vec![],
                    saver: &FailingSaver,
                    capture: None,
                },
            )
            .unwrap_err()
        };

        match err {
            SnipError::CreateFailed { failed, cleaned, .. } => {
                assert_eq!(failed, ArtifactKind::Snip);
                assert_eq!(cleaned, vec![ArtifactKind::Snip]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!fx.store.exists("SOP_flip_basicSetup_userA_v01", ArtifactKind::Snip));
        assert!(fx.library.is_empty());
    }

    #[test]
    fn test_create_refuses_existing_identifier() {
        let mut fx = Fixture::new();
        fx.seed("SOP_flip_basicSetup_userA_v01", 0, false);
        let saver = exported(&fx);
        let mut recorder = Recorder::default();
        let mut ctx = fx.context(&mut recorder);

        let err = create(
            &mut ctx,
            CreateRequest {
                name: name(),
                summary: String::new(),
                selected_items: vec![],
                saver: &saver,
                capture: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, SnipError::NameCollision(_)));
    }
}
