/// Edits to an existing snip that keep its identifier: summary, flipbook and snapshot.
use crate::coordinator::LibraryContext;
use crate::error::{Result, SnipError};
use crate::preview::processor;
use crate::state::data::{ArtifactKind, SnipRecord};
use crate::state::edit;
use crate::store::artifacts::ArtifactStore;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Replace the summary and regenerate keywords
pub fn describe(ctx: &mut LibraryContext<'_>, identifier: &str, summary: &str) -> Result<SnipRecord> {
    let record = update_record(ctx, identifier, |record| edit::apply_summary(record, summary))?;
    info!(identifier, keywords = record.keywords.len(), "📝 description updated");
    Ok(record)
}

/// Install a new flipbook from the given frames, replacing the old one
pub fn set_flipbook(ctx: &mut LibraryContext<'_>, identifier: &str, frames: &[PathBuf]) -> Result<SnipRecord> {
    require_record(ctx, identifier)?;
    let installed = change_files(ctx, identifier, |store| {
        store.create_flipbook(identifier, frames)?;
        store.frames(identifier)
    })?;

    let gif = ctx.store.flipbook_gif_path(identifier);
    if let Err(reason) =
        processor::encode_flipbook_gif(&installed, &gif, ctx.preview.max_size(), ctx.preview.frame_rate)
    {
        warn!(identifier, %reason, "GIF not written");
    }

    update_record(ctx, identifier, |record| {
        record.flipbook = Some(SnipRecord::flipbook_reference(identifier));
    })
}

pub fn clear_flipbook(ctx: &mut LibraryContext<'_>, identifier: &str) -> Result<SnipRecord> {
    require_record(ctx, identifier)?;
    change_files(ctx, identifier, |store| store.delete_kind(identifier, ArtifactKind::Flipbook))?;
    update_record(ctx, identifier, |record| record.flipbook = None)
}

pub fn set_snapshot(ctx: &mut LibraryContext<'_>, identifier: &str, source: &Path) -> Result<SnipRecord> {
    require_record(ctx, identifier)?;
    change_files(ctx, identifier, |store| store.write_snapshot(identifier, source))?;
    update_record(ctx, identifier, |record| {
        record.snapshot = Some(SnipRecord::snapshot_reference(identifier));
    })
}

pub fn clear_snapshot(ctx: &mut LibraryContext<'_>, identifier: &str) -> Result<SnipRecord> {
    require_record(ctx, identifier)?;
    change_files(ctx, identifier, |store| store.delete_kind(identifier, ArtifactKind::Snapshot))?;
    update_record(ctx, identifier, |record| record.snapshot = None)
}

/// Run a file change. A failure may have left the previews half replaced,
/// so observers are told before the error goes back.
fn change_files<T, F>(ctx: &mut LibraryContext<'_>, identifier: &str, change: F) -> Result<T>
where
    F: FnOnce(&ArtifactStore) -> Result<T>,
{
    let result = change(ctx.store);
    if let Err(err) = &result {
        warn!(identifier, error = %err, "preview files left partly changed");
        ctx.notify(identifier);
    }
    result
}

fn require_record(ctx: &LibraryContext<'_>, identifier: &str) -> Result<()> {
    ctx.library
        .find(identifier)
        .map(|_| ())
        .ok_or_else(|| SnipError::SnipNotFound(identifier.to_string()))
}

/// Apply `change` to the record, save, and notify. The in-memory record is
/// restored when the save fails.
fn update_record<F>(ctx: &mut LibraryContext<'_>, identifier: &str, change: F) -> Result<SnipRecord>
where
    F: FnOnce(&mut SnipRecord),
{
    let original = ctx
        .library
        .find(identifier)
        .cloned()
        .ok_or_else(|| SnipError::SnipNotFound(identifier.to_string()))?;

    let mut updated = original.clone();
    change(&mut updated);
    ctx.library.replace(identifier, updated.clone());

    let saved = ctx.library.save();
    if saved.is_err() {
        ctx.library.replace(identifier, original);
    }
    ctx.notify(identifier);
    saved.map(|_| updated)
}
