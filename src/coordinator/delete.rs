/// Delete coordinator
///
/// Removes the snip file, its previews and its record. There is no undo.
/// Deleting something already half gone still cleans up what is left, so
/// calling it twice is fine.

use crate::coordinator::{check_path_safe, LibraryContext};
use crate::error::{Result, SnipError};
use crate::state::data::ArtifactKind;
use tracing::{info, warn};

#[derive(Debug)]
pub struct DeleteOutcome {
    pub identifier: String,
    /// Filesystem kinds that existed and were removed
    pub removed: Vec<ArtifactKind>,
    /// Whether the index held a record for the identifier
    pub record_removed: bool,
    /// Preview removals that failed; those files are still on disk
    pub leftovers: Vec<SnipError>,
}

pub fn delete(ctx: &mut LibraryContext<'_>, identifier: &str) -> Result<DeleteOutcome> {
    check_path_safe(identifier)?;

    let mut removed = Vec::new();
    let mut leftovers = Vec::new();

    for kind in ArtifactKind::FILESYSTEM {
        match ctx.store.delete_kind(identifier, kind) {
            Ok(true) => removed.push(kind),
            Ok(false) if kind == ArtifactKind::Snip => {
                warn!(identifier, "snip file already gone, cleaning up the rest");
            }
            Ok(false) => {}
            Err(err) if kind.is_optional() => {
                warn!(identifier, %kind, error = %err, "⚠️  preview not removed");
                leftovers.push(err);
            }
            Err(err) => {
                ctx.notify(identifier);
                return Err(SnipError::DeleteFailed {
                    identifier: identifier.to_string(),
                    failed: kind,
                    removed,
                    source: Box::new(err),
                });
            }
        }
    }

    let taken = ctx.library.take(identifier);
    let record_removed = taken.is_some();
    if let Some((position, record)) = taken {
        if let Err(err) = ctx.library.save() {
            // The files are gone either way; keep the record in memory consistent with disk
            ctx.library.restore(position, record);
            ctx.notify(identifier);
            return Err(SnipError::DeleteFailed {
                identifier: identifier.to_string(),
                failed: ArtifactKind::Index,
                removed,
                source: Box::new(err),
            });
        }
    }

    ctx.notify(identifier);
    info!(identifier, removed = removed.len(), record_removed, "🗑️  snip deleted");

    Ok(DeleteOutcome {
        identifier: identifier.to_string(),
        removed,
        record_removed,
        leftovers,
    })
}
