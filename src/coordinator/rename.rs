/// Rename coordinator
///
/// Moves a snip from one identifier to another:
/// 1. Validating: reject no-ops, unknown snips and collisions
/// 2. Applying: move the snip file, then the optional previews
/// 3. Committed once the index is saved, or RolledBack when the save fails
///
/// A failed move of the snip file stops everything. A failed move of a
/// preview is logged and the preview is dropped; the snip and its record
/// still move. What is left of a dropped preview under the old identifier
/// is removed only once the index is saved, so a rollback finds it intact.

use crate::coordinator::{check_path_safe, LibraryContext};
use crate::error::{Result, RollbackOutcome, SnipError};
use crate::state::data::{ArtifactKind, SnipRecord};
use crate::state::edit;
use crate::state::name::{self, NameField};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameState {
    Validating,
    Applying,
    Committed,
    Rejected,
    RolledBack,
}

/// What a rename did
#[derive(Debug)]
pub struct RenameOutcome {
    pub from: String,
    pub to: String,
    pub state: RenameState,
    /// Kinds now living under the new identifier
    pub moved: Vec<ArtifactKind>,
    /// Preview moves that failed; those previews are gone from the record
    pub dropped: Vec<SnipError>,
}

impl RenameOutcome {
    pub fn is_noop(&self) -> bool {
        self.state == RenameState::Rejected
    }
}

pub struct RenameCoordinator<'c, 'a> {
    ctx: &'c mut LibraryContext<'a>,
    state: RenameState,
}

impl<'c, 'a> RenameCoordinator<'c, 'a> {
    pub fn new(ctx: &'c mut LibraryContext<'a>) -> Self {
        Self {
            ctx,
            state: RenameState::Validating,
        }
    }

    pub fn state(&self) -> RenameState {
        self.state
    }

    fn enter(&mut self, state: RenameState, from: &str, to: &str) {
        debug!(from, to, ?state, previous = ?self.state, "rename state");
        self.state = state;
    }

    /// Change one identifier field and rename to the result
    pub fn rename_field(&mut self, identifier: &str, field: NameField, value: &str) -> Result<RenameOutcome> {
        let target = name::rename_field(identifier, field, value)?;
        info!(identifier, %field, target = %target, "renaming field");
        self.rename(identifier, &target)
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<RenameOutcome> {
        check_path_safe(old)?;
        // The target must be canonical; the source may be a legacy record
        name::parse(new)?;

        if old == new {
            self.enter(RenameState::Rejected, old, new);
            return Ok(RenameOutcome {
                from: old.to_string(),
                to: new.to_string(),
                state: self.state,
                moved: Vec::new(),
                dropped: Vec::new(),
            });
        }

        let original = match self.ctx.library.find(old) {
            Some(record) => record.clone(),
            None => {
                self.enter(RenameState::Rejected, old, new);
                return Err(SnipError::SnipNotFound(old.to_string()));
            }
        };

        if self.ctx.library.find(new).is_some() || self.ctx.store.exists(new, ArtifactKind::Snip) {
            self.enter(RenameState::Rejected, old, new);
            return Err(SnipError::NameCollision(new.to_string()));
        }

        self.enter(RenameState::Applying, old, new);
        let (moved, dropped) = self.move_artifacts(old, new)?;

        let mut updated = original.clone();
        updated.identifier = new.to_string();
        updated.keywords = edit::keywords_for(&updated.summary, new);
        updated.flipbook = moved
            .contains(&ArtifactKind::Flipbook)
            .then(|| SnipRecord::flipbook_reference(new));
        updated.snapshot = moved
            .contains(&ArtifactKind::Snapshot)
            .then(|| SnipRecord::snapshot_reference(new));
        self.ctx.library.replace(old, updated);

        let unmoved: Vec<ArtifactKind> = dropped.iter().filter_map(SnipError::artifact_kind).collect();

        if let Err(err) = self.ctx.library.save() {
            self.ctx.library.replace(new, original);
            let rollback = self.roll_back(old, new, &moved);
            self.enter(RenameState::RolledBack, old, new);
            self.ctx.notify(old);
            self.ctx.notify(new);
            return Err(SnipError::RenameFailed {
                from: old.to_string(),
                to: new.to_string(),
                failed: ArtifactKind::Index,
                moved,
                unmoved,
                rollback,
                source: Box::new(err),
            });
        }

        for kind in unmoved {
            if let Err(cleanup) = self.ctx.store.delete_kind(old, kind) {
                warn!(identifier = old, %kind, error = %cleanup, "stale preview left behind");
            }
        }

        self.enter(RenameState::Committed, old, new);
        self.ctx.notify(old);
        self.ctx.notify(new);
        info!(from = old, to = new, moved = moved.len(), "✏️  snip renamed");

        Ok(RenameOutcome {
            from: old.to_string(),
            to: new.to_string(),
            state: self.state,
            moved,
            dropped,
        })
    }

    fn move_artifacts(&mut self, old: &str, new: &str) -> Result<(Vec<ArtifactKind>, Vec<SnipError>)> {
        let mut moved = Vec::new();
        let mut dropped = Vec::new();

        for kind in ArtifactKind::FILESYSTEM {
            match self.ctx.store.rename_kind(old, new, kind) {
                Ok(true) => moved.push(kind),
                Ok(false) if kind == ArtifactKind::Snip => {
                    warn!(identifier = old, "snip file missing, renaming the record anyway");
                }
                Ok(false) => {}
                Err(err) if kind.is_optional() => {
                    warn!(identifier = old, %kind, error = %err, "⚠️  preview not moved, dropping it");
                    dropped.push(err);
                }
                Err(err) => {
                    // The snip file moves first, so nothing has moved yet
                    self.enter(RenameState::RolledBack, old, new);
                    return Err(SnipError::RenameFailed {
                        from: old.to_string(),
                        to: new.to_string(),
                        failed: kind,
                        moved,
                        unmoved: Vec::new(),
                        rollback: RollbackOutcome::NotNeeded,
                        source: Box::new(err),
                    });
                }
            }
        }

        Ok((moved, dropped))
    }

    /// Move artifacts back, newest move first. Kinds that could not be moved back are reported.
    fn roll_back(&self, old: &str, new: &str, moved: &[ArtifactKind]) -> RollbackOutcome {
        if moved.is_empty() {
            return RollbackOutcome::NotNeeded;
        }

        let mut stranded = Vec::new();
        for kind in moved.iter().rev() {
            match self.ctx.store.rename_kind(new, old, *kind) {
                Ok(true) => {}
                Ok(false) => stranded.push(*kind),
                Err(err) => {
                    warn!(identifier = new, %kind, error = %err, "rollback move failed");
                    stranded.push(*kind);
                }
            }
        }

        if stranded.is_empty() {
            RollbackOutcome::Restored
        } else {
            stranded.reverse();
            RollbackOutcome::Incomplete(stranded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::testing::{Fixture, Recorder};
    use std::fs;

    const OLD: &str = "SOP_flip_basicSetup_userA_v01";
    const NEW: &str = "SOP_flip_basicSetup_userA_v02";

    #[test]
    fn test_rename_moves_everything_and_updates_record() {
        let mut fx = Fixture::new();
        fx.seed(OLD, 12, true);
        let mut recorder = Recorder::default();

        let outcome = {
            let mut ctx = fx.context(&mut recorder);
            RenameCoordinator::new(&mut ctx).rename(OLD, NEW).unwrap()
        };

        assert_eq!(outcome.state, RenameState::Committed);
        assert_eq!(outcome.moved, ArtifactKind::FILESYSTEM.to_vec());
        assert!(fx.library.find(OLD).is_none());
        let record = fx.library.find(NEW).unwrap();
        assert_eq!(record.flipbook.as_deref(), Some(SnipRecord::flipbook_reference(NEW).as_str()));
        assert_eq!(record.snapshot.as_deref(), Some(SnipRecord::snapshot_reference(NEW).as_str()));
        assert_eq!(fx.store.frames(NEW).unwrap().len(), 12);
        assert!(!fx.store.exists(OLD, ArtifactKind::Snip));
        assert_eq!(recorder.0, [OLD, NEW]);

        // Saved, not just in memory
        let reloaded = crate::state::library::Library::load(&fx.store.index_path());
        assert!(reloaded.find(NEW).is_some());
    }

    #[test]
    fn test_rename_field_changes_only_that_field() {
        let mut fx = Fixture::new();
        fx.seed(OLD, 0, false);
        let mut recorder = Recorder::default();

        let outcome = {
            let mut ctx = fx.context(&mut recorder);
            RenameCoordinator::new(&mut ctx)
                .rename_field(OLD, NameField::Name, "tank fill")
                .unwrap()
        };

        assert_eq!(outcome.to, "SOP_flip_tankFill_userA_v01");
        assert_eq!(outcome.moved, vec![ArtifactKind::Snip]);
        let record = fx.library.find("SOP_flip_tankFill_userA_v01").unwrap();
        assert_eq!(record.flipbook, None);
        assert!(record.keywords.contains(&"tankfill".to_string()));
    }

    #[test]
    fn test_noop_rename_is_rejected_without_changes() {
        let mut fx = Fixture::new();
        fx.seed(OLD, 0, true);
        let mut recorder = Recorder::default();

        let outcome = {
            let mut ctx = fx.context(&mut recorder);
            RenameCoordinator::new(&mut ctx).rename(OLD, OLD).unwrap()
        };

        assert!(outcome.is_noop());
        assert!(outcome.moved.is_empty());
        assert!(recorder.0.is_empty());
        assert!(fx.store.exists(OLD, ArtifactKind::Snapshot));
    }

    #[test]
    fn test_collision_leaves_both_snips_untouched() {
        let mut fx = Fixture::new();
        fx.seed(OLD, 2, true);
        fx.seed(NEW, 0, true);
        let mut recorder = Recorder::default();

        let err = {
            let mut ctx = fx.context(&mut recorder);
            RenameCoordinator::new(&mut ctx).rename(OLD, NEW).unwrap_err()
        };

        assert!(matches!(err, SnipError::NameCollision(ref id) if id == NEW));
        for id in [OLD, NEW] {
            assert!(fx.library.find(id).is_some());
            assert!(fx.store.exists(id, ArtifactKind::Snip));
            assert!(fx.store.exists(id, ArtifactKind::Snapshot));
        }
        assert!(fx.store.exists(OLD, ArtifactKind::Flipbook));
        assert!(recorder.0.is_empty());
    }

    #[test]
    fn test_collision_with_unindexed_snip_file() {
        let mut fx = Fixture::new();
        fx.seed(OLD, 0, false);
        fs::write(fx.store.snip_path(NEW), b"orphan").unwrap();
        let mut recorder = Recorder::default();

        let mut ctx = fx.context(&mut recorder);
        let err = RenameCoordinator::new(&mut ctx).rename(OLD, NEW).unwrap_err();
        assert!(matches!(err, SnipError::NameCollision(_)));
    }

    #[test]
    fn test_unknown_and_malformed_identifiers() {
        let mut fx = Fixture::new();
        let mut recorder = Recorder::default();
        let mut ctx = fx.context(&mut recorder);
        let mut coordinator = RenameCoordinator::new(&mut ctx);

        assert!(matches!(coordinator.rename(OLD, NEW), Err(SnipError::SnipNotFound(_))));
        assert_eq!(coordinator.state(), RenameState::Rejected);
        assert!(matches!(
            coordinator.rename(OLD, "SOP_flip_basicSetup_v02"),
            Err(SnipError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_failed_preview_move_is_dropped_but_snip_moves() {
        let mut fx = Fixture::new();
        fx.seed(OLD, 3, true);
        // Target flipbook directory already taken by a stray
        fs::create_dir_all(fx.store.flipbook_dir(NEW)).unwrap();
        let mut recorder = Recorder::default();

        let outcome = {
            let mut ctx = fx.context(&mut recorder);
            RenameCoordinator::new(&mut ctx).rename(OLD, NEW).unwrap()
        };

        assert_eq!(outcome.state, RenameState::Committed);
        assert_eq!(outcome.moved, vec![ArtifactKind::Snip, ArtifactKind::Snapshot]);
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].artifact_kind(), Some(ArtifactKind::Flipbook));
        let record = fx.library.find(NEW).unwrap();
        assert_eq!(record.flipbook, None);
        assert!(record.snapshot.is_some());
        assert!(!fx.store.exists(OLD, ArtifactKind::Flipbook));
    }

    /// A directory where the index file should be makes every save fail
    fn block_index_save(fx: &Fixture) {
        let index = fx.store.index_path();
        fs::remove_file(&index).unwrap();
        fs::create_dir_all(index.join("occupied")).unwrap();
    }

    #[test]
    fn test_index_save_failure_rolls_back_moves() {
        let mut fx = Fixture::new();
        fx.seed(OLD, 2, true);
        block_index_save(&fx);
        let mut recorder = Recorder::default();

        let err = {
            let mut ctx = fx.context(&mut recorder);
            let mut coordinator = RenameCoordinator::new(&mut ctx);
            let err = coordinator.rename(OLD, NEW).unwrap_err();
            assert_eq!(coordinator.state(), RenameState::RolledBack);
            err
        };

        match err {
            SnipError::RenameFailed {
                failed,
                moved,
                unmoved,
                rollback,
                ..
            } => {
                assert_eq!(failed, ArtifactKind::Index);
                assert_eq!(moved, ArtifactKind::FILESYSTEM.to_vec());
                assert!(unmoved.is_empty());
                assert_eq!(rollback, RollbackOutcome::Restored);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(fx.library.find(OLD).is_some());
        assert!(fx.library.find(NEW).is_none());
        for kind in ArtifactKind::FILESYSTEM {
            assert!(fx.store.exists(OLD, kind));
            assert!(!fx.store.exists(NEW, kind));
        }
        assert_eq!(fx.store.frames(OLD).unwrap().len(), 2);
        assert_eq!(recorder.0, [OLD, NEW]);
    }

    #[test]
    fn test_save_failure_keeps_preview_that_could_not_move() {
        let mut fx = Fixture::new();
        fx.seed(OLD, 3, true);
        fs::create_dir_all(fx.store.flipbook_dir(NEW)).unwrap();
        block_index_save(&fx);
        let mut recorder = Recorder::default();

        let err = {
            let mut ctx = fx.context(&mut recorder);
            RenameCoordinator::new(&mut ctx).rename(OLD, NEW).unwrap_err()
        };

        match err {
            SnipError::RenameFailed {
                moved,
                unmoved,
                rollback,
                ..
            } => {
                assert_eq!(moved, vec![ArtifactKind::Snip, ArtifactKind::Snapshot]);
                assert_eq!(unmoved, vec![ArtifactKind::Flipbook]);
                assert_eq!(rollback, RollbackOutcome::Restored);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The restored record still points at a flipbook that exists
        let record = fx.library.find(OLD).unwrap();
        assert_eq!(record.flipbook, Some(SnipRecord::flipbook_reference(OLD)));
        assert_eq!(fx.store.frames(OLD).unwrap().len(), 3);
        assert!(fx.store.exists(OLD, ArtifactKind::Snip));
        assert!(fx.store.exists(OLD, ArtifactKind::Snapshot));
    }
}
