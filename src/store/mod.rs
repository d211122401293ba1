//! The note store: canonical collection, current draft, undo/redo and the
//! debounced path to durable storage.
//!
//! Every collection mutation funnels through `collection_changed`, which
//! hands the latest snapshot to the debouncer. `tick` is the only place
//! deferred work happens: it delivers external changes and commits a settled
//! snapshot.

use std::time::{Duration, Instant};

use anyhow::Result;
use time::OffsetDateTime;

use crate::config::AppConfig;
use crate::history::History;
use crate::ids;
use crate::journaling::{CommitEvent, CommitStatus, Debouncer};
use crate::model::{Draft, Note, NoteField, NoteId};
use crate::storage::{NotesSlot, Subscription};

mod conflict;

pub use conflict::DraftConflict;

#[derive(Debug, Clone, PartialEq, Eq)]
struct HistoryEntry {
    draft: Draft,
    /// Identifier assigned by the edit that followed this snapshot, if that
    /// edit created the note.
    created: Option<NoteId>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub external_applied: bool,
    pub commit: Option<CommitEvent>,
}

#[derive(Debug)]
pub struct NoteStore {
    slot: NotesSlot,
    subscription: Option<Subscription>,
    notes: Vec<Note>,
    draft: Option<Draft>,
    pending_delete: Option<Note>,
    conflict: Option<DraftConflict>,
    history: History<HistoryEntry>,
    pending: Debouncer<Vec<Note>>,
    debounce: Duration,
    status: CommitStatus,
    shut_down: bool,
}

impl NoteStore {
    pub fn open(config: &AppConfig) -> Result<Self> {
        let slot = NotesSlot::open(&config.storage)?;
        Ok(Self::with_slot(slot, config))
    }

    pub fn with_slot(mut slot: NotesSlot, config: &AppConfig) -> Self {
        let notes = slot.load();
        observe_ids(&notes);
        let subscription = slot.subscribe_external_change();
        tracing::info!(
            notes = notes.len(),
            context = %slot.context(),
            "note store ready"
        );
        Self {
            slot,
            subscription: Some(subscription),
            notes,
            draft: None,
            pending_delete: None,
            conflict: None,
            history: History::new(config.history.max_depth),
            pending: Debouncer::new(),
            debounce: config.store.debounce(),
            status: CommitStatus::Clean,
            shut_down: false,
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    pub fn pending_delete(&self) -> Option<&Note> {
        self.pending_delete.as_ref()
    }

    pub fn conflict(&self) -> Option<&DraftConflict> {
        self.conflict.as_ref()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn has_pending_write(&self) -> bool {
        self.pending.is_pending()
    }

    pub fn commit_status(&self) -> &CommitStatus {
        &self.status
    }

    pub fn slot(&self) -> &NotesSlot {
        &self.slot
    }

    pub fn start_new_draft(&mut self) {
        self.draft = Some(Draft::default());
        self.conflict = None;
    }

    pub fn open_draft(&mut self, note: &Note) {
        self.draft = Some(Draft::from(note));
        self.conflict = None;
    }

    pub fn close_draft(&mut self) {
        self.draft = None;
        self.conflict = None;
    }

    /// Applies one field edit to the draft and mirrors it into the
    /// collection. A draft without an identifier gets one here and is
    /// appended.
    pub fn edit_field(&mut self, field: NoteField, value: impl Into<String>) {
        let before = self.draft.take().unwrap_or_default();
        let mut next = before.with_field(field, value);
        let created = match next.id {
            Some(_) => None,
            None => {
                let id = ids::next();
                next.id = Some(id);
                Some(id)
            }
        };
        self.history.record(HistoryEntry {
            draft: before,
            created,
        });
        if let Some(note) = next.to_note() {
            self.upsert(note);
        }
        if let Some(id) = created {
            tracing::debug!(%id, "created note");
        }
        self.draft = Some(next);
        self.conflict = None;
        self.collection_changed();
    }

    pub fn request_delete(&mut self, note: &Note) {
        self.pending_delete = Some(note.clone());
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Removes the note awaiting confirmation. Returns `false` when nothing
    /// was pending.
    pub fn confirm_delete(&mut self) -> bool {
        let Some(target) = self.pending_delete.take() else {
            return false;
        };
        let before = self.notes.len();
        self.notes.retain(|note| note.id != target.id);
        if self.draft.as_ref().and_then(|draft| draft.id) == Some(target.id) {
            self.draft = None;
            self.conflict = None;
        }
        if self.notes.len() != before {
            tracing::debug!(id = %target.id, "deleted note");
            self.collection_changed();
        }
        true
    }

    /// Restores the draft as it was before the latest edit. Undoing the edit
    /// that created a note removes that note again.
    pub fn undo(&mut self) -> bool {
        let current = match self.history.peek_undo() {
            Some(entry) => self.current_entry(entry),
            None => return false,
        };
        let Some(entry) = self.history.undo(current) else {
            return false;
        };
        tracing::debug!(
            undo = self.history.undo_depth(),
            redo = self.history.redo_depth(),
            "undo"
        );
        let changed = match (entry.draft.to_note(), entry.created) {
            (Some(note), _) => self.upsert(note),
            (None, Some(created)) => self.remove(created),
            (None, None) => false,
        };
        self.draft = Some(entry.draft);
        self.conflict = None;
        if changed {
            self.collection_changed();
        }
        true
    }

    pub fn redo(&mut self) -> bool {
        let current = match self.history.peek_redo() {
            Some(entry) => self.current_entry(entry),
            None => return false,
        };
        let Some(entry) = self.history.redo(current) else {
            return false;
        };
        tracing::debug!(
            undo = self.history.undo_depth(),
            redo = self.history.redo_depth(),
            "redo"
        );
        let changed = match entry.draft.to_note() {
            Some(note) => self.upsert(note),
            None => false,
        };
        self.draft = Some(entry.draft);
        self.conflict = None;
        if changed {
            self.collection_changed();
        }
        true
    }

    /// Replaces the draft with the external version of its note, or closes
    /// it when the note was removed elsewhere.
    pub fn adopt_external(&mut self) -> bool {
        match self.conflict.take() {
            Some(DraftConflict::ChangedExternally { external, .. }) => {
                self.draft = Some(Draft::from(&external));
                true
            }
            Some(DraftConflict::RemovedExternally { .. }) => {
                self.draft = None;
                true
            }
            None => false,
        }
    }

    pub fn tick(&mut self) -> TickReport {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        if self.shut_down {
            return report;
        }
        self.slot.pump();
        if let Some(external) = self.subscription.as_ref().and_then(Subscription::latest) {
            self.apply_external(external);
            report.external_applied = true;
        }
        if let Some(snapshot) = self.pending.poll_at(now) {
            report.commit = Some(self.commit(&snapshot));
        }
        report
    }

    /// Commits a pending snapshot without waiting for the quiet period.
    pub fn flush(&mut self) -> Option<CommitEvent> {
        let snapshot = self.pending.flush()?;
        Some(self.commit(&snapshot))
    }

    /// Cancels the pending write and the external-change subscription.
    /// Later mutations stay in memory only.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        if self.pending.cancel() {
            tracing::debug!("discarded pending notes write on shutdown");
        }
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.shut_down = true;
        tracing::info!("note store shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn apply_external(&mut self, notes: Vec<Note>) {
        observe_ids(&notes);
        if self.pending.cancel() {
            tracing::debug!("external change superseded pending local write");
            self.status = CommitStatus::Clean;
        }
        self.notes = notes;
        self.conflict = DraftConflict::detect(self.draft.as_ref(), &self.notes);
        if let Some(conflict) = &self.conflict {
            tracing::info!(id = %conflict.note_id(), ?conflict, "draft diverged from external change");
        }
        tracing::debug!(notes = self.notes.len(), "applied external notes change");
    }

    fn commit(&mut self, snapshot: &[Note]) -> CommitEvent {
        let timestamp = OffsetDateTime::now_utc();
        match self.slot.save(snapshot) {
            Ok(_) => {
                self.status = CommitStatus::Saved {
                    at: timestamp,
                    notes: snapshot.len(),
                };
                CommitEvent::Saved {
                    notes: snapshot.len(),
                    timestamp,
                }
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(%message, "committing notes failed");
                self.status = CommitStatus::Error {
                    message: message.clone(),
                    occurred_at: timestamp,
                };
                CommitEvent::Error { message }
            }
        }
    }

    fn collection_changed(&mut self) {
        if self.shut_down {
            return;
        }
        self.pending.schedule(self.notes.clone(), self.debounce);
        if !self.status.is_pending() {
            self.status = CommitStatus::Pending {
                since: OffsetDateTime::now_utc(),
            };
        }
    }

    /// Snapshot of the note `target` is about to overwrite. When the draft
    /// is closed or belongs to another note, the stored copy is used so the
    /// opposite stack can restore it.
    fn current_entry(&self, target: &HistoryEntry) -> HistoryEntry {
        let draft = match (self.draft.as_ref(), target.created.or(target.draft.id)) {
            (Some(draft), Some(id)) if draft.id == Some(id) => draft.clone(),
            (draft, Some(id)) => match self.note(id) {
                Some(note) => Draft::from(note),
                None => draft.cloned().unwrap_or_default(),
            },
            (draft, None) => draft.cloned().unwrap_or_default(),
        };
        HistoryEntry {
            draft,
            created: target.created,
        }
    }

    fn upsert(&mut self, note: Note) -> bool {
        match self.notes.iter_mut().find(|existing| existing.id == note.id) {
            Some(existing) if *existing == note => false,
            Some(existing) => {
                *existing = note;
                true
            }
            None => {
                self.notes.push(note);
                true
            }
        }
    }

    fn remove(&mut self, id: NoteId) -> bool {
        let before = self.notes.len();
        self.notes.retain(|note| note.id != id);
        self.notes.len() != before
    }
}

fn observe_ids(notes: &[Note]) {
    if let Some(max) = notes.iter().map(|note| note.id).max() {
        ids::observe(max);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::{Duration, Instant};

    use assert_matches::assert_matches;
    use tempfile::TempDir;

    use super::*;
    use crate::config::StorageOptions;
    use crate::storage::{SlotStore, NOTES_KEY};

    const DEBOUNCE: Duration = Duration::from_secs(60);

    fn options(temp: &TempDir) -> StorageOptions {
        StorageOptions::at(temp.path().join("data").join("notes.db"))
    }

    fn open_store(temp: &TempDir) -> anyhow::Result<NoteStore> {
        let mut config = AppConfig::default();
        config.store.debounce_ms = DEBOUNCE.as_millis() as u64;
        config.storage = options(temp);
        NoteStore::open(&config)
    }

    fn settled() -> Instant {
        Instant::now() + DEBOUNCE * 2
    }

    fn create_note(store: &mut NoteStore, title: &str, content: &str) -> Note {
        store.start_new_draft();
        store.edit_field(NoteField::Title, title);
        store.edit_field(NoteField::Content, content);
        let id = store.draft().and_then(|draft| draft.id).expect("id assigned");
        store.note(id).cloned().expect("note stored")
    }

    #[test]
    fn every_new_note_gets_a_unique_id() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        for n in 0..50 {
            store.start_new_draft();
            store.edit_field(NoteField::Title, format!("note {n}"));
        }
        let ids = store.notes().iter().map(|note| note.id).collect::<HashSet<_>>();
        assert_eq!(store.notes().len(), 50);
        assert_eq!(ids.len(), 50);
        Ok(())
    }

    #[test]
    fn first_edit_appends_and_later_edits_update_in_place() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        let first = create_note(&mut store, "first", "one");
        let second = create_note(&mut store, "second", "two");
        let third = create_note(&mut store, "third", "three");

        store.open_draft(&second);
        store.edit_field(NoteField::Content, "TWO");

        let notes = store.notes();
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0], first);
        assert_eq!(notes[1], Note::new(second.id, "second", "TWO"));
        assert_eq!(notes[2], third);
        Ok(())
    }

    #[test]
    fn draft_missing_from_collection_is_reinserted() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        let ghost = Note::new(ids::next(), "ghost", "");
        store.open_draft(&ghost);
        store.edit_field(NoteField::Content, "boo");
        assert_eq!(store.notes(), &[Note::new(ghost.id, "ghost", "boo")]);
        Ok(())
    }

    #[test]
    fn rapid_edits_produce_one_durable_write() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        store.start_new_draft();
        for len in 1..=5 {
            store.edit_field(NoteField::Title, "abcde"[..len].to_string());
        }
        assert!(store.has_pending_write());
        assert!(store.commit_status().is_pending());

        assert_eq!(store.tick_at(Instant::now()).commit, None);
        assert_eq!(store.slot().revision()?, None);

        let report = store.tick_at(settled());
        assert_matches!(report.commit, Some(CommitEvent::Saved { notes: 1, .. }));
        assert_eq!(store.tick_at(settled()).commit, None);
        assert_eq!(store.slot().revision()?, Some(1));

        let reader = NotesSlot::open(&options(&temp))?;
        let stored = reader.load();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "abcde");
        Ok(())
    }

    #[test]
    fn deletion_restarts_the_shared_timer() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        let keep = create_note(&mut store, "keep", "");
        let drop_me = create_note(&mut store, "drop", "");
        store.request_delete(&drop_me);
        assert!(store.confirm_delete());

        store.tick_at(settled());
        assert_eq!(store.slot().revision()?, Some(1));
        assert_eq!(NotesSlot::open(&options(&temp))?.load(), vec![keep]);
        Ok(())
    }

    #[test]
    fn undo_and_redo_are_inverses() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        let note = create_note(&mut store, "title", "draft");
        let before = store.draft().cloned();

        store.edit_field(NoteField::Content, "draft, revised");
        let after = store.draft().cloned();

        assert!(store.undo());
        assert_eq!(store.draft().cloned(), before);
        assert_eq!(store.note(note.id), Some(&note));

        assert!(store.redo());
        assert_eq!(store.draft().cloned(), after);
        assert_eq!(
            store.note(note.id).map(|n| n.content.as_str()),
            Some("draft, revised")
        );
        Ok(())
    }

    #[test]
    fn undo_and_redo_report_empty_stacks() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        assert!(!store.can_undo());
        assert!(!store.can_redo());
        assert!(!store.undo());
        assert!(!store.redo());
        assert!(store.draft().is_none());
        assert!(!store.has_pending_write());
        Ok(())
    }

    #[test]
    fn new_edit_after_undo_discards_redo() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        create_note(&mut store, "a", "b");
        assert!(store.undo());
        assert!(store.can_redo());

        store.edit_field(NoteField::Content, "c");
        assert!(!store.can_redo());
        let draft = store.draft().cloned();
        assert!(!store.redo());
        assert_eq!(store.draft().cloned(), draft);
        Ok(())
    }

    #[test]
    fn undoing_creation_removes_the_note() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        let existing = create_note(&mut store, "existing", "");

        store.start_new_draft();
        store.edit_field(NoteField::Title, "n");
        let created = store.draft().and_then(|draft| draft.id).expect("id");
        assert_eq!(store.notes().len(), 2);

        assert!(store.undo());
        assert_eq!(store.draft(), Some(&Draft::default()));
        assert_eq!(store.notes(), &[existing.clone()]);

        assert!(store.redo());
        assert_eq!(
            store.notes(),
            &[existing, Note::new(created, "n", "")]
        );
        assert_eq!(store.draft().and_then(|draft| draft.id), Some(created));

        // Undo again goes back through the creation, not around it.
        assert!(store.undo());
        assert_eq!(store.notes().len(), 1);
        Ok(())
    }

    #[test]
    fn redo_restores_creation_undone_after_closing_the_form() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        store.start_new_draft();
        store.edit_field(NoteField::Title, "x");
        let created = store.draft().and_then(|draft| draft.id).expect("id");
        store.close_draft();

        assert!(store.undo());
        assert!(store.notes().is_empty());

        assert!(store.redo());
        assert_eq!(store.note(created), Some(&Note::new(created, "x", "")));
        assert_eq!(store.draft().and_then(|draft| draft.id), Some(created));

        assert!(store.undo());
        assert!(store.notes().is_empty());
        assert!(store.redo());
        assert_eq!(store.note(created).map(|note| note.title.as_str()), Some("x"));
        Ok(())
    }

    #[test]
    fn undo_restores_notes_across_draft_switches() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        let alpha = create_note(&mut store, "alpha", "");
        let beta = create_note(&mut store, "beta", "");

        store.open_draft(&alpha);
        store.edit_field(NoteField::Content, "alpha body");
        store.open_draft(&beta);
        store.edit_field(NoteField::Content, "beta body");

        assert!(store.undo());
        assert_eq!(store.note(beta.id), Some(&beta));
        assert!(store.undo());
        assert_eq!(store.note(alpha.id), Some(&alpha));
        assert_eq!(store.draft(), Some(&Draft::from(&alpha)));
        Ok(())
    }

    #[test]
    fn delete_requires_confirmation() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        let first = create_note(&mut store, "first", "");
        let second = create_note(&mut store, "second", "");

        store.request_delete(&first);
        assert_eq!(store.pending_delete(), Some(&first));
        store.cancel_delete();
        assert_eq!(store.pending_delete(), None);
        assert_eq!(store.notes().len(), 2);
        assert!(!store.confirm_delete());

        store.request_delete(&first);
        assert!(store.confirm_delete());
        assert_eq!(store.notes(), &[second]);
        assert_eq!(store.pending_delete(), None);
        Ok(())
    }

    #[test]
    fn deleting_the_open_note_closes_the_draft() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        let note = create_note(&mut store, "doomed", "");
        store.request_delete(&note);
        store.confirm_delete();
        assert!(store.draft().is_none());
        assert!(store.notes().is_empty());
        Ok(())
    }

    #[test]
    fn corrupt_storage_opens_empty() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut raw = SlotStore::open(&options(&temp))?;
        raw.write(NOTES_KEY, "not json")?;

        let store = open_store(&temp)?;
        assert!(store.notes().is_empty());
        Ok(())
    }

    #[test]
    fn external_change_replaces_the_collection() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let seeded = Note::new(NoteId(1), "x", "");
        NotesSlot::open(&options(&temp))?.save(&[seeded.clone()])?;

        let mut tab_a = open_store(&temp)?;
        let mut tab_b = open_store(&temp)?;
        assert_eq!(tab_a.notes(), &[seeded.clone()]);

        tab_b.request_delete(&seeded);
        tab_b.confirm_delete();
        assert_matches!(tab_b.flush(), Some(CommitEvent::Saved { notes: 0, .. }));

        let report = tab_a.tick_at(Instant::now());
        assert!(report.external_applied);
        assert!(tab_a.notes().is_empty());
        Ok(())
    }

    #[test]
    fn own_commits_are_not_applied_as_external() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        create_note(&mut store, "mine", "");
        assert!(store.flush().is_some());

        let report = store.tick_at(Instant::now());
        assert!(!report.external_applied);
        assert_eq!(store.notes().len(), 1);
        assert!(store.draft().is_some());
        Ok(())
    }

    #[test]
    fn external_change_surfaces_draft_conflict() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut tab_a = open_store(&temp)?;
        let note = create_note(&mut tab_a, "shared", "v1");
        tab_a.flush();

        let mut tab_b = open_store(&temp)?;
        tab_b.open_draft(&note);
        tab_b.edit_field(NoteField::Content, "from b");
        tab_b.flush();

        tab_a.edit_field(NoteField::Content, "v2 local");
        tab_a.tick_at(Instant::now());

        assert!(!tab_a.has_pending_write(), "external value supersedes the pending write");
        assert_eq!(
            tab_a.note(note.id).map(|n| n.content.as_str()),
            Some("from b")
        );
        assert_eq!(tab_a.draft().map(|d| d.content.as_str()), Some("v2 local"));
        assert!(tab_a.can_undo(), "history survives external changes");
        assert_matches!(
            tab_a.conflict(),
            Some(DraftConflict::ChangedExternally { id, .. }) if *id == note.id
        );

        // Continuing to type re-applies the local draft.
        tab_a.edit_field(NoteField::Content, "v2 local!");
        assert_eq!(tab_a.conflict(), None);
        assert_eq!(
            tab_a.note(note.id).map(|n| n.content.as_str()),
            Some("v2 local!")
        );
        Ok(())
    }

    #[test]
    fn adopting_external_version_replaces_draft() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut tab_a = open_store(&temp)?;
        let note = create_note(&mut tab_a, "shared", "v1");
        tab_a.flush();

        let mut tab_b = open_store(&temp)?;
        tab_b.request_delete(&note);
        tab_b.confirm_delete();
        tab_b.flush();

        tab_a.tick_at(Instant::now());
        assert_matches!(tab_a.conflict(), Some(DraftConflict::RemovedExternally { .. }));
        assert!(tab_a.adopt_external());
        assert!(tab_a.draft().is_none());
        assert!(!tab_a.adopt_external());
        Ok(())
    }

    #[test]
    fn shutdown_cancels_pending_write_and_subscription() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut store = open_store(&temp)?;
        assert_eq!(store.slot().subscriber_count(), 1);
        create_note(&mut store, "unsaved", "");

        store.shutdown();
        store.shutdown();
        assert!(store.is_shut_down());
        assert!(!store.has_pending_write());
        assert_eq!(store.slot().subscriber_count(), 0);

        assert_eq!(store.tick_at(settled()), TickReport::default());
        assert_eq!(store.slot().revision()?, None);
        Ok(())
    }
}
