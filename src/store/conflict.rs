use crate::model::{Draft, Note, NoteId};

/// How the open draft relates to a collection that arrived from another
/// context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftConflict {
    /// The note exists externally with a different title or content.
    ChangedExternally { id: NoteId, external: Note },
    /// The note no longer exists in the external collection.
    RemovedExternally { id: NoteId },
}

impl DraftConflict {
    pub fn detect(draft: Option<&Draft>, notes: &[Note]) -> Option<Self> {
        let draft = draft?;
        let id = draft.id?;
        match notes.iter().find(|note| note.id == id) {
            None => Some(DraftConflict::RemovedExternally { id }),
            Some(note) if !draft.matches(note) => Some(DraftConflict::ChangedExternally {
                id,
                external: note.clone(),
            }),
            Some(_) => None,
        }
    }

    pub fn note_id(&self) -> NoteId {
        match self {
            DraftConflict::ChangedExternally { id, .. } | DraftConflict::RemovedExternally { id } => {
                *id
            }
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            DraftConflict::ChangedExternally { .. } => "changed in another window",
            DraftConflict::RemovedExternally { .. } => "deleted in another window",
        }
    }
}
