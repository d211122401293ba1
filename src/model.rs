use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub i64);

impl NoteId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted note. Field names and shape are the on-disk layout of the
/// `notes` slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
}

impl Note {
    pub fn new(id: NoteId, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum NoteField {
    Title,
    Content,
}

impl NoteField {
    pub fn toggle(self) -> Self {
        match self {
            NoteField::Title => NoteField::Content,
            NoteField::Content => NoteField::Title,
        }
    }
}

/// The note currently open for editing. `id` stays `None` until the first
/// field edit assigns one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub id: Option<NoteId>,
    pub title: String,
    pub content: String,
}

impl Draft {
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn field(&self, field: NoteField) -> &str {
        match field {
            NoteField::Title => &self.title,
            NoteField::Content => &self.content,
        }
    }

    pub fn with_field(&self, field: NoteField, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        match field {
            NoteField::Title => next.title = value.into(),
            NoteField::Content => next.content = value.into(),
        }
        next
    }

    /// Converts to a storable note. Drafts without an identifier are not
    /// notes yet.
    pub fn to_note(&self) -> Option<Note> {
        self.id
            .map(|id| Note::new(id, self.title.clone(), self.content.clone()))
    }

    pub fn matches(&self, note: &Note) -> bool {
        self.id == Some(note.id) && self.title == note.title && self.content == note.content
    }
}

impl From<&Note> for Draft {
    fn from(note: &Note) -> Self {
        Self {
            id: Some(note.id),
            title: note.title.clone(),
            content: note.content.clone(),
        }
    }
}
