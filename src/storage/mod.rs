use std::collections::HashSet;
use std::sync::{Arc, Weak};

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;

use crate::config::StorageOptions;
use crate::model::Note;

mod schema;
mod slots;

pub use slots::{ContextId, SlotChange, SlotStore};

/// Slot holding the JSON array of notes.
pub const NOTES_KEY: &str = "notes";

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("encoding notes: {0}")]
    Encode(#[from] serde_json::Error),
}

type Registry = Arc<Mutex<Vec<Subscriber>>>;

#[derive(Debug)]
struct Subscriber {
    id: u64,
    tx: Sender<Vec<Note>>,
}

/// Durable home of the notes collection for one execution context.
///
/// Reads degrade to an empty collection instead of failing. Changes written
/// by other contexts are picked up by `pump` and delivered to every live
/// [`Subscription`].
#[derive(Debug)]
pub struct NotesSlot {
    slots: SlotStore,
    subscribers: Registry,
    next_subscriber: u64,
}

impl NotesSlot {
    pub fn open(options: &StorageOptions) -> Result<Self> {
        Ok(Self::new(SlotStore::open(options)?))
    }

    pub fn new(slots: SlotStore) -> Self {
        Self {
            slots,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscriber: 0,
        }
    }

    pub fn context(&self) -> ContextId {
        self.slots.context()
    }

    pub fn load(&self) -> Vec<Note> {
        match self.slots.read(NOTES_KEY) {
            Ok(Some(raw)) => parse_collection(&raw),
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!(?err, "reading notes slot failed, starting empty");
                Vec::new()
            }
        }
    }

    pub fn save(&mut self, notes: &[Note]) -> Result<i64, SlotError> {
        let json = serde_json::to_string(notes)?;
        let revision = self.slots.write(NOTES_KEY, &json)?;
        tracing::debug!(notes = notes.len(), revision, "committed notes slot");
        Ok(revision)
    }

    pub fn revision(&self) -> Result<Option<i64>, SlotError> {
        self.slots.revision(NOTES_KEY)
    }

    pub fn subscribe_external_change(&mut self) -> Subscription {
        let (tx, rx) = crossbeam_channel::unbounded();
        let id = self.next_subscriber;
        self.next_subscriber += 1;
        self.subscribers.lock().push(Subscriber { id, tx });
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Polls for writes from other contexts and fans the new collection out
    /// to subscribers. Returns how many notes-slot changes were observed.
    pub fn pump(&mut self) -> usize {
        let changes = match self.slots.poll_changes() {
            Ok(changes) => changes,
            Err(err) => {
                tracing::warn!(?err, "polling for external slot changes failed");
                return 0;
            }
        };
        let mut observed = 0;
        for change in changes {
            if change.key != NOTES_KEY {
                continue;
            }
            observed += 1;
            let notes = change
                .value
                .as_deref()
                .map(parse_collection)
                .unwrap_or_default();
            tracing::debug!(notes = notes.len(), "external notes change");
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|subscriber| subscriber.tx.send(notes.clone()).is_ok());
        }
        observed
    }
}

/// Receives external collection changes until dropped or unsubscribed.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: Receiver<Vec<Note>>,
    registry: Weak<Mutex<Vec<Subscriber>>>,
}

impl Subscription {
    pub fn try_recv(&self) -> Option<Vec<Note>> {
        self.rx.try_recv().ok()
    }

    /// Drains everything queued and keeps only the newest collection.
    pub fn latest(&self) -> Option<Vec<Note>> {
        self.rx.try_iter().last()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().retain(|subscriber| subscriber.id != self.id);
        }
    }
}

/// Parses a stored collection. Malformed input yields an empty collection;
/// repeated identifiers keep their first occurrence.
pub fn parse_collection(raw: &str) -> Vec<Note> {
    let notes: Vec<Note> = match serde_json::from_str(raw) {
        Ok(notes) => notes,
        Err(err) => {
            tracing::warn!(%err, "notes slot is not a valid collection, treating as empty");
            return Vec::new();
        }
    };
    let mut seen = HashSet::with_capacity(notes.len());
    let total = notes.len();
    let unique = notes
        .into_iter()
        .filter(|note| seen.insert(note.id))
        .collect::<Vec<_>>();
    if unique.len() != total {
        tracing::warn!(
            dropped = total - unique.len(),
            "notes slot contained duplicate identifiers"
        );
    }
    unique
}
