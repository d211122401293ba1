use time::OffsetDateTime;

mod debounce;

pub use debounce::Debouncer;

/// Durable-write state of a note store, for status display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    /// Nothing written yet in this session and nothing pending.
    Clean,
    Pending {
        since: OffsetDateTime,
    },
    Saved {
        at: OffsetDateTime,
        notes: usize,
    },
    Error {
        message: String,
        occurred_at: OffsetDateTime,
    },
}

impl CommitStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, CommitStatus::Pending { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitEvent {
    Saved {
        notes: usize,
        timestamp: OffsetDateTime,
    },
    Error {
        message: String,
    },
}
