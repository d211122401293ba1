use std::time::{Duration, Instant};

/// Last-write-wins debouncer, driven by polling from the owner's tick.
///
/// Every `schedule` replaces the pending value and restarts the quiet
/// period. A value is released by `poll_at` only once `now` reaches the
/// deadline of the latest `schedule`, so each settled burst yields exactly
/// one emission carrying the final value.
#[derive(Debug)]
pub struct Debouncer<T> {
    pending: Option<Pending<T>>,
}

#[derive(Debug)]
struct Pending<T> {
    value: T,
    scheduled_at: Instant,
    deadline: Instant,
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> Debouncer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, value: T, delay: Duration) {
        self.schedule_at(value, delay, Instant::now());
    }

    pub fn schedule_at(&mut self, value: T, delay: Duration, now: Instant) {
        let deadline = now.checked_add(delay).unwrap_or(now);
        self.pending = Some(Pending {
            value,
            scheduled_at: now,
            deadline,
        });
    }

    pub fn poll(&mut self) -> Option<T> {
        self.poll_at(Instant::now())
    }

    pub fn poll_at(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some(pending) if now >= pending.deadline => self.pending.take().map(|p| p.value),
            _ => None,
        }
    }

    /// Releases the pending value immediately, ignoring the deadline.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.value)
    }

    /// Drops the pending value; nothing is emitted for it afterwards.
    /// Returns whether a value was discarded.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    pub fn pending_since(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.scheduled_at)
    }
}
