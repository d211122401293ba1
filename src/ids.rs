use std::sync::atomic::{AtomicI64, Ordering};

use time::OffsetDateTime;

use crate::model::NoteId;

/// Largest integer a JSON reader backed by IEEE doubles can hold exactly.
const MAX_SAFE_ID: i64 = (1 << 53) - 1;

static LAST_ISSUED: AtomicI64 = AtomicI64::new(0);

/// Returns an identifier strictly greater than every identifier previously
/// issued or observed in this process.
///
/// Values are microseconds since the Unix epoch, bumped by one when the clock
/// has not advanced since the last call.
pub fn next() -> NoteId {
    let now = now_micros();
    let mut issued = now;
    // fetch_update only fails when the closure returns None, which it never does.
    let _ = LAST_ISSUED.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        issued = if now > last { now } else { last + 1 };
        Some(issued)
    });
    NoteId(issued)
}

/// Raises the floor so that `id` (e.g. loaded from storage written by another
/// process) is never handed out again.
pub fn observe(id: NoteId) {
    LAST_ISSUED.fetch_max(id.get(), Ordering::SeqCst);
}

fn now_micros() -> i64 {
    let micros = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000;
    micros.clamp(0, MAX_SAFE_ID as i128) as i64
}
