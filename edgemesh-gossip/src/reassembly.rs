//! Snapshot fragment reassembly.
//!
//! `STATE` fragments for one snapshot share a `frag_id`; the buffer
//! collects them until all arrive, then hands back the concatenated
//! snapshot bytes. Partial snapshots are discarded once their deadline
//! passes — the sender will be asked again on a later tick.

use crate::{GossipError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

struct Pending {
    total: u16,
    parts: Vec<Option<Vec<u8>>>,
    received: usize,
    deadline: Instant,
}

/// Collects `STATE` fragments into complete snapshots.
pub struct ReassemblyBuffer {
    pending: HashMap<Uuid, Pending>,
    timeout: Duration,
}

impl ReassemblyBuffer {
    /// Creates a buffer that discards partial snapshots after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            timeout,
        }
    }

    /// Accepts one fragment.
    ///
    /// Returns the full snapshot bytes once the last fragment lands,
    /// `None` while parts are still missing. Duplicate fragments are
    /// ignored; fragments that contradict the buffered `total` are errors.
    pub fn insert(
        &mut self,
        frag_id: Uuid,
        index: u16,
        total: u16,
        payload: &str,
        now: Instant,
    ) -> Result<Option<Vec<u8>>> {
        if total == 0 || index >= total {
            return Err(GossipError::MalformedFragment(format!(
                "fragment {index}/{total}"
            )));
        }

        let chunk = BASE64
            .decode(payload)
            .map_err(|err| GossipError::MalformedFragment(format!("bad base64: {err}")))?;

        let pending = self.pending.entry(frag_id).or_insert_with(|| Pending {
            total,
            parts: vec![None; total as usize],
            received: 0,
            deadline: now + self.timeout,
        });
        if pending.total != total {
            return Err(GossipError::MalformedFragment(format!(
                "total changed from {} to {total}",
                pending.total
            )));
        }

        let slot = &mut pending.parts[index as usize];
        if slot.is_none() {
            *slot = Some(chunk);
            pending.received += 1;
        }

        if pending.received == pending.total as usize {
            let pending = self.pending.remove(&frag_id).expect("entry exists");
            let mut bytes = Vec::new();
            for part in pending.parts {
                bytes.extend_from_slice(&part.expect("all parts received"));
            }
            return Ok(Some(bytes));
        }
        Ok(None)
    }

    /// Discards partial snapshots whose deadline has passed.
    pub fn sweep(&mut self, now: Instant) {
        let before = self.pending.len();
        self.pending.retain(|_, pending| pending.deadline > now);
        let dropped = before - self.pending.len();
        if dropped > 0 {
            debug!(dropped, "discarded stale snapshot fragments");
        }
    }

    /// Number of snapshots still being assembled.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
