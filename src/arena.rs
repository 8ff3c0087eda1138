//! Two-tier memory for hub round trips.
//!
//! Per-request scratch (request URI, raw response body, serialized message,
//! outgoing envelope) lives in a [`TransientArena`] whose buffers are cleared
//! wholesale by [`ArenaManager::reset_transient`]. Values handed back to
//! callers are owned copies; parsed hub structures borrow from the arena, so
//! the borrow checker rejects any attempt to keep them across a reset.

use tracing::debug;

use crate::error::{FarcasterError, Result};

/// Capacity each buffer may keep across resets. Anything above this is
/// released so one large response does not pin memory.
pub const RETAINED_CAPACITY: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub struct TransientArena {
    pub(crate) uri: String,
    pub(crate) body: Vec<u8>,
    pub(crate) payload: Vec<u8>,
    pub(crate) envelope: Vec<u8>,
}

impl TransientArena {
    /// Bytes currently held by live scratch data.
    pub fn in_use(&self) -> usize {
        self.uri.len() + self.body.len() + self.payload.len() + self.envelope.len()
    }

    /// Bytes reserved across all buffers.
    pub fn capacity(&self) -> usize {
        self.uri.capacity() + self.body.capacity() + self.payload.capacity() + self.envelope.capacity()
    }

    /// Reserve room for `additional` body bytes, reporting allocation failure
    /// instead of aborting.
    pub(crate) fn reserve_body(&mut self, additional: usize) -> Result<()> {
        self.body.try_reserve(additional)?;
        Ok(())
    }

    fn clear(&mut self) {
        self.uri.clear();
        self.body.clear();
        self.payload.clear();
        self.envelope.clear();
        self.uri.shrink_to(RETAINED_CAPACITY);
        self.body.shrink_to(RETAINED_CAPACITY);
        self.payload.shrink_to(RETAINED_CAPACITY);
        self.envelope.shrink_to(RETAINED_CAPACITY);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Number of transient resets.
    pub resets: u64,
    /// Largest transient footprint observed at reset time.
    pub high_water_bytes: usize,
    /// Bytes copied into caller-owned results.
    pub persisted_bytes: u64,
}

/// Owns the transient arena (created on first use) and accounts for what
/// gets copied out to callers.
#[derive(Debug, Default)]
pub struct ArenaManager {
    transient: Option<TransientArena>,
    stats: ArenaStats,
}

impl ArenaManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transient(&mut self) -> &mut TransientArena {
        self.transient.get_or_insert_with(|| {
            debug!("transient arena created");
            TransientArena::default()
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.transient.is_some()
    }

    /// Drop every transient allocation made since the last reset.
    pub fn reset_transient(&mut self) {
        if let Some(arena) = self.transient.as_mut() {
            self.stats.high_water_bytes = self.stats.high_water_bytes.max(arena.in_use());
            arena.clear();
        }
        self.stats.resets += 1;
    }

    /// Copy the response body out of the arena into a caller-owned string.
    /// A body that is not UTF-8 is an `InvalidMessage` error.
    pub fn persist_body(&mut self) -> Result<String> {
        let Some(arena) = self.transient.as_ref() else {
            return Ok(String::new());
        };
        let text = std::str::from_utf8(&arena.body).map_err(|err| {
            FarcasterError::invalid_message(format!("hub response is not UTF-8: {err}"))
        })?;
        self.stats.persisted_bytes += text.len() as u64;
        Ok(text.to_owned())
    }

    /// Account for a value already copied out of the arena.
    pub fn note_persisted(&mut self, bytes: usize) {
        self.stats.persisted_bytes += bytes as u64;
    }

    pub fn stats(&self) -> ArenaStats {
        self.stats
    }
}
