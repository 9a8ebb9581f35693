//! Refcounted device contexts.
//!
//! RX and TX for the same physical radio must share one hardware handle.
//! Each driver keeps a [`ContextTable`] keyed by device identifier: the
//! first `acquire` opens the hardware, later ones bump the refcount, and
//! the last `release` closes it. The invariant: an entry exists in the
//! table iff its refcount is positive.

use crate::SdrResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

struct Entry<H> {
    handle: Arc<H>,
    refcount: usize,
}

/// Identifier-keyed table of shared device handles.
pub struct ContextTable<H> {
    entries: Mutex<HashMap<String, Entry<H>>>,
}

impl<H> Default for ContextTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> ContextTable<H> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the context for `identifier`, opening the device through
    /// `open` only when no context exists yet.
    pub fn acquire(
        &self,
        identifier: &str,
        open: impl FnOnce() -> SdrResult<H>,
    ) -> SdrResult<Arc<H>> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(identifier) {
            entry.refcount += 1;
            debug!(identifier, refcount = entry.refcount, "context reused");
            return Ok(entry.handle.clone());
        }
        let handle = Arc::new(open()?);
        entries.insert(
            identifier.to_string(),
            Entry {
                handle: handle.clone(),
                refcount: 1,
            },
        );
        debug!(identifier, "context opened");
        Ok(handle)
    }

    /// Drop one reference; the last one removes the entry and hands the
    /// handle to `close` for hardware shutdown.
    pub fn release(&self, identifier: &str, close: impl FnOnce(&H)) {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(identifier) else {
            return;
        };
        entry.refcount -= 1;
        if entry.refcount == 0 {
            let entry = entries.remove(identifier).unwrap();
            debug!(identifier, "context closed");
            close(&entry.handle);
        }
    }

    /// Current refcount, zero when absent.
    pub fn refcount(&self, identifier: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .get(identifier)
            .map_or(0, |e| e.refcount)
    }
}
