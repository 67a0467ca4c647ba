use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::{Result, RpcError};

/// Raw result slot of a response, or why there will be none
pub(crate) type Outcome = Result<Vec<u8>>;

/// Continuation run exactly once when a call resolves
pub(crate) type Completion = Box<dyn FnOnce(Outcome) + Send>;

struct Entry {
    complete: Completion,
    deadline: Option<Instant>,
}

#[derive(Default)]
struct Table {
    entries: HashMap<u32, Entry>,
    closed: bool,
}

/// Calls sent but not yet answered, keyed by call id.
///
/// Continuations run outside the lock so they may take as long as they like.
#[derive(Default)]
pub(crate) struct PendingCalls {
    table: Mutex<Table>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        call_id: u32,
        deadline: Option<Instant>,
        complete: Completion,
    ) -> Result<()> {
        let mut table = self.table.lock();
        if table.closed {
            return Err(RpcError::ConnectionLost);
        }
        if table.entries.contains_key(&call_id) {
            return Err(RpcError::CallIdCollision(call_id));
        }
        table.entries.insert(call_id, Entry { complete, deadline });
        Ok(())
    }

    /// Forget a call without resolving it
    pub fn remove(&self, call_id: u32) -> bool {
        self.table.lock().entries.remove(&call_id).is_some()
    }

    /// Resolve `call_id`; false if nothing was waiting for it
    pub fn complete(&self, call_id: u32, outcome: Outcome) -> bool {
        let entry = self.table.lock().entries.remove(&call_id);
        match entry {
            Some(entry) => {
                (entry.complete)(outcome);
                true
            }
            None => false,
        }
    }

    /// Fail every call whose deadline is at or before `now`
    pub fn expire(&self, now: Instant) -> usize {
        let expired: Vec<(u32, Entry)> = {
            let mut table = self.table.lock();
            let ids: Vec<u32> = table
                .entries
                .iter()
                .filter(|(_, e)| e.deadline.is_some_and(|d| d <= now))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| table.entries.remove(&id).map(|e| (id, e)))
                .collect()
        };

        let count = expired.len();
        for (call_id, entry) in expired {
            tracing::debug!(call_id, "call deadline exceeded");
            (entry.complete)(Err(RpcError::DeadlineExceeded { call_id }));
        }
        count
    }

    /// Refuse new calls and fail every outstanding one with `error()`
    pub fn close(&self, error: impl Fn() -> RpcError) -> usize {
        let drained: Vec<Entry> = {
            let mut table = self.table.lock();
            table.closed = true;
            table.entries.drain().map(|(_, e)| e).collect()
        };

        let count = drained.len();
        for entry in drained {
            (entry.complete)(Err(error()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    pub fn is_closed(&self) -> bool {
        self.table.lock().closed
    }
}
