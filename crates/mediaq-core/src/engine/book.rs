//! Engine bookkeeping. Always accessed under the engine's mutex.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::job::{Job, JobId};

#[derive(Default)]
pub(super) struct Bookkeeping {
    /// Queued, executing, or finished-successfully jobs.
    pub active: HashMap<JobId, Arc<dyn Job>>,
    /// Failed jobs waiting on their retry signal.
    pub pending_retry: HashMap<JobId, Arc<dyn Job>>,
    /// Ids that were cancelled or failed terminally; never re-admitted.
    ///
    /// Never pruned: forgetting an id would let it be resubmitted, so this grows
    /// by one entry per cancelled or failed job for the life of the engine.
    /// `stats()` reports the current size.
    pub retired: HashSet<JobId>,
}

impl Bookkeeping {
    pub fn knows(&self, id: &str) -> bool {
        self.active.contains_key(id)
            || self.pending_retry.contains_key(id)
            || self.retired.contains(id)
    }

    /// Active first, then pending retry.
    pub fn lookup(&self, id: &str) -> Option<Arc<dyn Job>> {
        self.active
            .get(id)
            .or_else(|| self.pending_retry.get(id))
            .cloned()
    }

    /// Drop `id` from both maps and remember it so it is never re-admitted.
    pub fn retire(&mut self, id: &str) {
        self.active.remove(id);
        self.pending_retry.remove(id);
        self.retired.insert(id.to_string());
    }

    /// Remove `id` from `active` only if it still maps to this very job.
    pub fn take_active(&mut self, id: &str, job: &Arc<dyn Job>) -> Option<Arc<dyn Job>> {
        take_same(&mut self.active, id, job)
    }

    pub fn take_pending(&mut self, id: &str, job: &Arc<dyn Job>) -> Option<Arc<dyn Job>> {
        take_same(&mut self.pending_retry, id, job)
    }

    pub fn is_active(&self, id: &str, job: &Arc<dyn Job>) -> bool {
        self.active
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, job))
    }
}

fn take_same(
    map: &mut HashMap<JobId, Arc<dyn Job>>,
    id: &str,
    job: &Arc<dyn Job>,
) -> Option<Arc<dyn Job>> {
    match map.get(id) {
        Some(current) if Arc::ptr_eq(current, job) => map.remove(id),
        _ => None,
    }
}
