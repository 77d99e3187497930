use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Coordinates the process handler and the cleanup sweeper on a task's
/// artifact directory.
///
/// A directory is either free, in use by one or more processing requests,
/// or being reclaimed by the sweeper. In-use and reclaiming exclude each other.
#[derive(Default)]
pub struct ArtifactLeases {
    entries: Mutex<HashMap<String, LeaseEntry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaseEntry {
    InUse(usize),
    Reclaiming,
}

impl ArtifactLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` while the sweeper is reclaiming `task_id`.
    pub fn acquire(self: &Arc<Self>, task_id: &str) -> Option<ArtifactLease> {
        let mut entries = self.lock();
        match entries.get_mut(task_id) {
            Some(LeaseEntry::Reclaiming) => return None,
            Some(LeaseEntry::InUse(count)) => *count += 1,
            None => {
                entries.insert(task_id.to_string(), LeaseEntry::InUse(1));
            }
        }
        Some(ArtifactLease {
            leases: self.clone(),
            task_id: task_id.to_string(),
        })
    }

    /// Returns `None` while any lease on `task_id` is held.
    pub fn begin_reclaim(self: &Arc<Self>, task_id: &str) -> Option<ReclaimGuard> {
        let mut entries = self.lock();
        if entries.contains_key(task_id) {
            return None;
        }
        entries.insert(task_id.to_string(), LeaseEntry::Reclaiming);
        Some(ReclaimGuard {
            leases: self.clone(),
            task_id: task_id.to_string(),
        })
    }

    fn release(&self, task_id: &str) {
        let mut entries = self.lock();
        if let Some(LeaseEntry::InUse(count)) = entries.get_mut(task_id) {
            if *count > 1 {
                *count -= 1;
            } else {
                entries.remove(task_id);
            }
        }
    }

    fn finish_reclaim(&self, task_id: &str) {
        let mut entries = self.lock();
        if entries.get(task_id) == Some(&LeaseEntry::Reclaiming) {
            entries.remove(task_id);
        }
    }

    // The map holds no invariants a panicking holder could break halfway.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, LeaseEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Held by a processing request; released on drop.
pub struct ArtifactLease {
    leases: Arc<ArtifactLeases>,
    task_id: String,
}

impl Drop for ArtifactLease {
    fn drop(&mut self) {
        self.leases.release(&self.task_id);
    }
}

/// Held by the sweeper while it deletes a directory; released on drop.
pub struct ReclaimGuard {
    leases: Arc<ArtifactLeases>,
    task_id: String,
}

impl Drop for ReclaimGuard {
    fn drop(&mut self) {
        self.leases.finish_reclaim(&self.task_id);
    }
}
