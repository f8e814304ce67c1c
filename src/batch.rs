//! Debounced mutation queues, one per mutation kind.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::timer::{Scheduler, TimerKey};

pub const DEBOUNCE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    MarkRead,
    MarkUnread,
    MarkDone,
    Unsubscribe,
}

impl MutationKind {
    pub const ALL: [MutationKind; 4] = [
        MutationKind::MarkRead,
        MutationKind::MarkUnread,
        MutationKind::MarkDone,
        MutationKind::Unsubscribe,
    ];

    /// GraphQL mutation issued for a batch of this kind
    pub fn mutation_name(&self) -> &'static str {
        match self {
            MutationKind::MarkRead => "markNotificationsAsRead",
            MutationKind::MarkUnread => "markNotificationsAsUnread",
            MutationKind::MarkDone => "markNotificationsAsDone",
            MutationKind::Unsubscribe => "unsubscribeFromNotifications",
        }
    }

    /// Unsubscribe addresses the PR (subject) rather than the thread
    pub fn targets_subject(&self) -> bool {
        matches!(self, MutationKind::Unsubscribe)
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MutationKind::MarkRead => "mark read",
            MutationKind::MarkUnread => "mark unread",
            MutationKind::MarkDone => "mark done",
            MutationKind::Unsubscribe => "unsubscribe",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub u64);

/// Ids taken from a queue in one flush, sent as a single remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub id: BatchId,
    pub kind: MutationKind,
    pub ids: Vec<String>,
}

#[derive(Debug, Default)]
pub struct BatchQueue {
    pending: Vec<String>,
}

impl BatchQueue {
    /// Returns false if the id was already pending
    fn push(&mut self, id: String) -> bool {
        if self.pending.contains(&id) {
            return false;
        }
        self.pending.push(id);
        true
    }

    fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Owns every mutation queue. Lives in the application state, so tests build
/// isolated instances.
#[derive(Debug)]
pub struct MutationRegistry {
    queues: HashMap<MutationKind, BatchQueue>,
    debounce: Duration,
    next_batch: u64,
}

impl Default for MutationRegistry {
    fn default() -> Self {
        Self::new(DEBOUNCE)
    }
}

impl MutationRegistry {
    pub fn new(debounce: Duration) -> Self {
        Self {
            queues: MutationKind::ALL
                .into_iter()
                .map(|kind| (kind, BatchQueue::default()))
                .collect(),
            debounce,
            next_batch: 0,
        }
    }

    /// Queue `id` and restart the kind's debounce timer.
    /// Returns false if the id was already waiting in this queue.
    pub fn enqueue(
        &mut self,
        kind: MutationKind,
        id: impl Into<String>,
        scheduler: &mut impl Scheduler,
    ) -> bool {
        let added = self.queues.entry(kind).or_default().push(id.into());
        scheduler.schedule(TimerKey::Debounce(kind), self.debounce);
        added
    }

    pub fn queue(&self, kind: MutationKind) -> Option<&BatchQueue> {
        self.queues.get(&kind)
    }

    /// Take everything pending for `kind`. An empty queue yields no batch.
    pub fn take(&mut self, kind: MutationKind) -> Option<Batch> {
        let ids = self.queues.get_mut(&kind)?.drain();
        if ids.is_empty() {
            return None;
        }
        self.next_batch += 1;
        Some(Batch {
            id: BatchId(self.next_batch),
            kind,
            ids,
        })
    }

    /// Take every non-empty queue and disarm all debounce timers
    pub fn take_all(&mut self, scheduler: &mut impl Scheduler) -> Vec<Batch> {
        MutationKind::ALL
            .into_iter()
            .filter_map(|kind| {
                scheduler.cancel(TimerKey::Debounce(kind));
                self.take(kind)
            })
            .collect()
    }

    pub fn is_idle(&self) -> bool {
        self.queues.values().all(BatchQueue::is_empty)
    }
}
