use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::action::Action;
use crate::batch::MutationKind;

/// Identifies a timer by purpose. At most one instance per key is ever live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Clears the pending key sequence after inactivity
    KeyBuffer,
    /// Flushes one mutation queue
    Debounce(MutationKind),
}

pub trait Scheduler {
    /// Arm `key` to fire after `delay`, replacing any live instance of it.
    fn schedule(&mut self, key: TimerKey, delay: Duration);

    fn cancel(&mut self, key: TimerKey);

    /// Accept a firing. Returns false for firings of cancelled or replaced
    /// instances; a true result disarms the key.
    fn claim(&mut self, key: TimerKey, generation: u64) -> bool;
}

/// Real-time scheduler. Each arming is a sleeping task that posts
/// `Action::TimerFired` back into the event loop.
pub struct TokioScheduler {
    action_tx: mpsc::UnboundedSender<Action>,
    live: HashMap<TimerKey, (u64, AbortHandle)>,
    next_generation: u64,
}

impl TokioScheduler {
    pub fn new(action_tx: mpsc::UnboundedSender<Action>) -> Self {
        Self {
            action_tx,
            live: HashMap::new(),
            next_generation: 0,
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, key: TimerKey, delay: Duration) {
        self.cancel(key);
        self.next_generation += 1;
        let generation = self.next_generation;
        let tx = self.action_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tx.send(Action::TimerFired { key, generation }).ok();
        });
        self.live.insert(key, (generation, task.abort_handle()));
    }

    fn cancel(&mut self, key: TimerKey) {
        if let Some((_, handle)) = self.live.remove(&key) {
            handle.abort();
        }
    }

    fn claim(&mut self, key: TimerKey, generation: u64) -> bool {
        match self.live.get(&key) {
            Some((live, _)) if *live == generation => {
                self.live.remove(&key);
                true
            }
            _ => false,
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, (_, handle)) in self.live.drain() {
            handle.abort();
        }
    }
}

/// Simulated-time scheduler for deterministic tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    live: HashMap<TimerKey, (u64, Duration)>,
    next_generation: u64,
}

#[cfg(test)]
impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self, key: TimerKey) -> bool {
        self.live.contains_key(&key)
    }

    /// Move the clock forward and return the firings that came due, in deadline order.
    /// Fired timers stay live until claimed, matching how the real scheduler delivers them.
    pub fn advance(&mut self, by: Duration) -> Vec<(TimerKey, u64)> {
        self.now += by;
        let mut due: Vec<_> = self
            .live
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= self.now)
            .map(|(key, (generation, deadline))| (*deadline, *key, *generation))
            .collect();
        due.sort_by_key(|(deadline, _, generation)| (*deadline, *generation));
        due.into_iter()
            .map(|(_, key, generation)| (key, generation))
            .collect()
    }
}

#[cfg(test)]
impl Scheduler for ManualScheduler {
    fn schedule(&mut self, key: TimerKey, delay: Duration) {
        self.next_generation += 1;
        self.live
            .insert(key, (self.next_generation, self.now + delay));
    }

    fn cancel(&mut self, key: TimerKey) {
        self.live.remove(&key);
    }

    fn claim(&mut self, key: TimerKey, generation: u64) -> bool {
        match self.live.get(&key) {
            Some((live, _)) if *live == generation => {
                self.live.remove(&key);
                true
            }
            _ => false,
        }
    }
}
