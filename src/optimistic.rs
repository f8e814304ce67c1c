//! Optimistic edits to the notification list.
//!
//! Every user action applies a [`Patch`] right away and records it here until
//! the remote call covering it settles. A failed call undoes its own patches,
//! addressed by thread id, and leaves everything else alone.

use std::collections::{BTreeMap, HashMap};

use crate::batch::{BatchId, MutationKind};
use crate::types::ParsedNotification;

#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Set the unread flag
    Unread {
        id: String,
        target: bool,
        previous: Option<bool>,
    },
    /// Drop the item from the list
    Removed {
        id: String,
        index: usize,
        item: Option<Box<ParsedNotification>>,
    },
    /// Prepend a marker to the title
    Title {
        id: String,
        prefix: &'static str,
        applied: bool,
    },
}

impl Patch {
    pub fn unread(id: impl Into<String>, target: bool) -> Self {
        Patch::Unread {
            id: id.into(),
            target,
            previous: None,
        }
    }

    pub fn removed(id: impl Into<String>) -> Self {
        Patch::Removed {
            id: id.into(),
            index: 0,
            item: None,
        }
    }

    pub fn title(id: impl Into<String>, prefix: &'static str) -> Self {
        Patch::Title {
            id: id.into(),
            prefix,
            applied: false,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Patch::Unread { id, .. } | Patch::Removed { id, .. } | Patch::Title { id, .. } => id,
        }
    }

    /// Apply to `list`, capturing what undo needs. A patch whose id is not
    /// in the list captures nothing and its undo is a no-op.
    fn apply(&mut self, list: &mut Vec<ParsedNotification>) {
        match self {
            Patch::Unread {
                id,
                target,
                previous,
            } => {
                *previous = list.iter_mut().find(|n| n.id == *id).map(|n| {
                    let was = n.unread;
                    n.unread = *target;
                    was
                });
            }
            Patch::Removed { id, index, item } => {
                *item = list.iter().position(|n| n.id == *id).map(|pos| {
                    *index = pos;
                    Box::new(list.remove(pos))
                });
            }
            Patch::Title {
                id,
                prefix,
                applied,
            } => {
                let marker = format!("{} ", prefix);
                match list.iter_mut().find(|n| n.id == *id) {
                    Some(n) if !n.title.contains(&marker) => {
                        n.title.insert_str(0, &marker);
                        *applied = true;
                    }
                    // Already marked: keep whatever the first apply captured
                    Some(_) => {}
                    None => *applied = false,
                }
            }
        }
    }

    /// Revert a field patch on one notification. Only this patch's own
    /// change is taken back; later edits to the same item survive.
    fn revert(&self, n: &mut ParsedNotification) {
        match self {
            Patch::Unread {
                previous: Some(previous),
                ..
            } => n.unread = *previous,
            Patch::Title {
                prefix,
                applied: true,
                ..
            } => {
                n.title = n.title.replacen(&format!("{} ", prefix), "", 1);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    patch: Patch,
}

/// Patches waiting on a remote call.
///
/// Staged patches belong to a queue that has not flushed yet; sealing moves
/// them under the id of the batch that carries them.
#[derive(Debug, Default)]
pub struct PatchLedger {
    staged: HashMap<MutationKind, Vec<Entry>>,
    sealed: BTreeMap<BatchId, Vec<Entry>>,
    /// Approvals are sent immediately, one call per thread
    approvals: HashMap<String, Entry>,
    next_seq: u64,
}

impl PatchLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, patch: Patch) -> Entry {
        self.next_seq += 1;
        Entry {
            seq: self.next_seq,
            patch,
        }
    }

    fn undo(&mut self, patch: &Patch, list: &mut Vec<ParsedNotification>) {
        if let Patch::Removed {
            id,
            index,
            item: Some(item),
        } = patch
        {
            if !list.iter().any(|n| n.id == *id) {
                let at = (*index).min(list.len());
                list.insert(at, item.as_ref().clone());
            }
            return;
        }
        if let Some(n) = list.iter_mut().find(|n| n.id == patch.id()) {
            patch.revert(n);
        } else if let Some(n) = self.removed_copy(patch.id()) {
            // Hidden by a pending mark-done: fix the copy it would restore
            patch.revert(n);
        }
    }

    /// The saved item of an outstanding removal of `id`
    fn removed_copy(&mut self, id: &str) -> Option<&mut ParsedNotification> {
        self.staged
            .values_mut()
            .flatten()
            .chain(self.sealed.values_mut().flatten())
            .find_map(|entry| match &mut entry.patch {
                Patch::Removed {
                    id: removed,
                    item: Some(item),
                    ..
                } if removed.as_str() == id => Some(item.as_mut()),
                _ => None,
            })
    }

    /// Apply `patch` and hold it under `kind`. Returns false, without touching
    /// the list, if a patch for the same id is already staged for `kind`.
    pub fn stage(
        &mut self,
        kind: MutationKind,
        mut patch: Patch,
        list: &mut Vec<ParsedNotification>,
    ) -> bool {
        let already = self
            .staged
            .get(&kind)
            .is_some_and(|entries| entries.iter().any(|e| e.patch.id() == patch.id()));
        if already {
            return false;
        }
        patch.apply(list);
        let entry = self.entry(patch);
        self.staged.entry(kind).or_default().push(entry);
        true
    }

    /// Hand the staged patches of `kind` over to the batch that flushed it
    pub fn seal(&mut self, kind: MutationKind, batch: BatchId) {
        if let Some(entries) = self.staged.remove(&kind) {
            self.sealed.entry(batch).or_default().extend(entries);
        }
    }

    /// Resolve a batch. On failure its patches are undone newest first.
    /// Returns the number of patches rolled back.
    pub fn settle(
        &mut self,
        batch: BatchId,
        ok: bool,
        list: &mut Vec<ParsedNotification>,
    ) -> usize {
        let Some(entries) = self.sealed.remove(&batch) else {
            return 0;
        };
        if ok {
            return 0;
        }
        for entry in entries.iter().rev() {
            self.undo(&entry.patch, list);
        }
        entries.len()
    }

    /// Apply a one-off approval patch. Returns false if one is already in flight.
    pub fn stage_approval(&mut self, mut patch: Patch, list: &mut Vec<ParsedNotification>) -> bool {
        if self.approvals.contains_key(patch.id()) {
            return false;
        }
        patch.apply(list);
        let id = patch.id().to_string();
        let entry = self.entry(patch);
        self.approvals.insert(id, entry);
        true
    }

    pub fn settle_approval(&mut self, id: &str, ok: bool, list: &mut Vec<ParsedNotification>) {
        if let Some(entry) = self.approvals.remove(id) {
            if !ok {
                self.undo(&entry.patch, list);
            }
        }
    }

    /// Re-apply every outstanding patch, oldest first, to a freshly fetched list
    pub fn reapply(&mut self, list: &mut Vec<ParsedNotification>) {
        let mut entries: Vec<&mut Entry> = self
            .staged
            .values_mut()
            .flatten()
            .chain(self.sealed.values_mut().flatten())
            .chain(self.approvals.values_mut())
            .collect();
        entries.sort_by_key(|e| e.seq);
        for entry in entries {
            entry.patch.apply(list);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.staged.values().all(Vec::is_empty)
            && self.sealed.is_empty()
            && self.approvals.is_empty()
    }
}
