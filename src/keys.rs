//! Keyboard sequence state machine.
//!
//! Key presses are appended to a short buffer and matched against an ordered
//! binding table. A match runs its gesture and clears the buffer; a miss keeps
//! the buffer and (re)arms an inactivity timer that clears it later, so a
//! lone `g` or `Esc` only pairs with a second press that comes soon after.

use std::collections::VecDeque;
use std::time::Duration;

use crate::event::KeyInput;
use crate::timer::{Scheduler, TimerKey};

pub const KEY_BUFFER_CAPACITY: usize = 5;
pub const KEY_TIMEOUT: Duration = Duration::from_secs(2);

/// Most recent key presses, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBuffer {
    keys: VecDeque<KeyInput>,
}

impl KeyBuffer {
    pub fn push(&mut self, key: KeyInput) {
        if self.keys.len() == KEY_BUFFER_CAPACITY {
            self.keys.pop_front();
        }
        self.keys.push_back(key);
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn last(&self) -> Option<&KeyInput> {
        self.keys.back()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// True if the last inputs typed were exactly `sequence`
    pub fn ends_with_chars(&self, sequence: &[char]) -> bool {
        if self.keys.len() < sequence.len() {
            return false;
        }
        self.keys
            .iter()
            .skip(self.keys.len() - sequence.len())
            .zip(sequence)
            .all(|(key, ch)| key.is_char(*ch))
    }

    /// True if the last `n` presses were all Escape
    pub fn ends_with_escapes(&self, n: usize) -> bool {
        self.keys.len() >= n && self.keys.iter().rev().take(n).all(|k| k.flags.escape)
    }

    /// A lone Escape is waiting for its pair
    pub fn escape_pending(&self) -> bool {
        self.last().is_some_and(|k| k.flags.escape)
    }

    /// A lone `g` is waiting for its pair
    pub fn g_pending(&self) -> bool {
        self.last().is_some_and(|k| k.is_char('g'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    ToggleHelp,
    Quit,
    JumpToStart,
    JumpToEnd,
    NextTab,
    PrevTab,
    MoveDown,
    MoveUp,
    OpenInBrowser,
    MarkRead,
    MarkUnread,
    MarkDone,
    Unsubscribe,
    Approve,
    Refresh,
}

/// Gestures the state machine cannot complete on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    OpenInBrowser,
    MarkRead,
    MarkUnread,
    MarkDone,
    Unsubscribe,
    Approve,
    Refresh,
    /// Flush pending mutations, then terminate
    Exit,
}

struct Binding {
    gesture: Gesture,
    matches: fn(&KeyBuffer) -> bool,
}

fn last_is(buffer: &KeyBuffer, pred: impl Fn(&KeyInput) -> bool) -> bool {
    buffer.last().is_some_and(pred)
}

/// Checked in order, first match wins
const BINDINGS: &[Binding] = &[
    Binding {
        gesture: Gesture::ToggleHelp,
        matches: |b| last_is(b, |k| k.is_char('?')),
    },
    Binding {
        gesture: Gesture::Quit,
        matches: |b| b.ends_with_escapes(2),
    },
    Binding {
        gesture: Gesture::JumpToStart,
        matches: |b| b.ends_with_chars(&['g', 'g']),
    },
    Binding {
        gesture: Gesture::NextTab,
        matches: |b| last_is(b, |k| k.is_char('l') || (k.flags.tab && !k.flags.shift)),
    },
    Binding {
        gesture: Gesture::PrevTab,
        matches: |b| last_is(b, |k| k.is_char('h') || (k.flags.tab && k.flags.shift)),
    },
    Binding {
        gesture: Gesture::JumpToEnd,
        matches: |b| last_is(b, |k| k.is_char('G')),
    },
    Binding {
        gesture: Gesture::Quit,
        matches: |b| last_is(b, |k| k.is_char('q')),
    },
    Binding {
        gesture: Gesture::MoveDown,
        matches: |b| last_is(b, |k| k.flags.down || k.is_char('j')),
    },
    Binding {
        gesture: Gesture::MoveUp,
        matches: |b| last_is(b, |k| k.flags.up || k.is_char('k')),
    },
    Binding {
        gesture: Gesture::OpenInBrowser,
        matches: |b| last_is(b, |k| k.flags.enter),
    },
    Binding {
        gesture: Gesture::MarkRead,
        matches: |b| last_is(b, |k| k.is_char('m')),
    },
    Binding {
        gesture: Gesture::MarkUnread,
        matches: |b| last_is(b, |k| k.is_char('M')),
    },
    Binding {
        gesture: Gesture::MarkDone,
        matches: |b| last_is(b, |k| k.is_char('d') || k.is_char('y')),
    },
    Binding {
        gesture: Gesture::Unsubscribe,
        matches: |b| last_is(b, |k| k.is_char('U')),
    },
    Binding {
        gesture: Gesture::Approve,
        matches: |b| last_is(b, |k| k.is_char('A')),
    },
    Binding {
        gesture: Gesture::Refresh,
        matches: |b| last_is(b, |k| k.is_char('R')),
    },
];

pub fn resolve(buffer: &KeyBuffer) -> Option<Gesture> {
    BINDINGS
        .iter()
        .find(|binding| (binding.matches)(buffer))
        .map(|binding| binding.gesture)
}

pub struct HelpSection {
    pub title: &'static str,
    pub bindings: &'static [(&'static str, &'static str)],
}

pub const HELP_SECTIONS: &[HelpSection] = &[
    HelpSection {
        title: "Navigation",
        bindings: &[
            ("Tab/l", "Next category"),
            ("⇧Tab/h", "Previous category"),
            ("↑/k", "Move up"),
            ("↓/j", "Move down"),
            ("gg", "Go to top"),
            ("G", "Go to bottom"),
        ],
    },
    HelpSection {
        title: "Actions",
        bindings: &[
            ("Enter", "Open PR in browser"),
            ("m", "Mark as read"),
            ("M", "Mark as unread"),
            ("d/y", "Mark as done"),
            ("U", "Unsubscribe"),
            ("A", "Approve"),
            ("R", "Refresh"),
        ],
    },
    HelpSection {
        title: "Other",
        bindings: &[("Esc×2", "Quit"), ("q", "Quit"), ("?", "Toggle this help")],
    },
];

/// Sizes the selection is clamped against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    /// Length of the filtered list for the selected tab
    pub items: usize,
    pub tabs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    pub selected_index: usize,
    pub selected_tab_index: usize,
    pub keys: KeyBuffer,
    pub exiting: bool,
    pub show_help: bool,
}

/// What a key press resulted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exiting; the key was dropped
    Ignored,
    /// No gesture yet; the key waits in the buffer
    Buffered,
    /// A gesture changed UI state
    Handled,
    Command(Command),
}

#[derive(Debug, Clone)]
pub struct Navigator {
    ui: UiState,
    key_timeout: Duration,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(KEY_TIMEOUT)
    }
}

impl Navigator {
    pub fn new(key_timeout: Duration) -> Self {
        Self {
            ui: UiState::default(),
            key_timeout,
        }
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn handle_key(
        &mut self,
        key: KeyInput,
        bounds: Bounds,
        scheduler: &mut impl Scheduler,
    ) -> Outcome {
        if self.ui.exiting {
            return Outcome::Ignored;
        }
        scheduler.cancel(TimerKey::KeyBuffer);

        if self.ui.show_help && !key.is_char('?') {
            self.ui.show_help = false;
            self.ui.keys.clear();
            return Outcome::Handled;
        }

        self.ui.keys.push(key);
        match resolve(&self.ui.keys) {
            Some(gesture) => {
                tracing::debug!(?gesture, "key gesture");
                self.ui.keys.clear();
                self.apply(gesture, bounds)
            }
            None => {
                scheduler.schedule(TimerKey::KeyBuffer, self.key_timeout);
                Outcome::Buffered
            }
        }
    }

    /// The inactivity timer fired: abandon the pending sequence
    pub fn on_timeout(&mut self) {
        if self.ui.keys.is_empty() {
            return;
        }
        tracing::debug!(discarded = self.ui.keys.len(), "key sequence timed out");
        self.ui.keys.clear();
    }

    /// Enter the exiting state without a key gesture (e.g. Ctrl+C)
    pub fn exit(&mut self) -> Outcome {
        if self.ui.exiting {
            return Outcome::Ignored;
        }
        self.apply(Gesture::Quit, Bounds::default())
    }

    /// Clamp both indices after the lists changed size
    pub fn reconcile(&mut self, bounds: Bounds) {
        self.ui.selected_tab_index = self
            .ui
            .selected_tab_index
            .min(bounds.tabs.saturating_sub(1));
        self.ui.selected_index = self.ui.selected_index.min(bounds.items.saturating_sub(1));
    }

    fn apply(&mut self, gesture: Gesture, bounds: Bounds) -> Outcome {
        let tab_count = bounds.tabs.max(1);
        let last_item = bounds.items.saturating_sub(1);
        match gesture {
            Gesture::ToggleHelp => self.ui.show_help = !self.ui.show_help,
            Gesture::Quit => {
                self.ui.exiting = true;
                return Outcome::Command(Command::Exit);
            }
            Gesture::JumpToStart => self.ui.selected_index = 0,
            Gesture::JumpToEnd => self.ui.selected_index = last_item,
            Gesture::NextTab => {
                self.ui.selected_tab_index = (self.ui.selected_tab_index + 1) % tab_count;
                self.ui.selected_index = 0;
            }
            Gesture::PrevTab => {
                self.ui.selected_tab_index =
                    (self.ui.selected_tab_index + tab_count - 1) % tab_count;
                self.ui.selected_index = 0;
            }
            Gesture::MoveDown => {
                self.ui.selected_index = (self.ui.selected_index + 1).min(last_item);
            }
            Gesture::MoveUp => {
                self.ui.selected_index = self.ui.selected_index.saturating_sub(1);
            }
            Gesture::OpenInBrowser => return Outcome::Command(Command::OpenInBrowser),
            Gesture::MarkRead => return Outcome::Command(Command::MarkRead),
            Gesture::MarkUnread => return Outcome::Command(Command::MarkUnread),
            Gesture::MarkDone => return Outcome::Command(Command::MarkDone),
            Gesture::Unsubscribe => return Outcome::Command(Command::Unsubscribe),
            Gesture::Approve => return Outcome::Command(Command::Approve),
            Gesture::Refresh => return Outcome::Command(Command::Refresh),
        }
        Outcome::Handled
    }
}
