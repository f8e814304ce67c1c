use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone)]
pub enum Event {
    Render,
    Key(KeyInput),
}

/// Non-character parts of a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyFlags {
    pub up: bool,
    pub down: bool,
    pub tab: bool,
    pub shift: bool,
    pub ctrl: bool,
    pub escape: bool,
    pub enter: bool,
}

/// A raw key press: the typed character (if any) plus flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyInput {
    pub ch: Option<char>,
    pub flags: KeyFlags,
}

impl KeyInput {
    #[cfg(test)]
    pub fn char(ch: char) -> Self {
        Self {
            ch: Some(ch),
            flags: KeyFlags {
                shift: ch.is_uppercase(),
                ..KeyFlags::default()
            },
        }
    }

    #[cfg(test)]
    pub fn flags(flags: KeyFlags) -> Self {
        Self { ch: None, flags }
    }

    #[cfg(test)]
    pub fn escape() -> Self {
        Self::flags(KeyFlags {
            escape: true,
            ..KeyFlags::default()
        })
    }

    /// A plain press of `ch`. Ctrl chords never count.
    pub fn is_char(&self, ch: char) -> bool {
        !self.flags.ctrl && self.ch == Some(ch)
    }

    /// Ctrl+C, routed through the normal exit path
    pub fn is_interrupt(&self) -> bool {
        self.flags.ctrl && self.ch == Some('c')
    }
}

impl From<KeyEvent> for KeyInput {
    fn from(key: KeyEvent) -> Self {
        let mut flags = KeyFlags {
            shift: key.modifiers.contains(KeyModifiers::SHIFT),
            ctrl: key.modifiers.contains(KeyModifiers::CONTROL),
            ..KeyFlags::default()
        };
        let mut ch = None;
        match key.code {
            KeyCode::Char(c) => ch = Some(c),
            KeyCode::Up => flags.up = true,
            KeyCode::Down => flags.down = true,
            KeyCode::Tab => flags.tab = true,
            KeyCode::BackTab => {
                flags.tab = true;
                flags.shift = true;
            }
            KeyCode::Esc => flags.escape = true,
            KeyCode::Enter => flags.enter = true,
            _ => {}
        }
        Self { ch, flags }
    }
}
