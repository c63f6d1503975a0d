//! Keyboard hook used while a key assignment is being captured.
//!
//! The terminal implementation puts the tty in raw mode so every key chord
//! reaches us instead of the line editor. Plain Enter and Esc are reserved for
//! OK / Cancel; with a modifier held they are ordinary chords.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, ModifierKeyCode};
use crossterm::terminal;
use std::io;

/// One discrete input observed while hooked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureInput {
    /// A recognized chord, as a raw hotkey name such as `ctrl+shift+a`.
    Chord(String),
    /// A key event that could not be named.
    Unrecognized,
    Confirm,
    Cancel,
    /// The capture scope was closed without OK or Cancel.
    Close,
}

/// Source of key-chord events with hook-all / unhook-all semantics.
pub trait KeyHook {
    fn hook(&mut self) -> io::Result<()>;

    /// Release the hook. Must be safe to call when not hooked.
    fn unhook(&mut self);

    /// Block until the next input arrives.
    fn next_input(&mut self) -> io::Result<CaptureInput>;
}

#[derive(Debug, Default)]
pub struct TerminalHook {
    raw_mode: bool,
}

impl TerminalHook {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyHook for TerminalHook {
    fn hook(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        self.raw_mode = true;
        Ok(())
    }

    fn unhook(&mut self) {
        if self.raw_mode {
            // Best-effort: a failure here leaves nothing else to restore.
            let _ = terminal::disable_raw_mode();
            self.raw_mode = false;
        }
    }

    fn next_input(&mut self) -> io::Result<CaptureInput> {
        loop {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Release {
                    continue;
                }
                return Ok(classify_key(key));
            }
        }
    }
}

impl Drop for TerminalHook {
    fn drop(&mut self) {
        self.unhook();
    }
}

pub fn classify_key(key: KeyEvent) -> CaptureInput {
    let plain = key.modifiers.is_empty();
    match key.code {
        KeyCode::Enter if plain => CaptureInput::Confirm,
        KeyCode::Esc if plain => CaptureInput::Cancel,
        _ => chord_name(key)
            .map(CaptureInput::Chord)
            .unwrap_or(CaptureInput::Unrecognized),
    }
}

fn modifier_names(mods: KeyModifiers) -> Vec<&'static str> {
    let mut names = Vec::new();
    if mods.contains(KeyModifiers::CONTROL) {
        names.push("ctrl");
    }
    if mods.contains(KeyModifiers::ALT) {
        names.push("alt");
    }
    if mods.contains(KeyModifiers::SHIFT) {
        names.push("shift");
    }
    if mods.contains(KeyModifiers::SUPER) {
        names.push("windows");
    }
    names
}

fn modifier_key_name(code: ModifierKeyCode) -> Option<&'static str> {
    match code {
        ModifierKeyCode::LeftControl | ModifierKeyCode::RightControl => Some("ctrl"),
        ModifierKeyCode::LeftAlt | ModifierKeyCode::RightAlt => Some("alt"),
        ModifierKeyCode::LeftShift | ModifierKeyCode::RightShift => Some("shift"),
        ModifierKeyCode::LeftSuper | ModifierKeyCode::RightSuper => Some("windows"),
        _ => None,
    }
}

fn key_name(code: KeyCode) -> Option<String> {
    let name = match code {
        KeyCode::Char(' ') => "space",
        KeyCode::Char(c) => return Some(c.to_lowercase().collect()),
        KeyCode::F(n) => return Some(format!("f{n}")),
        KeyCode::Backspace => "backspace",
        KeyCode::Enter => "enter",
        KeyCode::Esc => "esc",
        KeyCode::Left => "left",
        KeyCode::Right => "right",
        KeyCode::Up => "up",
        KeyCode::Down => "down",
        KeyCode::Home => "home",
        KeyCode::End => "end",
        KeyCode::PageUp => "page up",
        KeyCode::PageDown => "page down",
        // BackTab already carries SHIFT in its modifiers
        KeyCode::Tab | KeyCode::BackTab => "tab",
        KeyCode::Delete => "delete",
        KeyCode::Insert => "insert",
        KeyCode::CapsLock => "caps lock",
        KeyCode::ScrollLock => "scroll lock",
        KeyCode::NumLock => "num lock",
        KeyCode::PrintScreen => "print screen",
        KeyCode::Pause => "pause",
        KeyCode::Menu => "menu",
        _ => return None,
    };
    Some(name.to_string())
}

/// Hotkey name for a key event, e.g. `ctrl+shift+a`, or `None` for keys with no name.
pub fn chord_name(key: KeyEvent) -> Option<String> {
    let mut parts: Vec<String> = modifier_names(key.modifiers)
        .into_iter()
        .map(str::to_string)
        .collect();

    match key.code {
        KeyCode::Modifier(code) => {
            let name = modifier_key_name(code)?;
            if !parts.iter().any(|p| p == name) {
                parts.push(name.to_string());
            }
        }
        code => parts.push(key_name(code)?),
    }

    Some(parts.join("+"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::MediaKeyCode;

    fn key(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    #[test]
    fn names_modifier_chords_in_fixed_order() {
        let ev = key(
            KeyCode::Char('a'),
            KeyModifiers::SHIFT | KeyModifiers::CONTROL | KeyModifiers::ALT,
        );
        assert_eq!(chord_name(ev).as_deref(), Some("ctrl+alt+shift+a"));
    }

    #[test]
    fn lowercases_shifted_letters() {
        let ev = key(KeyCode::Char('A'), KeyModifiers::SHIFT);
        assert_eq!(chord_name(ev).as_deref(), Some("shift+a"));
    }

    #[test]
    fn names_special_keys() {
        assert_eq!(chord_name(key(KeyCode::F(5), KeyModifiers::NONE)).as_deref(), Some("f5"));
        assert_eq!(
            chord_name(key(KeyCode::Char(' '), KeyModifiers::CONTROL)).as_deref(),
            Some("ctrl+space")
        );
        assert_eq!(
            chord_name(key(KeyCode::PageUp, KeyModifiers::NONE)).as_deref(),
            Some("page up")
        );
        assert_eq!(
            chord_name(key(KeyCode::BackTab, KeyModifiers::SHIFT)).as_deref(),
            Some("shift+tab")
        );
    }

    #[test]
    fn modifier_alone_is_not_repeated() {
        let ev = key(
            KeyCode::Modifier(ModifierKeyCode::LeftControl),
            KeyModifiers::CONTROL,
        );
        assert_eq!(chord_name(ev).as_deref(), Some("ctrl"));
    }

    #[test]
    fn unnamed_keys_are_unrecognized() {
        let media = key(KeyCode::Media(MediaKeyCode::Play), KeyModifiers::NONE);
        assert_eq!(chord_name(media), None);
        assert_eq!(classify_key(media), CaptureInput::Unrecognized);
        assert_eq!(
            classify_key(key(KeyCode::Null, KeyModifiers::NONE)),
            CaptureInput::Unrecognized
        );
    }

    #[test]
    fn plain_enter_and_esc_are_controls() {
        assert_eq!(
            classify_key(key(KeyCode::Enter, KeyModifiers::NONE)),
            CaptureInput::Confirm
        );
        assert_eq!(
            classify_key(key(KeyCode::Esc, KeyModifiers::NONE)),
            CaptureInput::Cancel
        );
        assert_eq!(
            classify_key(key(KeyCode::Enter, KeyModifiers::CONTROL)),
            CaptureInput::Chord("ctrl+enter".to_string())
        );
    }
}
