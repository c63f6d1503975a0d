//! Key-assignment capture.
//!
//! A capture scope records one shortcut for one key. While the scope is open it
//! holds the keyboard hook; every recognized chord replaces the pending
//! candidate. The mapping table is only written when the scope ends with a
//! confirmation and a candidate exists.

use crate::hook::{CaptureInput, KeyHook};
use crate::mapping::{normalize_chord, KeyIndex, MappingTable};
use log::{debug, trace};
use std::io;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing {
        key: KeyIndex,
        candidate: Option<String>,
    },
    Confirmed {
        key: KeyIndex,
        candidate: Option<String>,
    },
    Cancelled {
        key: KeyIndex,
    },
}

impl CaptureState {
    pub fn begin(self, key: KeyIndex) -> Self {
        match self {
            CaptureState::Idle => CaptureState::Capturing {
                key,
                candidate: None,
            },
            other => other,
        }
    }

    pub fn on_input(self, input: CaptureInput) -> Self {
        let (key, candidate) = match self {
            CaptureState::Capturing { key, candidate } => (key, candidate),
            other => return other,
        };

        match input {
            CaptureInput::Chord(raw) => CaptureState::Capturing {
                key,
                candidate: Some(normalize_chord(&raw)),
            },
            CaptureInput::Unrecognized => CaptureState::Capturing { key, candidate },
            CaptureInput::Confirm => CaptureState::Confirmed { key, candidate },
            CaptureInput::Cancel | CaptureInput::Close => CaptureState::Cancelled { key },
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            CaptureState::Confirmed { .. } | CaptureState::Cancelled { .. }
        )
    }

    pub fn candidate(&self) -> Option<&str> {
        match self {
            CaptureState::Capturing { candidate, .. } | CaptureState::Confirmed { candidate, .. } => {
                candidate.as_deref()
            }
            _ => None,
        }
    }

    /// Apply a capture to `table`. Only a confirmed candidate writes; a scope
    /// that never began yields `None`.
    pub fn commit(self, table: &mut MappingTable) -> Option<CaptureOutcome> {
        let outcome = match self {
            CaptureState::Confirmed {
                key,
                candidate: Some(candidate),
            } => {
                table.assign(key, &candidate);
                CaptureOutcome::Assigned {
                    key,
                    value: table.get(key).to_string(),
                }
            }
            CaptureState::Confirmed {
                key,
                candidate: None,
            } => CaptureOutcome::Unchanged { key },
            CaptureState::Cancelled { key } | CaptureState::Capturing { key, .. } => {
                CaptureOutcome::Cancelled { key }
            }
            CaptureState::Idle => return None,
        };
        Some(outcome)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Assigned { key: KeyIndex, value: String },
    /// Confirmed with nothing captured.
    Unchanged { key: KeyIndex },
    Cancelled { key: KeyIndex },
}

/// Holds the keyboard hook for the lifetime of a capture scope.
pub struct HookGuard<'a, H: KeyHook> {
    hook: &'a mut H,
}

impl<'a, H: KeyHook> HookGuard<'a, H> {
    pub fn acquire(hook: &'a mut H) -> io::Result<Self> {
        if let Err(e) = hook.hook() {
            hook.unhook();
            return Err(e);
        }
        trace!("Keyboard hook acquired");
        Ok(Self { hook })
    }

    pub fn next_input(&mut self) -> io::Result<CaptureInput> {
        self.hook.next_input()
    }
}

impl<H: KeyHook> Drop for HookGuard<'_, H> {
    fn drop(&mut self) {
        self.hook.unhook();
        trace!("Keyboard hook released");
    }
}

/// Run one capture scope for `key` and apply its result to `table`.
///
/// `on_candidate` is called each time the pending candidate changes. The hook
/// is released on every exit path, including errors from the hook itself.
pub fn run_capture<H, F>(
    table: &mut MappingTable,
    key: KeyIndex,
    hook: &mut H,
    mut on_candidate: F,
) -> io::Result<CaptureOutcome>
where
    H: KeyHook,
    F: FnMut(&str),
{
    let mut guard = HookGuard::acquire(hook)?;
    let mut state = CaptureState::Idle.begin(key);

    while !state.is_finished() {
        let input = guard.next_input()?;
        if input == CaptureInput::Unrecognized {
            debug!("Ignoring unrecognized key event");
        }
        let before = state.candidate().map(str::to_string);
        state = state.on_input(input);
        if let Some(candidate) = state.candidate() {
            if !state.is_finished() && before.as_deref() != Some(candidate) {
                on_candidate(candidate);
            }
        }
    }

    drop(guard);
    state
        .commit(table)
        .ok_or_else(|| io::Error::other("capture scope never started"))
}
