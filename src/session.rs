//! Command parsing for the interactive programming session and for `N=CHORD`
//! assignments given on the command line.

use crate::mapping::{normalize_chord, KeyIndex, MappingError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuCommand {
    Refresh,
    /// Connect to the port with this 1-based number in the last listing.
    Connect(usize),
    Assign(KeyIndex),
    Save,
    Show,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MenuError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command '{0}' (type 'h' for help)")]
    Unknown(String),

    #[error("'{0}' needs a number")]
    MissingNumber(String),

    #[error("'{0}' is not a number")]
    BadNumber(String),

    #[error(transparent)]
    Key(#[from] MappingError),
}

fn parse_number(word: &str) -> Result<usize, MenuError> {
    word.parse()
        .map_err(|_| MenuError::BadNumber(word.to_string()))
}

fn parse_key(word: &str) -> Result<KeyIndex, MenuError> {
    Ok(KeyIndex::from_number(parse_number(word)?)?)
}

pub fn parse_menu_line(line: &str) -> Result<MenuCommand, MenuError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(MenuError::Empty);
    };
    let verb = verb.to_lowercase();
    let mut argument = || {
        words
            .next()
            .ok_or_else(|| MenuError::MissingNumber(verb.clone()))
    };

    match verb.as_str() {
        "r" | "refresh" => Ok(MenuCommand::Refresh),
        "c" | "connect" => Ok(MenuCommand::Connect(parse_number(argument()?)?)),
        "a" | "assign" => Ok(MenuCommand::Assign(parse_key(argument()?)?)),
        "s" | "save" => Ok(MenuCommand::Save),
        "l" | "show" => Ok(MenuCommand::Show),
        "h" | "?" | "help" => Ok(MenuCommand::Help),
        "q" | "quit" | "exit" => Ok(MenuCommand::Quit),
        // A bare key number is shorthand for assign
        digits if digits.chars().all(|c| c.is_ascii_digit()) => {
            Ok(MenuCommand::Assign(parse_key(digits)?))
        }
        other => Err(MenuError::Unknown(other.to_string())),
    }
}

/// Parse `N=CHORD` into a key and its stored value.
///
/// The chord is normalized like a captured hotkey; truncation happens when it
/// is written to the table. An empty chord leaves the key unassigned.
pub fn parse_assignment(s: &str) -> Result<(KeyIndex, String), String> {
    let (number, chord) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=CHORD, got '{s}'"))?;
    let number: usize = number
        .trim()
        .parse()
        .map_err(|_| format!("expected KEY=CHORD with a numeric KEY, got '{s}'"))?;
    let key = KeyIndex::from_number(number).map_err(|e| e.to_string())?;
    Ok((key, normalize_chord(chord)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: usize) -> KeyIndex {
        KeyIndex::from_number(n).unwrap()
    }

    #[test]
    fn parses_menu_verbs() {
        assert_eq!(parse_menu_line("r"), Ok(MenuCommand::Refresh));
        assert_eq!(parse_menu_line("  Save "), Ok(MenuCommand::Save));
        assert_eq!(parse_menu_line("connect 2"), Ok(MenuCommand::Connect(2)));
        assert_eq!(parse_menu_line("a 7"), Ok(MenuCommand::Assign(key(7))));
        assert_eq!(parse_menu_line("?"), Ok(MenuCommand::Help));
        assert_eq!(parse_menu_line("quit"), Ok(MenuCommand::Quit));
    }

    #[test]
    fn bare_number_assigns_that_key() {
        assert_eq!(parse_menu_line("9"), Ok(MenuCommand::Assign(key(9))));
        assert_eq!(
            parse_menu_line("10"),
            Err(MenuError::Key(MappingError::KeyOutOfRange(10)))
        );
    }

    #[test]
    fn rejects_bad_menu_input() {
        assert_eq!(parse_menu_line("   "), Err(MenuError::Empty));
        assert_eq!(
            parse_menu_line("c"),
            Err(MenuError::MissingNumber("c".to_string()))
        );
        assert_eq!(
            parse_menu_line("a two"),
            Err(MenuError::BadNumber("two".to_string()))
        );
        assert_eq!(
            parse_menu_line("flash"),
            Err(MenuError::Unknown("flash".to_string()))
        );
        // Keys change only through a confirmed capture
        assert_eq!(
            parse_menu_line("x 1"),
            Err(MenuError::Unknown("x".to_string()))
        );
        assert_eq!(
            parse_menu_line("clear 1"),
            Err(MenuError::Unknown("clear".to_string()))
        );
    }

    #[test]
    fn parses_assignments() {
        assert_eq!(
            parse_assignment("1=ctrl+c"),
            Ok((key(1), "CTRL+C".to_string()))
        );
        assert_eq!(
            parse_assignment("9=page up"),
            Ok((key(9), "PAGEUP".to_string()))
        );
        assert_eq!(parse_assignment("3="), Ok((key(3), String::new())));
    }

    #[test]
    fn rejects_bad_assignments() {
        assert!(parse_assignment("ctrl+c").unwrap_err().contains("expected KEY=CHORD"));
        assert!(parse_assignment("x=a").unwrap_err().contains("numeric KEY"));
        assert!(parse_assignment("0=a")
            .unwrap_err()
            .contains("Key number must be between 1 and 9"));
    }
}
