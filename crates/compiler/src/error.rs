//! Compiler error type.

use cfront::Coord;

/// A semantic error raised while compiling a translation unit.
///
/// Errors carry the coordinate of the offending node when one exists;
/// program-level errors (a missing `main`) have none. They are batched, not
/// fatal: the session logs them and keeps compiling sibling declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct PccError {
    pub coord: Option<Coord>,
    pub message: String,
}

impl PccError {
    pub fn at(coord: Coord, message: impl Into<String>) -> Self {
        PccError {
            coord: Some(coord),
            message: message.into(),
        }
    }

    pub fn global(message: impl Into<String>) -> Self {
        PccError {
            coord: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PccError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PccError {}
