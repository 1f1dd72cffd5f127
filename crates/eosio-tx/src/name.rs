//! Validated chain names used for accounts, actions, and permissions.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum name length accepted by the chain.
pub const MAX_NAME_LEN: usize = 13;

/// Characters allowed in the first twelve positions of a name.
const NAME_CHARSET: &str = ".12345abcdefghijklmnopqrstuvwxyz";

/// Characters allowed in the thirteenth position (only four bits remain).
const LAST_CHAR_CHARSET: &str = ".12345abcdefghij";

/// Name validation errors.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum NameError {
    /// Name was empty.
    #[error("name is empty")]
    Empty,
    /// Name exceeded [`MAX_NAME_LEN`] characters.
    #[error("name `{name}` is longer than 13 characters")]
    TooLong {
        /// Rejected input.
        name: String,
    },
    /// Name contained a character outside the chain alphabet.
    #[error("name `{name}` contains invalid character {character:?} at position {position}")]
    InvalidCharacter {
        /// Rejected input.
        name: String,
        /// Offending character.
        character: char,
        /// Zero-based character position.
        position: usize,
    },
}

/// Account, action, or permission name.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(String);

impl Name {
    /// Validates and wraps a name.
    ///
    /// # Errors
    ///
    /// Returns [`NameError`] when the input is empty, too long, or uses characters outside the
    /// chain alphabet.
    pub fn new(value: impl Into<String>) -> Result<Self, NameError> {
        let value = value.into();
        if value.is_empty() {
            return Err(NameError::Empty);
        }
        if value.chars().count() > MAX_NAME_LEN {
            return Err(NameError::TooLong { name: value });
        }
        for (position, character) in value.chars().enumerate() {
            let charset = if position == MAX_NAME_LEN.saturating_sub(1) {
                LAST_CHAR_CHARSET
            } else {
                NAME_CHARSET
            };
            if !charset.contains(character) {
                return Err(NameError::InvalidCharacter {
                    name: value,
                    character,
                    position,
                });
            }
        }
        Ok(Self(value))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

impl TryFrom<String> for Name {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Name {
    type Error = NameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.0
    }
}
