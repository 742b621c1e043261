// src/isrc.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two letters of country, three alphanumerics of registrant, two digits of
/// year and five digits of designation.
static ISRC_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2}[A-Z0-9]{3}\d{7}$").expect("static ISRC pattern"));

/// International Standard Recording Code, the join key between Spotify and
/// the non-Spotify providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isrc(String);

impl Isrc {
    /// Parses a code, returning `None` when it does not match the ISRC shape.
    /// Surrounding whitespace is ignored; case is not folded.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if ISRC_PATTERN.is_match(trimmed) {
            Some(Self(trimmed.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Isrc {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Isrc::parse(&value).ok_or_else(|| format!("invalid ISRC: {value}"))
    }
}

impl From<Isrc> for String {
    fn from(value: Isrc) -> Self {
        value.0
    }
}
