use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Masked byte pattern: concrete bytes and `?` wildcards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    bytes: Vec<Option<u8>>,
}

impl Signature {
    pub fn parse(pattern: &str) -> Result<Self> {
        Ok(Self {
            bytes: parse_pattern(pattern)?,
        })
    }

    pub fn from_bytes(bytes: Vec<Option<u8>>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[Option<u8>] {
        &self.bytes
    }

    /// Does the pattern match `haystack` at `pos`?
    pub fn matches_at(&self, haystack: &[u8], pos: usize) -> bool {
        let Some(window) = pos
            .checked_add(self.bytes.len())
            .and_then(|end| haystack.get(pos..end))
        else {
            return false;
        };
        self.bytes
            .iter()
            .zip(window)
            .all(|(expected, actual)| expected.is_none_or(|b| b == *actual))
    }

    /// First match whose start lies in `start..end`, clamped to the buffer
    pub fn find(&self, haystack: &[u8], start: usize, end: usize) -> Option<usize> {
        if self.bytes.is_empty() || haystack.len() < self.bytes.len() {
            return None;
        }
        let last = (haystack.len() - self.bytes.len()).min(end.saturating_sub(1));
        (start..=last).find(|&pos| self.matches_at(haystack, pos))
    }

    /// Every match whose start lies in `start..end`
    pub fn find_all(&self, haystack: &[u8], start: usize, end: usize) -> Vec<usize> {
        if self.bytes.is_empty() || haystack.len() < self.bytes.len() {
            return Vec::new();
        }
        let last = (haystack.len() - self.bytes.len()).min(end.saturating_sub(1));
        (start..=last)
            .filter(|&pos| self.matches_at(haystack, pos))
            .collect()
    }
}

impl FromStr for Signature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_pattern(&self.bytes))
    }
}

/// Pattern template ending in a relative call (`E8 rel32`)
#[derive(Debug, Clone)]
pub struct CallTemplate {
    pub signature: Signature,
    /// Offset of the `E8` opcode inside the match
    pub call_offset: usize,
}

impl CallTemplate {
    pub fn new(pattern: &str, call_offset: usize) -> Result<Self> {
        let signature = Signature::parse(pattern)?;
        if signature.as_slice().get(call_offset) != Some(&Some(0xE8)) {
            return Err(Error::InvalidSignature(format!(
                "'{}' has no E8 at position {}",
                pattern, call_offset
            )));
        }
        Ok(Self {
            signature,
            call_offset,
        })
    }
}

pub fn parse_pattern(pattern: &str) -> Result<Vec<Option<u8>>> {
    let mut bytes = Vec::new();
    for token in pattern.split_whitespace() {
        if token == "??" || token == "?" {
            bytes.push(None);
            continue;
        }

        if token.len() != 2 {
            return Err(Error::InvalidSignature(format!(
                "Invalid signature token '{}': expected two hex digits",
                token
            )));
        }
        let value = u8::from_str_radix(token, 16).map_err(|e| {
            Error::InvalidSignature(format!("Invalid signature token '{}': {}", token, e))
        })?;
        bytes.push(Some(value));
    }

    if bytes.is_empty() {
        return Err(Error::InvalidSignature(
            "Signature pattern is empty".to_string(),
        ));
    }

    Ok(bytes)
}

pub fn format_pattern(bytes: &[Option<u8>]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            Some(value) => format!("{:02X}", value),
            None => "?".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
