use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Platform identifier: a decimal string that grows with creation time.
///
/// Ordering is numeric without parsing into an integer, so identifiers wider
/// than `u64` still compare correctly: a shorter string is always smaller, and
/// equal-length strings compare byte-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Snowflake(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnowflakeError {
    #[error("snowflake is empty")]
    Empty,
    #[error("snowflake contains non-digit characters: {0:?}")]
    NotNumeric(String),
}

impl Snowflake {
    pub fn parse(raw: impl Into<String>) -> Result<Self, SnowflakeError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(SnowflakeError::Empty);
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SnowflakeError::NotNumeric(raw));
        }
        // Leading zeros would break the length-first ordering.
        let trimmed = raw.trim_start_matches('0');
        if trimmed.is_empty() {
            return Ok(Self("0".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `self` was created strictly before `other`.
    pub fn is_older_than(&self, other: &Snowflake) -> bool {
        self < other
    }
}

impl Ord for Snowflake {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Snowflake {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Snowflake {
    type Err = SnowflakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Snowflake {
    type Error = SnowflakeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Snowflake> for String {
    fn from(value: Snowflake) -> Self {
        value.0
    }
}

impl PartialEq<str> for Snowflake {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Snowflake {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_numerically_across_lengths() {
        let short = Snowflake::parse("99").unwrap();
        let long = Snowflake::parse("100").unwrap();
        assert!(short < long);
        assert!(short.is_older_than(&long));

        let a = Snowflake::parse("980958465566572604").unwrap();
        let b = Snowflake::parse("980958465566572605").unwrap();
        assert!(a < b);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(Snowflake::parse(""), Err(SnowflakeError::Empty));
        assert!(matches!(
            Snowflake::parse("12a4"),
            Err(SnowflakeError::NotNumeric(_))
        ));
    }

    #[test]
    fn leading_zeros_are_normalized() {
        assert_eq!(Snowflake::parse("0042").unwrap().as_str(), "42");
        assert_eq!(Snowflake::parse("000").unwrap().as_str(), "0");
    }

    #[test]
    fn serde_goes_through_validation() {
        let ok: Snowflake = serde_json::from_str("\"123456789012345678\"").unwrap();
        assert_eq!(ok, "123456789012345678");
        assert!(serde_json::from_str::<Snowflake>("\"abc\"").is_err());
    }
}
