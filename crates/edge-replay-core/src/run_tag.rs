//! Run tags namespacing staged transformer output

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::error::{ReplayError, Result};

/// Format of generated run tags
pub const RUN_TAG_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Identifier of one replay batch, used as the first staging path component
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunTag(String);

impl RunTag {
    /// Tag derived from the current UTC time
    pub fn generate() -> Self {
        Self::at(Utc::now())
    }

    /// Tag derived from `ts`
    pub fn at(ts: DateTime<Utc>) -> Self {
        Self(ts.format(RUN_TAG_FORMAT).to_string())
    }

    /// Accept a caller-supplied tag from an earlier run
    pub fn parse(value: &str) -> Result<Self> {
        if value.is_empty() {
            return Err(ReplayError::config("run tag must not be empty"));
        }
        if value.contains('/') || value.chars().any(char::is_whitespace) {
            return Err(ReplayError::config(format!(
                "run tag '{}' must not contain '/' or whitespace",
                value
            )));
        }
        Ok(Self(value.to_string()))
    }

    /// The tag text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunTag {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for RunTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_generated_format() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(RunTag::at(ts).as_str(), "20240102T030405");
    }

    #[test]
    fn test_generated_tags_are_valid() {
        let tag = RunTag::generate();
        assert_eq!(RunTag::parse(tag.as_str()).unwrap(), tag);
    }

    #[test]
    fn test_parse_rejects_path_components() {
        assert!(RunTag::parse("").is_err());
        assert!(RunTag::parse("a/b").is_err());
        assert!(RunTag::parse("a b").is_err());
        assert_eq!(
            "20231231T235959".parse::<RunTag>().unwrap().to_string(),
            "20231231T235959"
        );
    }
}
