// src/version/mod.rs

//! Upstream release versions and version constraints
//!
//! Upstream projects do not follow one versioning scheme: `0.2.6`,
//! `5.0.0-alpha15`, `1_76_0` and `3.3.9` all show up in recipes. A
//! [`RecipeVersion`] splits a version string into numeric and alphabetic
//! segments so releases can be ordered consistently:
//!
//! - numeric segments compare numerically
//! - alphabetic segments compare lexically and sort before numeric ones
//! - a missing tail counts as zeros, unless the longer version continues
//!   with an alphabetic segment, which marks it as a pre-release
//!
//! So `5.0.0-alpha14 < 5.0.0-alpha15 < 5.0.0-beta1 < 5.0.0 < 5.0.1`.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// One segment of a split version string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Number(u64),
    Tag(String),
}

impl Segment {
    fn compare(&self, other: &Segment) -> Ordering {
        match (self, other) {
            (Segment::Number(a), Segment::Number(b)) => a.cmp(b),
            (Segment::Tag(a), Segment::Tag(b)) => a.cmp(b),
            (Segment::Tag(_), Segment::Number(_)) => Ordering::Less,
            (Segment::Number(_), Segment::Tag(_)) => Ordering::Greater,
        }
    }
}

/// A parsed upstream version
#[derive(Debug, Clone)]
pub struct RecipeVersion {
    raw: String,
    segments: Vec<Segment>,
}

impl RecipeVersion {
    /// Parse a version string
    ///
    /// Separators are `.`, `-`, `_` and `+`; a change between letters and
    /// digits also starts a new segment (`alpha14` → `alpha`, `14`).
    pub fn parse(s: &str) -> Result<Self> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(Error::Parse("Empty version string".to_string()));
        }

        let mut segments = Vec::new();
        let mut current = String::new();

        let flush = |current: &mut String, segments: &mut Vec<Segment>| -> Result<()> {
            if current.is_empty() {
                return Ok(());
            }
            let segment = if current.chars().all(|c| c.is_ascii_digit()) {
                let n = current.parse::<u64>().map_err(|e| {
                    Error::Parse(format!("Invalid numeric segment '{}': {}", current, e))
                })?;
                Segment::Number(n)
            } else {
                Segment::Tag(current.to_lowercase())
            };
            segments.push(segment);
            current.clear();
            Ok(())
        };

        for c in raw.chars() {
            if matches!(c, '.' | '-' | '_' | '+') {
                flush(&mut current, &mut segments)?;
                continue;
            }
            if !c.is_ascii_alphanumeric() {
                return Err(Error::Parse(format!(
                    "Invalid character '{}' in version '{}'",
                    c, raw
                )));
            }
            if let Some(last) = current.chars().last()
                && last.is_ascii_digit() != c.is_ascii_digit()
            {
                flush(&mut current, &mut segments)?;
            }
            current.push(c);
        }
        flush(&mut current, &mut segments)?;

        if segments.is_empty() {
            return Err(Error::Parse(format!("Version '{}' has no segments", raw)));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether any segment is alphabetic (alpha, beta, rc, ...)
    pub fn is_prerelease(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Tag(_)))
    }

    /// Compare two versions segment by segment
    pub fn compare(&self, other: &RecipeVersion) -> Ordering {
        let mut left = self.segments.iter();
        let mut right = other.segments.iter();

        loop {
            match (left.next(), right.next()) {
                (None, None) => return Ordering::Equal,
                (Some(a), Some(b)) => match a.compare(b) {
                    Ordering::Equal => {}
                    ord => return ord,
                },
                (Some(a), None) => return Self::compare_tail(a, left.as_slice()),
                (None, Some(b)) => return Self::compare_tail(b, right.as_slice()).reverse(),
            }
        }
    }

    /// Ordering of the longer version against the shorter one once the
    /// shorter one has run out of segments
    fn compare_tail(first: &Segment, rest: &[Segment]) -> Ordering {
        match first {
            Segment::Tag(_) => Ordering::Less,
            Segment::Number(0) => rest
                .first()
                .map_or(Ordering::Equal, |next| Self::compare_tail(next, &rest[1..])),
            Segment::Number(_) => Ordering::Greater,
        }
    }
}

impl FromStr for RecipeVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RecipeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for RecipeVersion {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for RecipeVersion {}

impl Ord for RecipeVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for RecipeVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Version constraint operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// Any version is acceptable
    Any,
    Exact(RecipeVersion),
    GreaterThan(RecipeVersion),
    GreaterOrEqual(RecipeVersion),
    LessThan(RecipeVersion),
    LessOrEqual(RecipeVersion),
    NotEqual(RecipeVersion),
    /// Both constraints must be satisfied (for ranges like ">= 1.0, < 2.0")
    And(Box<VersionConstraint>, Box<VersionConstraint>),
}

impl VersionConstraint {
    /// Parse a version constraint string
    ///
    /// Examples:
    /// - ">= 1.2.3" → GreaterOrEqual(1.2.3)
    /// - "<= 5.0.0-alpha14" → LessOrEqual(5.0.0-alpha14)
    /// - "> 5.0.0-alpha15" → GreaterThan(5.0.0-alpha15)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() || s == "*" {
            return Ok(VersionConstraint::Any);
        }

        if let Some((left, right)) = s.split_once(',') {
            let left = Self::parse(left)?;
            let right = Self::parse(right)?;
            return Ok(VersionConstraint::And(Box::new(left), Box::new(right)));
        }

        if let Some(rest) = s.strip_prefix(">=") {
            Ok(VersionConstraint::GreaterOrEqual(RecipeVersion::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix("<=") {
            Ok(VersionConstraint::LessOrEqual(RecipeVersion::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix("!=") {
            Ok(VersionConstraint::NotEqual(RecipeVersion::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('>') {
            Ok(VersionConstraint::GreaterThan(RecipeVersion::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('<') {
            Ok(VersionConstraint::LessThan(RecipeVersion::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('=') {
            Ok(VersionConstraint::Exact(RecipeVersion::parse(rest)?))
        } else {
            // No operator means exact match
            Ok(VersionConstraint::Exact(RecipeVersion::parse(s)?))
        }
    }

    /// Check if a version satisfies this constraint
    pub fn satisfies(&self, version: &RecipeVersion) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Exact(v) => version == v,
            VersionConstraint::GreaterThan(v) => version > v,
            VersionConstraint::GreaterOrEqual(v) => version >= v,
            VersionConstraint::LessThan(v) => version < v,
            VersionConstraint::LessOrEqual(v) => version <= v,
            VersionConstraint::NotEqual(v) => version != v,
            VersionConstraint::And(left, right) => {
                left.satisfies(version) && right.satisfies(version)
            }
        }
    }

    /// Parse `version` and check it against this constraint
    pub fn satisfies_str(&self, version: &str) -> Result<bool> {
        Ok(self.satisfies(&RecipeVersion::parse(version)?))
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => write!(f, "*"),
            VersionConstraint::Exact(v) => write!(f, "= {}", v),
            VersionConstraint::GreaterThan(v) => write!(f, "> {}", v),
            VersionConstraint::GreaterOrEqual(v) => write!(f, ">= {}", v),
            VersionConstraint::LessThan(v) => write!(f, "< {}", v),
            VersionConstraint::LessOrEqual(v) => write!(f, "<= {}", v),
            VersionConstraint::NotEqual(v) => write!(f, "!= {}", v),
            VersionConstraint::And(left, right) => write!(f, "{}, {}", left, right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> RecipeVersion {
        RecipeVersion::parse(s).unwrap()
    }

    #[test]
    fn test_prerelease_ordering_chain() {
        assert!(v("5.0.0-alpha14") < v("5.0.0-alpha15"));
        assert!(v("5.0.0-alpha15") < v("5.0.0"));
        assert!(v("5.0.0") < v("5.0.1"));
    }

    #[test]
    fn test_beta_after_alpha() {
        assert!(v("5.0.0-alpha16") < v("5.0.0-beta1"));
        assert!(v("5.0.0-beta1") < v("5.0.0-beta2"));
        assert!(v("5.0.0-beta2") < v("5.0.0"));
    }

    #[test]
    fn test_numeric_not_lexical() {
        assert!(v("1.9") < v("1.10"));
        assert!(v("0.2.6") < v("0.2.10"));
    }

    #[test]
    fn test_trailing_zeros_are_equal() {
        assert_eq!(v("5.0"), v("5.0.0"));
        assert!(v("5.0") < v("5.0.1"));
    }

    #[test]
    fn test_segments_split_letters_from_digits() {
        assert_eq!(
            v("5.0.0-alpha14").segments(),
            &[
                Segment::Number(5),
                Segment::Number(0),
                Segment::Number(0),
                Segment::Tag("alpha".to_string()),
                Segment::Number(14),
            ]
        );
        assert!(v("5.0.0-alpha14").is_prerelease());
        assert!(!v("1_76_0").is_prerelease());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(RecipeVersion::parse("").is_err());
        assert!(RecipeVersion::parse("1.0 beta").is_err());
        assert!(RecipeVersion::parse("...").is_err());
    }

    #[test]
    fn test_display_keeps_original() {
        assert_eq!(v("5.0.0-Alpha14").to_string(), "5.0.0-Alpha14");
    }

    #[test]
    fn test_constraint_layout_gates() {
        let old_layout = VersionConstraint::parse("<= 5.0.0-alpha14").unwrap();
        assert!(old_layout.satisfies(&v("5.0.0-alpha14")));
        assert!(old_layout.satisfies(&v("5.0.0-alpha12")));
        assert!(!old_layout.satisfies(&v("5.0.0-alpha15")));

        let newest = VersionConstraint::parse("> 5.0.0-alpha15").unwrap();
        assert!(!newest.satisfies(&v("5.0.0-alpha15")));
        assert!(newest.satisfies(&v("5.0.0-beta1")));
    }

    #[test]
    fn test_constraint_and() {
        let c = VersionConstraint::parse(">= 1.0.0, < 2.0.0").unwrap();
        assert!(c.satisfies(&v("1.5.0")));
        assert!(!c.satisfies(&v("2.0.0")));
        assert!(!c.satisfies(&v("0.9.0")));
        assert_eq!(c.to_string(), ">= 1.0.0, < 2.0.0");
    }

    #[test]
    fn test_constraint_any() {
        let c = VersionConstraint::parse("*").unwrap();
        assert!(c.satisfies(&v("99.99.99")));
    }
}
