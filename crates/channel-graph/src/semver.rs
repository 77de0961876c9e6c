//! Semantic version parsing and ordering.
//!
//! Precedence is major, minor, patch numerically, then a release outranks any
//! prerelease of the same triple, then two prereleases compare as plain ASCII
//! strings of the whole prerelease text. The last rule differs from
//! SemVer 2.0.0 (`rc.10` sorts before `rc.9` here) and is kept because existing
//! channel data is ordered that way.
//!
//! Build metadata never affects precedence. `Ord` on [`Version`] breaks ties
//! on it so that per-architecture builds of one release can coexist in sorted
//! sets; use [`Version::precedence`] or [`compare`] for SemVer comparison.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PromoterError, Result};

/// A parsed `major.minor.patch[-prerelease][+build]` version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
    pub build: Option<String>,
}

impl Version {
    /// Parse with the SemVer 2.0.0 grammar. Leading `v`, whitespace and
    /// leading zeros in numeric identifiers are rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let parsed = ::semver::Version::parse(input)
            .map_err(|_| PromoterError::InvalidVersion(input.to_string()))?;
        let text = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Ok(Self {
            major: parsed.major,
            minor: parsed.minor,
            patch: parsed.patch,
            pre: text(parsed.pre.as_str()),
            build: text(parsed.build.as_str()),
        })
    }

    /// SemVer precedence, ignoring build metadata.
    pub fn precedence(&self, other: &Self) -> Ordering {
        let tuple_cmp =
            (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch));
        if tuple_cmp != Ordering::Equal {
            return tuple_cmp;
        }
        // Same numeric version: pre-release < release
        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    pub fn release_line(&self) -> ReleaseLine {
        ReleaseLine {
            major: self.major,
            minor: self.minor,
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence(other)
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = PromoterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = PromoterError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

/// A `major.minor` release line such as `4.9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseLine {
    pub major: u64,
    pub minor: u64,
}

impl ReleaseLine {
    pub fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }

    /// Every line from `self` to `to` inclusive, within one major version.
    ///
    /// Empty when the majors differ or `to` precedes `self`.
    pub fn through(self, to: ReleaseLine) -> Vec<ReleaseLine> {
        if self.major != to.major || to.minor < self.minor {
            return Vec::new();
        }
        (self.minor..=to.minor)
            .map(|minor| ReleaseLine::new(self.major, minor))
            .collect()
    }
}

impl fmt::Display for ReleaseLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ReleaseLine {
    type Err = PromoterError;

    /// Accepts exactly `major.minor`, numbered as in a version core.
    fn from_str(s: &str) -> Result<Self> {
        let parsed = ::semver::Version::parse(&format!("{s}.0"))
            .map_err(|_| PromoterError::InvalidVersion(s.to_string()))?;
        if !parsed.pre.is_empty() || !parsed.build.is_empty() {
            return Err(PromoterError::InvalidVersion(s.to_string()));
        }
        Ok(Self::new(parsed.major, parsed.minor))
    }
}

/// Compare two version strings by SemVer precedence.
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    Ok(Version::parse(a)?.precedence(&Version::parse(b)?))
}

/// The `major.minor` release line of a version string.
pub fn major_minor(version: &str) -> Result<String> {
    Ok(Version::parse(version)?.release_line().to_string())
}
