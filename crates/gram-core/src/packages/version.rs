//! Semantic versions packed into 16-bit components.
//!
//! Components are stored as `i16` so package indexes stay narrow and sort
//! natively. Anything outside `0..=32767` is rejected when parsing.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemverError {
    #[error("invalid semver {input:?}: {reason}")]
    Parse { input: String, reason: String },

    #[error("invalid semver {input:?}: {component} version {value} is out of range (max {max})", max = i16::MAX)]
    OutOfRange {
        input: String,
        component: &'static str,
        value: u64,
    },
}

/// A strict `major.minor.patch[-prerelease][+build]` version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Semver {
    pub major: i16,
    pub minor: i16,
    pub patch: i16,
    pub prerelease: semver::Prerelease,
    pub build: semver::BuildMetadata,
}

impl Semver {
    pub fn new(major: i16, minor: i16, patch: i16) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: semver::Prerelease::EMPTY,
            build: semver::BuildMetadata::EMPTY,
        }
    }

    pub fn parse(input: &str) -> Result<Self, SemverError> {
        let version = semver::Version::parse(input.trim()).map_err(|e| SemverError::Parse {
            input: input.to_string(),
            reason: e.to_string(),
        })?;

        let pack = |component: &'static str, value: u64| {
            i16::try_from(value).map_err(|_| SemverError::OutOfRange {
                input: input.to_string(),
                component,
                value,
            })
        };

        Ok(Self {
            major: pack("major", version.major)?,
            minor: pack("minor", version.minor)?,
            patch: pack("patch", version.patch)?,
            prerelease: version.pre,
            build: version.build,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }
}

impl Ord for Semver {
    /// Release versions sort above their prereleases; build metadata only
    /// breaks ties between otherwise equal versions.
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| self.prerelease.cmp(&other.prerelease))
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl PartialOrd for Semver {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Semver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.prerelease.is_empty() {
            write!(f, "-{}", self.prerelease)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

impl FromStr for Semver {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Semver {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Semver {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Semver::parse(&raw).map_err(serde::de::Error::custom)
    }
}
