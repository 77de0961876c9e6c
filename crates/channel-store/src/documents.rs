//! Document shapes read from the channel store.
//!
//! These mirror the on-disk YAML one-to-one. Versions stay plain strings at
//! this layer; parsing and ordering belong to the graph crate.

use serde::{Deserialize, Serialize};

/// A document together with the store location it was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sourced<T> {
    /// Store-relative location, e.g. `channels/fast-4.9.yaml`.
    pub source: String,
    pub document: T,
}

impl<T> Sourced<T> {
    pub fn new(source: impl Into<String>, document: T) -> Self {
        Self {
            source: source.into(),
            document,
        }
    }
}

/// One channel definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDocument {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tombstones: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feeder: Option<FeederDocument>,
}

impl ChannelDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: Vec::new(),
            tombstones: Vec::new(),
            feeder: None,
        }
    }

    pub fn with_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.versions = versions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tombstones<I, S>(mut self, tombstones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tombstones = tombstones.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_feeder(mut self, feeder: FeederDocument) -> Self {
        self.feeder = Some(feeder);
        self
    }
}

/// The `feeder` stanza of a channel definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeederDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl FeederDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay: None,
            errata: None,
            filter: None,
        }
    }

    pub fn with_delay(mut self, delay: impl Into<String>) -> Self {
        self.delay = Some(delay.into());
        self
    }

    pub fn with_errata(mut self, errata: impl Into<String>) -> Self {
        self.errata = Some(errata.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// A blocked-edge (risk) declaration.
///
/// `matchingRules` is kept as raw YAML so validation can report unknown keys
/// instead of failing deserialization outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedEdgeDocument {
    pub to: String,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(
        default,
        rename = "fixedIn",
        skip_serializing_if = "Option::is_none"
    )]
    pub fixed_in: Option<String>,
    #[serde(
        default,
        rename = "matchingRules",
        skip_serializing_if = "Option::is_none"
    )]
    pub matching_rules: Option<serde_yaml::Value>,
}

impl BlockedEdgeDocument {
    pub fn new(to: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: from.into(),
            name: None,
            message: None,
            url: None,
            fixed_in: None,
            matching_rules: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn fixed_in(mut self, version: impl Into<String>) -> Self {
        self.fixed_in = Some(version.into());
        self
    }
}
