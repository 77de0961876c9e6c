//! In-memory channel graph.
//!
//! Channels are keyed by name. Feeders are resolved by lookup, never by
//! pointer, and the feeder chains are checked for cycles once at load time.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use channel_store::{ChannelDocument, FeederDocument, Sourced};
use regex::Regex;
use tracing::warn;

use crate::error::{PromoterError, Result};
use crate::semver::{ReleaseLine, Version};

/// The only accepted `errata` value.
const ERRATA_PUBLIC: &str = "public";

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// An ISO-8601 style duration limited to weeks, days and hours,
/// e.g. `P1W`, `P2D`, `PT12H`, `P1W2DT3H`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delay {
    raw: String,
    duration: chrono::Duration,
}

impl Delay {
    pub fn duration(&self) -> chrono::Duration {
        self.duration
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

static DELAY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)W)?(?:(\d+)D)?(?:T(\d+)H)?$").expect("delay pattern compiles")
});

impl FromStr for Delay {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        let unsupported = || {
            format!(
                "invalid or unsupported ISO 8601 duration {s:?}; only week, day and hour \
                 components are supported (P<n>W<n>DT<n>H)"
            )
        };
        let caps = DELAY_PATTERN.captures(s).ok_or_else(unsupported)?;
        if caps.get(1).is_none() && caps.get(2).is_none() && caps.get(3).is_none() {
            return Err(unsupported());
        }
        let component = |i: usize| -> std::result::Result<i64, String> {
            caps.get(i)
                .map(|m| m.as_str().parse::<i64>().map_err(|_| unsupported()))
                .transpose()
                .map(|v| v.unwrap_or(0))
        };
        let (weeks, days, hours) = (component(1)?, component(2)?, component(3)?);
        let duration = chrono::Duration::try_weeks(weeks)
            .zip(chrono::Duration::try_days(days))
            .zip(chrono::Duration::try_hours(hours))
            .map(|((w, d), h)| w + d + h)
            .ok_or_else(unsupported)?;
        Ok(Self {
            raw: s.to_string(),
            duration,
        })
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ---------------------------------------------------------------------------
// Feeder
// ---------------------------------------------------------------------------

/// Whether promotion also opens once the version's advisory is public.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrataGate {
    #[default]
    Unset,
    Public,
}

/// The channel a channel promotes from, with its gate settings.
#[derive(Debug, Clone)]
pub struct Feeder {
    pub name: String,
    pub delay: Option<Delay>,
    pub errata: ErrataGate,
    filter: Regex,
    filter_source: String,
}

impl Feeder {
    fn from_document(channel: &str, doc: &FeederDocument) -> Result<Self> {
        let invalid = |reason: String| PromoterError::InvalidFeeder {
            channel: channel.to_string(),
            reason,
        };
        let delay = doc
            .delay
            .as_deref()
            .map(str::parse::<Delay>)
            .transpose()
            .map_err(invalid)?;
        let errata = match doc.errata.as_deref() {
            None => ErrataGate::Unset,
            Some(ERRATA_PUBLIC) => ErrataGate::Public,
            Some(other) => return Err(invalid(format!("invalid errata value {other:?}"))),
        };
        let filter_source = doc.filter.clone().unwrap_or_else(|| ".*".to_string());
        let filter = Regex::new(&format!("^(?:{filter_source})$"))
            .map_err(|e| invalid(format!("invalid filter {filter_source:?}: {e}")))?;
        Ok(Self {
            name: doc.name.clone(),
            delay,
            errata,
            filter,
            filter_source,
        })
    }

    /// Whether the filter matches the whole version string.
    pub fn accepts(&self, version: &str) -> bool {
        self.filter.is_match(version)
    }

    pub fn filter(&self) -> &str {
        &self.filter_source
    }

    /// Human-readable gate conditions, e.g. `PT48H or the errata is published`.
    pub fn conditions(&self) -> String {
        let mut conditions = Vec::new();
        if let Some(delay) = &self.delay {
            conditions.push(delay.to_string());
        }
        if self.errata == ErrataGate::Public {
            conditions.push("the errata is published".to_string());
        }
        if conditions.is_empty() {
            "manual promotion".to_string()
        } else {
            conditions.join(" or ")
        }
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// One channel definition with parsed versions.
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    /// Store location the definition was read from.
    pub source: String,
    /// Name prefix before `-<major>.<minor>`, or the whole name.
    pub phase: String,
    pub release_line: Option<ReleaseLine>,
    pub versions: BTreeSet<Version>,
    pub tombstones: BTreeSet<Version>,
    /// Listed versions that failed to parse.
    pub malformed: BTreeSet<String>,
    /// Tombstones that failed to parse.
    pub malformed_tombstones: BTreeSet<String>,
    pub feeder: Option<Feeder>,
}

/// Split `stable-4.9` into (`stable`, 4.9); names without a line are
/// version-agnostic and keep the whole name as their phase.
pub fn split_channel_name(name: &str) -> (String, Option<ReleaseLine>) {
    if let Some((phase, line)) = name.rsplit_once('-') {
        if let Ok(line) = line.parse::<ReleaseLine>() {
            if !phase.is_empty() {
                return (phase.to_string(), Some(line));
            }
        }
    }
    (name.to_string(), None)
}

fn parse_versions(
    channel: &str,
    field: &str,
    raw: &[String],
) -> (BTreeSet<Version>, BTreeSet<String>) {
    let mut parsed = BTreeSet::new();
    let mut malformed = BTreeSet::new();
    for value in raw {
        match Version::parse(value) {
            Ok(v) => {
                parsed.insert(v);
            }
            Err(e) => {
                warn!(channel, field, error = %e, "retaining malformed version");
                malformed.insert(value.clone());
            }
        }
    }
    (parsed, malformed)
}

impl Channel {
    pub fn from_document(sourced: &Sourced<ChannelDocument>) -> Result<Self> {
        let doc = &sourced.document;
        let (phase, release_line) = split_channel_name(&doc.name);
        let (versions, malformed) = parse_versions(&doc.name, "versions", &doc.versions);
        let (tombstones, malformed_tombstones) =
            parse_versions(&doc.name, "tombstones", &doc.tombstones);
        let feeder = doc
            .feeder
            .as_ref()
            .map(|f| Feeder::from_document(&doc.name, f))
            .transpose()?;
        Ok(Self {
            name: doc.name.clone(),
            source: sourced.source.clone(),
            phase,
            release_line,
            versions,
            tombstones,
            malformed,
            malformed_tombstones,
            feeder,
        })
    }

    /// Largest version by precedence.
    pub fn largest(&self) -> Option<&Version> {
        self.versions.iter().next_back()
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.versions.contains(version)
    }

    /// The channel path without its extension, as used in commit subjects.
    pub fn source_stem(&self) -> &str {
        self.source
            .strip_suffix(".yaml")
            .or_else(|| self.source.strip_suffix(".yml"))
            .unwrap_or(&self.source)
    }
}

/// Promotion candidates of one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    pub versions: BTreeSet<Version>,
    /// Feeder entries that would be candidates but do not parse.
    pub malformed: BTreeSet<String>,
}

impl Candidates {
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty() && self.malformed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ChannelGraph
// ---------------------------------------------------------------------------

/// All channels of one pass, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ChannelGraph {
    channels: BTreeMap<String, Channel>,
}

impl ChannelGraph {
    /// Build the graph, rejecting duplicate names, unusable feeder stanzas and
    /// feeder cycles. Feeders naming undefined channels are reported later,
    /// when dereferenced.
    pub fn load(documents: &[Sourced<ChannelDocument>]) -> Result<Self> {
        let mut channels: BTreeMap<String, Channel> = BTreeMap::new();
        for sourced in documents {
            let channel = Channel::from_document(sourced)?;
            if let Some(existing) = channels.get(&channel.name) {
                return Err(PromoterError::DuplicateChannel {
                    name: channel.name.clone(),
                    first: existing.source.clone(),
                    second: channel.source.clone(),
                });
            }
            channels.insert(channel.name.clone(), channel);
        }
        let graph = Self { channels };
        graph.check_feeder_cycles()?;
        Ok(graph)
    }

    fn check_feeder_cycles(&self) -> Result<()> {
        let mut cleared: HashSet<&str> = HashSet::new();
        for start in self.channels.keys() {
            let mut path: Vec<&str> = Vec::new();
            let mut on_path: HashSet<&str> = HashSet::new();
            let mut current = Some(start.as_str());
            while let Some(name) = current {
                if cleared.contains(name) {
                    break;
                }
                if !on_path.insert(name) {
                    let begin = path.iter().position(|p| *p == name).unwrap_or(0);
                    return Err(PromoterError::FeederCycle {
                        channels: path[begin..].iter().map(|s| s.to_string()).collect(),
                    });
                }
                path.push(name);
                current = self
                    .channels
                    .get(name)
                    .and_then(|c| c.feeder.as_ref())
                    .map(|f| f.name.as_str());
            }
            cleared.extend(path);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    /// Channels in name order.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// The feeder channel of `channel`, `None` for roots.
    pub fn feeder_of(&self, channel: &Channel) -> Result<Option<&Channel>> {
        let Some(feeder) = &channel.feeder else {
            return Ok(None);
        };
        self.channels
            .get(&feeder.name)
            .map(Some)
            .ok_or_else(|| PromoterError::MissingFeeder {
                channel: channel.name.clone(),
                feeder: feeder.name.clone(),
            })
    }

    /// Feeder versions not yet in `channel`, minus tombstones of both, that
    /// match the feeder filter.
    pub fn candidates(&self, channel: &Channel) -> Result<Candidates> {
        let (Some(feeder), Some(settings)) = (self.feeder_of(channel)?, channel.feeder.as_ref())
        else {
            return Ok(Candidates::default());
        };
        let versions = feeder
            .versions
            .iter()
            .filter(|v| {
                !channel.versions.contains(*v)
                    && !feeder.tombstones.contains(*v)
                    && !channel.tombstones.contains(*v)
            })
            .filter(|v| settings.accepts(&v.to_string()))
            .cloned()
            .collect();
        let malformed = feeder
            .malformed
            .iter()
            .filter(|v| {
                !channel.malformed.contains(*v)
                    && !feeder.malformed_tombstones.contains(*v)
                    && !channel.malformed_tombstones.contains(*v)
            })
            .filter(|v| settings.accepts(v))
            .cloned()
            .collect();
        Ok(Candidates {
            versions,
            malformed,
        })
    }

    /// Record a promotion made during the current pass.
    pub fn insert_version(&mut self, channel: &str, version: Version) {
        if let Some(c) = self.channels.get_mut(channel) {
            c.versions.insert(version);
        }
    }

    /// For every release line, `stable-X.Y` must be contained in `fast-X.Y`
    /// and `fast-X.Y` in `candidate-X.Y`. Returns one message per problem.
    pub fn channel_order_violations(&self, order: &[&str]) -> Vec<String> {
        let lines: BTreeSet<ReleaseLine> = self
            .channels
            .values()
            .filter_map(|c| c.release_line)
            .collect();
        let mut violations = Vec::new();
        for line in lines {
            for pair in order.windows(2) {
                let narrower = format!("{}-{}", pair[0], line);
                let wider = format!("{}-{}", pair[1], line);
                let Some(a) = self.channels.get(&narrower) else {
                    continue;
                };
                let Some(b) = self.channels.get(&wider) else {
                    violations.push(format!("Channel {narrower} exists, but not {wider}"));
                    continue;
                };
                for v in a.versions.difference(&b.versions) {
                    violations.push(format!(
                        "Release {v} present in {narrower}, but not in {wider}"
                    ));
                }
            }
        }
        violations
    }
}

/// Channel phases from narrowest to widest audience of early adopters.
pub const CHANNEL_ORDER: [&str; 3] = ["stable", "fast", "candidate"];
