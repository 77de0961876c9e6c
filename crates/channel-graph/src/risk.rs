//! Blocked-edge (risk) declarations.
//!
//! Each declaration says that updates into `to` from any version matching
//! `from` carry a named risk. Validation follows the store's document rules;
//! the [`RiskIndex`] answers "which risks are declared for this target".

use std::collections::{BTreeMap, BTreeSet};

use channel_store::{BlockedEdgeDocument, Sourced};
use regex::Regex;
use serde_yaml::Value;

use crate::error::{PromoterError, Result};
use crate::semver::Version;

/// Rule types understood in `matchingRules`.
const RULE_ALWAYS: &str = "Always";
const RULE_PROMQL: &str = "PromQL";

/// `^[A-Z][A-Za-z0-9_]*$`
fn is_camel_case(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One validated blocked-edge declaration.
#[derive(Debug, Clone)]
pub struct RiskAnnotation {
    pub to: Version,
    /// Anchored pattern over `version+arch` of the source release.
    pub from: Regex,
    pub name: Option<String>,
    pub message: Option<String>,
    pub url: Option<String>,
    pub fixed_in: Option<Version>,
    /// Store location of the declaration.
    pub path: String,
}

impl RiskAnnotation {
    /// Whether an update from `from` on `architecture` is covered.
    pub fn applies_to(&self, from: &Version, architecture: &str) -> bool {
        self.from.is_match(&format!("{from}+{architecture}"))
    }
}

/// Validate one document and turn it into an annotation.
pub fn validate_blocked_edge(sourced: &Sourced<BlockedEdgeDocument>) -> Result<RiskAnnotation> {
    let doc = &sourced.document;
    let invalid = |reason: String| PromoterError::InvalidBlockedEdge {
        path: sourced.source.clone(),
        reason,
    };

    if doc.to.is_empty() {
        return Err(invalid("'to' is a required property".to_string()));
    }
    if doc.from.is_empty() {
        return Err(invalid("'from' is a required property".to_string()));
    }
    if let Some(url) = &doc.url {
        if !url.starts_with("https://") {
            return Err(invalid(format!("url must be an https:// URI, not {url:?}")));
        }
    }
    if let Some(name) = &doc.name {
        if !is_camel_case(name) {
            return Err(invalid(format!("name must be a CamelCase reason, not {name:?}")));
        }
    }
    if let Some(rules) = &doc.matching_rules {
        for (key, present) in [
            ("url", doc.url.is_some()),
            ("name", doc.name.is_some()),
            ("message", doc.message.is_some()),
        ] {
            if !present {
                return Err(invalid(format!("when matchingRules is set, {key} must be set")));
            }
        }
        validate_matching_rules(rules).map_err(invalid)?;
    }

    let to = Version::parse(&doc.to).map_err(|e| invalid(e.to_string()))?;
    let fixed_in = doc
        .fixed_in
        .as_deref()
        .map(Version::parse)
        .transpose()
        .map_err(|e| invalid(e.to_string()))?;
    let from = Regex::new(&format!("^(?:{})$", doc.from))
        .map_err(|e| invalid(format!("invalid from pattern {:?}: {e}", doc.from)))?;

    Ok(RiskAnnotation {
        to,
        from,
        name: doc.name.clone(),
        message: doc.message.clone(),
        url: doc.url.clone(),
        fixed_in,
        path: sourced.source.clone(),
    })
}

fn mapping_keys(rule: &serde_yaml::Mapping) -> BTreeSet<String> {
    rule.keys()
        .map(|k| match k {
            Value::String(s) => s.clone(),
            other => format!("{other:?}"),
        })
        .collect()
}

fn reject_extra_keys(
    rule: &serde_yaml::Mapping,
    allowed: &[&str],
    context: &str,
) -> std::result::Result<(), String> {
    let extra: Vec<String> = mapping_keys(rule)
        .into_iter()
        .filter(|k| !allowed.contains(&k.as_str()))
        .collect();
    if extra.is_empty() {
        Ok(())
    } else {
        Err(format!("unrecognized keys in {context}: {}", extra.join(", ")))
    }
}

fn validate_matching_rules(rules: &Value) -> std::result::Result<(), String> {
    let rules = match rules.as_sequence() {
        Some(seq) if !seq.is_empty() => seq,
        _ => return Err("matchingRules must be an array with at least one member".to_string()),
    };
    let mut types = BTreeSet::new();
    for (i, rule) in rules.iter().enumerate() {
        let rule = rule
            .as_mapping()
            .ok_or_else(|| format!("matchingRules[{i}] must be a mapping"))?;
        let rule_type = rule
            .get("type")
            .ok_or_else(|| format!("type must be set for matchingRules[{i}]"))?;
        let rule_type = rule_type
            .as_str()
            .ok_or_else(|| format!("matchingRules[{i}] type must be a string"))?;
        if !types.insert(rule_type.to_string()) {
            return Err(format!("type {rule_type} appears multiple times in matchingRules"));
        }
        match rule_type {
            RULE_ALWAYS => reject_extra_keys(rule, &["type"], "'Always' rule")?,
            RULE_PROMQL => validate_promql_rule(rule)?,
            other => return Err(format!("unrecognized matchingRules[{i}] type {other:?}")),
        }
    }
    Ok(())
}

fn validate_promql_rule(rule: &serde_yaml::Mapping) -> std::result::Result<(), String> {
    reject_extra_keys(rule, &["type", "promql"], "'PromQL' rule")?;
    let promql = rule
        .get("promql")
        .ok_or_else(|| "promql must be set for 'PromQL' rules".to_string())?;
    let promql = promql
        .as_mapping()
        .ok_or_else(|| "promql property must be a mapping".to_string())?;
    reject_extra_keys(promql, &["promql"], "promql property")?;
    match promql.get("promql") {
        None => Err("promql.promql must be set for 'PromQL' rules".to_string()),
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err("promql.promql value must be a string".to_string()),
    }
}

/// Risk declarations grouped by target version.
#[derive(Debug, Clone, Default)]
pub struct RiskIndex {
    by_target: BTreeMap<Version, Vec<RiskAnnotation>>,
}

impl RiskIndex {
    /// Validate every document; the first invalid one aborts the build.
    pub fn build(documents: &[Sourced<BlockedEdgeDocument>]) -> Result<Self> {
        let mut index = Self::default();
        for sourced in documents {
            index.insert(validate_blocked_edge(sourced)?);
        }
        Ok(index)
    }

    pub fn insert(&mut self, annotation: RiskAnnotation) {
        self.by_target
            .entry(annotation.to.clone())
            .or_default()
            .push(annotation);
    }

    /// Named risks declared with `to == version`, keyed by name.
    ///
    /// Unnamed declarations are plain blocks and carry nothing to extend.
    pub fn risks_to(&self, version: &Version) -> BTreeMap<&str, &RiskAnnotation> {
        self.by_target
            .get(version)
            .into_iter()
            .flatten()
            .filter_map(|a| a.name.as_deref().map(|name| (name, a)))
            .collect()
    }

    pub fn declares(&self, version: &Version, name: &str) -> bool {
        self.by_target
            .get(version)
            .is_some_and(|list| list.iter().any(|a| a.name.as_deref() == Some(name)))
    }

    pub fn len(&self) -> usize {
        self.by_target.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }
}
