//! Risk-extension continuity.
//!
//! A risk declared against the previous release of a line keeps applying to
//! later releases until one of them is marked as fixing it. Promoting a
//! later release without the risk would silently drop the warning.

use std::collections::BTreeSet;

use crate::error::PromoterError;
use crate::gate::{Concern, ConcernKind};
use crate::risk::RiskIndex;
use crate::semver::Version;

/// The largest of `known` on `version`'s release line that is strictly
/// below `version`.
pub fn previous_version<'a, I>(version: &Version, known: I) -> Option<&'a Version>
where
    I: IntoIterator<Item = &'a Version>,
{
    let line = version.release_line();
    known
        .into_iter()
        .filter(|k| k.release_line() == line && k.precedence(version).is_lt())
        .max()
}

/// Violations for promoting `version` when `previous` is the release before
/// it in the target channel.
pub fn continuity_violations(
    version: &Version,
    previous: &Version,
    risks: &RiskIndex,
) -> Vec<PromoterError> {
    let mut violations = Vec::new();
    for (name, declaration) in risks.risks_to(previous) {
        if risks.declares(version, name) {
            continue;
        }
        let remedy = match &declaration.fixed_in {
            Some(fixed) if version.precedence(fixed).is_ge() => continue,
            Some(fixed) => format!("it is not fixed until {fixed}, so it must be extended to {version}"),
            None => format!("extend it to {version} or declare fixedIn"),
        };
        violations.push(PromoterError::RiskContinuityViolation {
            risk: name.to_string(),
            previous: previous.to_string(),
            version: version.to_string(),
            remedy,
        });
    }
    violations
}

/// Fatal concerns for `version` given the versions already in (or about to
/// enter) the target channel.
pub fn check_continuity(
    version: &Version,
    target_versions: &BTreeSet<Version>,
    in_flight: &BTreeSet<Version>,
    risks: &RiskIndex,
) -> Vec<Concern> {
    let Some(previous) = previous_version(version, target_versions.iter().chain(in_flight)) else {
        return Vec::new();
    };
    continuity_violations(version, previous, risks)
        .into_iter()
        .map(|violation| Concern::fatal(ConcernKind::RiskContinuity, violation.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use channel_store::{BlockedEdgeDocument, Sourced};

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn set(versions: &[&str]) -> BTreeSet<Version> {
        versions.iter().map(|s| v(s)).collect()
    }

    fn index(docs: Vec<BlockedEdgeDocument>) -> RiskIndex {
        let sourced: Vec<_> = docs
            .into_iter()
            .map(|d| Sourced::new("blocked-edges/x.yaml", d))
            .collect();
        RiskIndex::build(&sourced).unwrap()
    }

    #[test]
    fn test_previous_version_stays_on_line() {
        let known = set(&["4.8.9", "4.9.1", "4.9.3", "4.10.0"]);
        assert_eq!(previous_version(&v("4.9.2"), &known), Some(&v("4.9.1")));
        assert_eq!(previous_version(&v("4.9.1"), &known), None);
        assert_eq!(previous_version(&v("4.9.4"), &known), Some(&v("4.9.3")));
    }

    #[test]
    fn test_unextended_risk_blocks() {
        let risks = index(vec![BlockedEdgeDocument::new("4.9.1", ".*").named("Foo")]);
        let concerns = check_continuity(&v("4.9.2"), &set(&["4.9.1"]), &BTreeSet::new(), &risks);
        assert_eq!(concerns.len(), 1);
        assert!(concerns[0].is_fatal());
        assert!(concerns[0].message.contains("Foo"));
        assert!(concerns[0].message.contains("4.9.2"));
    }

    #[test]
    fn test_fixed_in_reached_clears() {
        let risks = index(vec![BlockedEdgeDocument::new("4.9.1", ".*")
            .named("Foo")
            .fixed_in("4.9.2")]);
        assert!(check_continuity(&v("4.9.2"), &set(&["4.9.1"]), &BTreeSet::new(), &risks).is_empty());
        assert!(check_continuity(&v("4.9.3"), &set(&["4.9.1"]), &BTreeSet::new(), &risks).is_empty());
    }

    #[test]
    fn test_fixed_in_not_reached_names_target() {
        let risks = index(vec![BlockedEdgeDocument::new("4.9.1", ".*")
            .named("Foo")
            .fixed_in("4.9.5")]);
        let concerns = check_continuity(&v("4.9.2"), &set(&["4.9.1"]), &BTreeSet::new(), &risks);
        assert!(concerns[0].message.contains("4.9.5"));
    }

    #[test]
    fn test_extended_risk_passes() {
        let risks = index(vec![
            BlockedEdgeDocument::new("4.9.1", ".*").named("Foo"),
            BlockedEdgeDocument::new("4.9.2", ".*").named("Foo"),
        ]);
        assert!(check_continuity(&v("4.9.2"), &set(&["4.9.1"]), &BTreeSet::new(), &risks).is_empty());
    }

    #[test]
    fn test_in_flight_candidate_counts_as_previous() {
        let risks = index(vec![BlockedEdgeDocument::new("4.9.2", ".*").named("Bar")]);
        let concerns = check_continuity(&v("4.9.3"), &set(&["4.9.1"]), &set(&["4.9.2"]), &risks);
        assert_eq!(concerns.len(), 1);
        assert!(concerns[0].message.contains("Bar"));
    }

    #[test]
    fn test_unnamed_risks_are_ignored() {
        let risks = index(vec![BlockedEdgeDocument::new("4.9.1", ".*")]);
        assert!(check_continuity(&v("4.9.2"), &set(&["4.9.1"]), &BTreeSet::new(), &risks).is_empty());
    }
}
