//! Promotion engine.
//!
//! One pass loads every channel and risk declaration, walks the channels in
//! name order and their candidates in version order, evaluates each
//! candidate through the gate and acts on the decision. All collaborator
//! calls are awaited one at a time.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use channel_remote::{AdvisoryProbe, GraphService, Notifier, PullRequests};
use channel_store::{
    Attribution, ChannelSource, ChannelWriter, PromotionRequest, StorageError, VersionHistory,
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::connectivity::{audit_connectivity, Exemptions};
use crate::continuity::check_continuity;
use crate::error::{PromoterError, Result};
use crate::gate::{decide, feeder_gate_open, format_elapsed, Concern, ConcernKind, Decision};
use crate::metrics::METRICS;
use crate::model::{Channel, ChannelGraph, ErrataGate, Feeder, CHANNEL_ORDER};
use crate::obs::{emit_candidate_error, emit_decision, emit_pass_finished, emit_pass_started, PassSpan};
use crate::reachability::check_reachability;
use crate::risk::RiskIndex;
use crate::semver::Version;
use crate::update_graph::GraphCache;

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Architecture used for update-graph queries.
    pub architecture: String,
    /// Phase whose channels seed every line; exempt from reachability and
    /// used as the upstream graph of audits.
    pub bootstrap_phase: String,
    /// Also notify about candidates that are not yet ready.
    pub waiting_notifications: bool,
    pub audit_connectivity: bool,
    pub exemptions: Exemptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            architecture: "amd64".to_string(),
            bootstrap_phase: "candidate".to_string(),
            waiting_notifications: true,
            audit_connectivity: true,
            exemptions: Exemptions::default(),
        }
    }
}

/// Every external system the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub channels: Arc<dyn ChannelSource>,
    pub history: Arc<dyn VersionHistory>,
    pub writer: Arc<dyn ChannelWriter>,
    pub graphs: Arc<dyn GraphService>,
    pub advisories: Arc<dyn AdvisoryProbe>,
    pub pulls: Arc<dyn PullRequests>,
    pub notifier: Arc<dyn Notifier>,
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Promoted { pull_url: String },
    Waiting,
    Blocked { reason: String },
    /// History lookup, persistence or pull-request creation failed.
    Failed { error: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Promoted { .. } => "promoted",
            Outcome::Waiting => "waiting",
            Outcome::Blocked { .. } => "blocked",
            Outcome::Failed { .. } => "failed",
        }
    }
}

/// Per-candidate record of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReport {
    pub channel: String,
    pub version: String,
    pub outcome: Outcome,
    pub concerns: Vec<Concern>,
    /// Notification line, if this candidate produced one.
    pub message: Option<String>,
}

/// Result of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub candidates: Vec<CandidateReport>,
    /// Advisory connectivity warnings across all audited channels.
    pub connectivity: Vec<String>,
    /// The batched notification text, when one was sent.
    pub notification: Option<String>,
}

impl PassReport {
    fn count(&self, label: &str) -> usize {
        self.candidates
            .iter()
            .filter(|c| c.outcome.label() == label)
            .count()
    }

    pub fn promoted(&self) -> usize {
        self.count("promoted")
    }

    pub fn waiting(&self) -> usize {
        self.count("waiting")
    }

    pub fn blocked(&self) -> usize {
        self.count("blocked")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }
}

/// Outcome of the `validate` checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub channels: usize,
    pub blocked_edges: usize,
    pub order_violations: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.order_violations.is_empty()
    }
}

/// Everything shared by the candidates of one channel.
struct ChannelContext<'a> {
    target: &'a Channel,
    feeder: &'a Channel,
    settings: &'a Feeder,
    /// Target versions including promotions made earlier in this pass.
    versions: &'a BTreeSet<Version>,
    in_flight: &'a BTreeSet<Version>,
    history: &'a HashMap<String, Attribution>,
}

/// Drives promotion passes.
pub struct PromotionEngine {
    collaborators: Collaborators,
    config: EngineConfig,
    passes: u64,
}

impl PromotionEngine {
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        Self {
            collaborators,
            config,
            passes: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn load(&self) -> Result<(ChannelGraph, RiskIndex)> {
        let documents = self.collaborators.channels.channels().await?;
        let graph = ChannelGraph::load(&documents)?;
        let blocked = self.collaborators.channels.blocked_edges().await?;
        let risks = RiskIndex::build(&blocked)?;
        Ok((graph, risks))
    }

    /// Load the store and run every configuration check without promoting.
    pub async fn validate(&self) -> Result<ValidationReport> {
        let (graph, risks) = self.load().await?;
        for channel in graph.channels() {
            graph.feeder_of(channel)?;
        }
        Ok(ValidationReport {
            channels: graph.len(),
            blocked_edges: risks.len(),
            order_violations: graph.channel_order_violations(&CHANNEL_ORDER),
        })
    }

    /// Run one pass using the current time.
    pub async fn run_pass(&mut self) -> Result<PassReport> {
        self.run_pass_at(Utc::now()).await
    }

    /// Run one pass as if it were `now` (used for deterministic tests).
    ///
    /// Configuration errors abort the pass; everything that goes wrong for
    /// a single candidate is recorded in the report instead.
    pub async fn run_pass_at(&mut self, now: DateTime<Utc>) -> Result<PassReport> {
        self.passes += 1;
        let _span = PassSpan::enter(self.passes);
        let started = Instant::now();

        let (mut graph, risks) = self.load().await?;
        emit_pass_started(graph.len(), risks.len());

        let mut cache = GraphCache::new(Arc::clone(&self.collaborators.graphs));
        let mut report = PassReport::default();
        let names: Vec<String> = graph.channels().map(|c| c.name.clone()).collect();

        for name in names {
            let Some(channel) = graph.get(&name).cloned() else {
                continue;
            };
            if let Some(settings) = channel.feeder.clone() {
                let candidates = self
                    .promote_channel(&mut graph, &channel, &settings, &risks, &mut cache, now)
                    .await?;
                report.candidates.extend(candidates);
            }

            if self.config.audit_connectivity {
                if let Some(audited) = graph.get(&name) {
                    match audit_connectivity(
                        audited,
                        &self.config.bootstrap_phase,
                        &self.config.architecture,
                        &self.config.exemptions,
                        &mut cache,
                    )
                    .await
                    {
                        Ok(connectivity) => {
                            for warning in connectivity.warnings() {
                                warn!(channel = %name, "{warning}");
                                report.connectivity.push(warning);
                            }
                        }
                        Err(e) => warn!(channel = %name, error = %e, "connectivity audit skipped"),
                    }
                }
            }
        }

        let lines: Vec<String> = report
            .candidates
            .iter()
            .filter_map(|c| c.message.clone())
            .chain(report.connectivity.iter().cloned())
            .collect();
        if !lines.is_empty() {
            let text = lines
                .iter()
                .map(|line| format!("* {line}"))
                .collect::<Vec<_>>()
                .join("\n");
            if let Err(e) = self.collaborators.notifier.notify(&text).await {
                warn!(error = %e, "failed to deliver notification");
            }
            report.notification = Some(text);
        }

        emit_pass_finished(
            started.elapsed().as_millis() as u64,
            report.promoted(),
            report.waiting(),
            report.blocked(),
            report.failed(),
        );
        METRICS.flush();
        Ok(report)
    }

    /// Evaluate every candidate of one fed channel. Promotions are recorded
    /// in `graph` so later channels and candidates see them.
    async fn promote_channel(
        &self,
        graph: &mut ChannelGraph,
        channel: &Channel,
        settings: &Feeder,
        risks: &RiskIndex,
        cache: &mut GraphCache,
        now: DateTime<Utc>,
    ) -> Result<Vec<CandidateReport>> {
        let feeder = graph.feeder_of(channel)?.cloned().ok_or_else(|| {
            PromoterError::MissingFeeder {
                channel: channel.name.clone(),
                feeder: settings.name.clone(),
            }
        })?;
        let candidates = graph.candidates(channel)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        info!(
            channel = %channel.name,
            feeder = %feeder.name,
            conditions = %settings.conditions(),
            candidates = candidates.versions.len() + candidates.malformed.len(),
            "considering promotions"
        );

        let mut reports = Vec::new();
        for raw in &candidates.malformed {
            let reason = PromoterError::InvalidVersion(raw.clone()).to_string();
            let message = format!("Cannot promote {raw} to {}: {reason}", channel.name);
            emit_decision(&channel.name, raw, "blocked", &reason);
            METRICS.inc_blocked();
            reports.push(CandidateReport {
                channel: channel.name.clone(),
                version: raw.clone(),
                outcome: Outcome::Blocked { reason },
                concerns: vec![Concern::fatal(ConcernKind::InvalidVersion, message.clone())],
                message: Some(message),
            });
        }
        if candidates.versions.is_empty() {
            return Ok(reports);
        }

        let history = match self
            .collaborators
            .history
            .first_appearances(&feeder.source)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                let error = PromoterError::from(e);
                for version in &candidates.versions {
                    reports.push(self.failed(channel, &version.to_string(), &error));
                }
                return Ok(reports);
            }
        };

        let mut versions = channel.versions.clone();
        for version in &candidates.versions {
            let mut in_flight = candidates.versions.clone();
            in_flight.remove(version);
            let context = ChannelContext {
                target: channel,
                feeder: &feeder,
                settings,
                versions: &versions,
                in_flight: &in_flight,
                history: &history,
            };
            let candidate = match self.evaluate(&context, version, risks, cache, now).await {
                Ok(candidate) => candidate,
                Err(e) => self.failed(channel, &version.to_string(), &e),
            };
            if matches!(candidate.outcome, Outcome::Promoted { .. }) {
                versions.insert(version.clone());
                graph.insert_version(&channel.name, version.clone());
            }
            reports.push(candidate);
        }
        Ok(reports)
    }

    fn failed(
        &self,
        channel: &Channel,
        version: &str,
        error: &dyn std::fmt::Display,
    ) -> CandidateReport {
        emit_candidate_error(&channel.name, version, error);
        METRICS.inc_failed();
        CandidateReport {
            channel: channel.name.clone(),
            version: version.to_string(),
            outcome: Outcome::Failed {
                error: error.to_string(),
            },
            concerns: Vec::new(),
            message: Some(format!(
                "FAILED {}: Promote {version}. {error}",
                channel.source_stem()
            )),
        }
    }

    async fn evaluate(
        &self,
        context: &ChannelContext<'_>,
        version: &Version,
        risks: &RiskIndex,
        cache: &mut GraphCache,
        now: DateTime<Utc>,
    ) -> Result<CandidateReport> {
        let channel = context.target;
        let key = version.to_string();
        let attribution =
            context
                .history
                .get(&key)
                .ok_or_else(|| PromoterError::MissingAttribution {
                    version: key.clone(),
                    path: context.feeder.source.clone(),
                })?;
        let age = now - attribution.committer_time;

        let mut errata_public = false;
        let mut errata_message = String::new();
        if context.settings.errata == ErrataGate::Public {
            let feeder_graph = cache
                .get_edges(&context.feeder.name, &self.config.architecture)
                .await?;
            if let Some(uri) = feeder_graph.advisory_url(version) {
                let status = self.collaborators.advisories.probe(uri).await?;
                errata_public = status.public;
                errata_message = format!(
                    " {} is{} public.",
                    status.uri,
                    if status.public { "" } else { " not" }
                );
            }
        }

        let mut concerns = check_continuity(version, context.versions, context.in_flight, risks);
        let mut current = channel.clone();
        current.versions = context.versions.clone();
        match check_reachability(
            version,
            &current,
            &self.config.bootstrap_phase,
            &self.config.architecture,
            cache,
        )
        .await
        {
            Ok(Some(concern)) => concerns.push(concern),
            Ok(None) => {}
            Err(e) => concerns.push(Concern::advisory(
                ConcernKind::Reachability,
                format!("Unable to check whether {version} can reach {}: {e}", channel.name),
            )),
        }

        let open = feeder_gate_open(context.settings, age, errata_public);
        let decision = decide(open, &concerns);
        let elapsed = format_elapsed(age);
        let date = attribution.committer_time.date_naive();
        let advisories: Vec<&str> = concerns
            .iter()
            .filter(|c| !c.is_fatal())
            .map(|c| c.message.as_str())
            .collect();
        let advisory_suffix = if advisories.is_empty() {
            String::new()
        } else {
            format!(" Concerns: {}", advisories.join(" "))
        };

        let subject = format!("{}: Promote {version}", channel.source_stem());
        let body = format!(
            "It was promoted to the feeder {} by {} ({}, {date}) {elapsed} ago.{errata_message}",
            context.feeder.name,
            attribution.short_hash(),
            attribution.summary,
        );

        let (outcome, message) = match &decision {
            Decision::Promote => {
                let request = PromotionRequest {
                    channel: channel.name.clone(),
                    source: channel.source.clone(),
                    version: key.clone(),
                    branch: format!("promote-{version}-to-{}", channel.name),
                    subject: subject.clone(),
                    body: body.clone(),
                };
                match self.collaborators.writer.append_version(&request).await {
                    Ok(()) => {}
                    Err(StorageError::PromotionConflict { .. }) => {
                        let reason = PromoterError::PromotionConflict {
                            version: key.clone(),
                            channel: channel.name.clone(),
                        }
                        .to_string();
                        return Ok(self.blocked(channel, &key, reason, concerns));
                    }
                    Err(e) => return Err(e.into()),
                }
                let pull_url = self
                    .collaborators
                    .pulls
                    .create(&request.branch, &subject, &body)
                    .await?;
                METRICS.inc_promoted();
                let message = format!("{subject}. {body} {pull_url}{advisory_suffix}");
                (Outcome::Promoted { pull_url }, Some(message))
            }
            Decision::Wait => {
                METRICS.inc_waiting();
                info!(
                    channel = %channel.name,
                    version = %version,
                    elapsed = %elapsed,
                    "waiting{errata_message}"
                );
                let message = self.config.waiting_notifications.then(|| {
                    format!(
                        "Recommend waiting to promote {version} to {}; it was promoted to the feeder {} by {} ({}, {date}, {elapsed}){errata_message}{advisory_suffix}",
                        channel.name,
                        context.feeder.name,
                        attribution.short_hash(),
                        attribution.summary,
                    )
                });
                (Outcome::Waiting, message)
            }
            Decision::Blocked(reason) => {
                return Ok(self.blocked(channel, &key, reason.clone(), concerns));
            }
        };

        emit_decision(&channel.name, &key, decision.label(), &advisory_suffix);
        Ok(CandidateReport {
            channel: channel.name.clone(),
            version: key,
            outcome,
            concerns,
            message,
        })
    }

    fn blocked(
        &self,
        channel: &Channel,
        version: &str,
        reason: String,
        concerns: Vec<Concern>,
    ) -> CandidateReport {
        emit_decision(&channel.name, version, "blocked", &reason);
        METRICS.inc_blocked();
        CandidateReport {
            channel: channel.name.clone(),
            version: version.to_string(),
            message: Some(format!(
                "Blocked promotion of {version} to {}: {reason}",
                channel.name
            )),
            outcome: Outcome::Blocked { reason },
            concerns,
        }
    }
}
