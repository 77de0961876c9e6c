//! Promotion passes driven entirely by in-memory collaborators.

use std::sync::Arc;

use channel_graph::{
    Collaborators, ConcernKind, EngineConfig, Exemptions, Outcome, PassReport, PromoterError,
    PromotionEngine,
};
use channel_remote::fakes::{
    RecordingNotifier, RecordingPullRequests, StaticAdvisoryProbe, StaticGraphService,
};
use channel_remote::GraphDocument;
use channel_store::fakes::{MemoryChannelStore, MemoryChannelWriter, MemoryVersionHistory};
use channel_store::{Attribution, BlockedEdgeDocument, ChannelDocument, FeederDocument};
use chrono::{DateTime, Duration, Utc};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-08T00:00:00Z")
        .expect("parse timestamp")
        .with_timezone(&Utc)
}

struct Harness {
    store: Arc<MemoryChannelStore>,
    history: Arc<MemoryVersionHistory>,
    writer: Arc<MemoryChannelWriter>,
    graphs: Arc<StaticGraphService>,
    advisories: Arc<StaticAdvisoryProbe>,
    pulls: Arc<RecordingPullRequests>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new(store: MemoryChannelStore) -> Self {
        let store = Arc::new(store);
        Self {
            writer: Arc::new(MemoryChannelWriter::backed_by(store.clone())),
            store,
            history: Arc::new(MemoryVersionHistory::new()),
            graphs: Arc::new(StaticGraphService::new()),
            advisories: Arc::new(StaticAdvisoryProbe::new()),
            pulls: Arc::new(RecordingPullRequests::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    fn with_graphs(mut self, graphs: StaticGraphService) -> Self {
        self.graphs = Arc::new(graphs);
        self
    }

    fn with_advisories(mut self, advisories: StaticAdvisoryProbe) -> Self {
        self.advisories = Arc::new(advisories);
        self
    }

    fn with_writer(mut self, writer: MemoryChannelWriter) -> Self {
        self.writer = Arc::new(writer);
        self
    }

    /// Record that `version` entered the feeder at `source` some time ago.
    fn added(self, source: &str, version: &str, age: Duration) -> Self {
        self.history.record(
            source,
            version,
            Attribution {
                hash: "0123456789abcdef0123456789abcdef01234567".to_string(),
                committer_time: now() - age,
                summary: format!("Add {version}"),
            },
        );
        self
    }

    fn engine(&self, config: EngineConfig) -> PromotionEngine {
        PromotionEngine::new(
            Collaborators {
                channels: self.store.clone(),
                history: self.history.clone(),
                writer: self.writer.clone(),
                graphs: self.graphs.clone(),
                advisories: self.advisories.clone(),
                pulls: self.pulls.clone(),
                notifier: self.notifier.clone(),
            },
            config,
        )
    }

    async fn pass(&self, config: EngineConfig) -> PassReport {
        self.engine(config).run_pass_at(now()).await.expect("pass")
    }
}

fn fast_from_candidate(delay: &str) -> MemoryChannelStore {
    MemoryChannelStore::new()
        .with_channel(ChannelDocument::new("candidate").with_versions(["1.0.0"]))
        .with_channel(
            ChannelDocument::new("fast")
                .with_feeder(FeederDocument::new("candidate").with_delay(delay)),
        )
}

// ---------------------------------------------------------------------------
// Gate outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zero_delay_promotes_into_empty_channel() {
    let h = Harness::new(fast_from_candidate("PT0H")).added(
        "channels/candidate.yaml",
        "1.0.0",
        Duration::hours(1),
    );

    let report = h.pass(EngineConfig::default()).await;

    assert_eq!(report.promoted(), 1);
    assert_eq!(report.waiting(), 0);
    assert_eq!(report.blocked(), 0);
    assert_eq!(h.store.versions_of("fast").unwrap(), vec!["1.0.0"]);

    let pulls = h.pulls.pulls();
    assert_eq!(pulls.len(), 1);
    assert_eq!(pulls[0].branch, "promote-1.0.0-to-fast");
    assert_eq!(pulls[0].title, "channels/fast: Promote 1.0.0");
    assert_eq!(
        pulls[0].body,
        "It was promoted to the feeder candidate by 0123456789 (Add 1.0.0, 2024-01-07) 1:00:00 ago."
    );

    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("* channels/fast: Promote 1.0.0."));
    assert!(!messages[0].contains("Recommend waiting"));
    assert!(!messages[0].contains("Blocked"));
}

#[tokio::test]
async fn young_candidate_waits() {
    let h = Harness::new(fast_from_candidate("P1W")).added(
        "channels/candidate.yaml",
        "1.0.0",
        Duration::days(6),
    );

    let report = h.pass(EngineConfig::default()).await;

    assert_eq!(report.waiting(), 1);
    assert!(h.writer.requests().is_empty());
    let messages = h.notifier.messages();
    assert!(messages[0].contains("Recommend waiting to promote 1.0.0 to fast"));
    assert!(messages[0].contains("6 days, 0:00:00"));
}

#[tokio::test]
async fn waiting_notifications_can_be_silenced() {
    let h = Harness::new(fast_from_candidate("P1W")).added(
        "channels/candidate.yaml",
        "1.0.0",
        Duration::days(1),
    );

    let report = h
        .pass(EngineConfig {
            waiting_notifications: false,
            ..EngineConfig::default()
        })
        .await;

    assert_eq!(report.waiting(), 1);
    assert!(report.notification.is_none());
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn manual_channel_never_promotes() {
    let store = MemoryChannelStore::new()
        .with_channel(ChannelDocument::new("candidate").with_versions(["1.0.0"]))
        .with_channel(ChannelDocument::new("eus").with_feeder(FeederDocument::new("candidate")));
    let h = Harness::new(store).added("channels/candidate.yaml", "1.0.0", Duration::days(365));

    let report = h.pass(EngineConfig::default()).await;

    assert_eq!(report.waiting(), 1);
    assert_eq!(report.promoted(), 0);
}

#[tokio::test]
async fn public_errata_opens_gate() {
    let store = MemoryChannelStore::new()
        .with_channel(ChannelDocument::new("candidate").with_versions(["1.0.0", "1.0.1"]))
        .with_channel(
            ChannelDocument::new("fast")
                .with_feeder(FeederDocument::new("candidate").with_errata("public")),
        );
    let graphs = StaticGraphService::new().with_graph(
        "candidate",
        "amd64",
        GraphDocument::with_nodes(["1.0.0", "1.0.1"])
            .advisory("1.0.0", "https://errata.example/RHBA-2024:1")
            .advisory("1.0.1", "https://errata.example/RHBA-2024:2"),
    );
    let advisories = StaticAdvisoryProbe::new().with_public("https://errata.example/RHBA-2024:1");
    let h = Harness::new(store)
        .with_graphs(graphs)
        .with_advisories(advisories)
        .added("channels/candidate.yaml", "1.0.0", Duration::minutes(5))
        .added("channels/candidate.yaml", "1.0.1", Duration::minutes(5));

    let report = h
        .pass(EngineConfig {
            audit_connectivity: false,
            ..EngineConfig::default()
        })
        .await;

    assert_eq!(report.promoted(), 1);
    assert_eq!(report.waiting(), 1);
    assert!(h.pulls.pulls()[0]
        .body
        .ends_with("https://errata.example/RHBA-2024:1 is public."));
    let waiting = report
        .candidates
        .iter()
        .find(|c| c.version == "1.0.1")
        .unwrap();
    assert!(waiting
        .message
        .as_deref()
        .unwrap()
        .contains("https://errata.example/RHBA-2024:2 is not public."));
    assert_eq!(h.graphs.fetch_count(), 1);
}

// ---------------------------------------------------------------------------
// Concerns
// ---------------------------------------------------------------------------

fn fast_49(blocked: BlockedEdgeDocument) -> Harness {
    let store = MemoryChannelStore::new()
        .with_channel(ChannelDocument::new("candidate-4.9").with_versions(["4.9.1", "4.9.2"]))
        .with_channel(
            ChannelDocument::new("fast-4.9")
                .with_versions(["4.9.1"])
                .with_feeder(FeederDocument::new("candidate-4.9").with_delay("PT0H")),
        )
        .with_blocked_edge(blocked);
    Harness::new(store).added("channels/candidate-4.9.yaml", "4.9.2", Duration::hours(2))
}

#[tokio::test]
async fn unextended_risk_blocks_promotion() {
    let h = fast_49(BlockedEdgeDocument::new("4.9.1", "4[.]8[.].*").named("Foo"));

    let report = h.pass(EngineConfig::default()).await;

    assert_eq!(report.blocked(), 1);
    let candidate = &report.candidates[0];
    match &candidate.outcome {
        Outcome::Blocked { reason } => assert!(reason.contains("Foo")),
        other => panic!("expected blocked, got {other:?}"),
    }
    assert!(candidate
        .concerns
        .iter()
        .any(|c| c.kind == ConcernKind::RiskContinuity));
    assert!(h.writer.requests().is_empty());
    assert!(h.notifier.messages()[0].contains("Blocked promotion of 4.9.2 to fast-4.9"));
}

#[tokio::test]
async fn fixed_risk_does_not_block() {
    let h = fast_49(
        BlockedEdgeDocument::new("4.9.1", "4[.]8[.].*")
            .named("Foo")
            .fixed_in("4.9.2"),
    );

    let report = h.pass(EngineConfig::default()).await;

    assert_eq!(report.promoted(), 1);
    assert_eq!(h.store.versions_of("fast-4.9").unwrap(), vec!["4.9.1", "4.9.2"]);
}

#[tokio::test]
async fn unreachable_target_line_is_advisory() {
    let store = MemoryChannelStore::new()
        .with_channel(
            ChannelDocument::new("fast-4.10").with_versions(["4.9.5", "4.9.6", "4.10.0"]),
        )
        .with_channel(
            ChannelDocument::new("stable-4.10")
                .with_versions(["4.9.5", "4.10.0"])
                .with_feeder(FeederDocument::new("fast-4.10").with_delay("PT1H")),
        );
    let graphs = StaticGraphService::new()
        .with_graph("candidate-4.9", "amd64", GraphDocument::with_nodes(["4.9.5", "4.9.6"]))
        .with_graph(
            "candidate-4.10",
            "amd64",
            GraphDocument::default().edge("4.9.5", "4.10.0"),
        );
    let h = Harness::new(store)
        .with_graphs(graphs)
        .added("channels/fast-4.10.yaml", "4.9.6", Duration::hours(3));

    let report = h.pass(EngineConfig::default()).await;

    assert_eq!(report.promoted(), 1);
    let concern = report.candidates[0]
        .concerns
        .iter()
        .find(|c| c.kind == ConcernKind::Reachability)
        .expect("reachability concern");
    assert!(!concern.is_fatal());
    assert!(concern.message.contains("4.10"));
    assert!(concern.message.contains("stable-4.10"));
    assert!(h.notifier.messages()[0].contains("Concerns:"));
}

#[tokio::test]
async fn malformed_candidate_is_blocked() {
    let store = MemoryChannelStore::new()
        .with_channel(ChannelDocument::new("candidate").with_versions(["1.0"]))
        .with_channel(
            ChannelDocument::new("fast")
                .with_feeder(FeederDocument::new("candidate").with_delay("PT0H")),
        );
    let h = Harness::new(store);

    let report = h.pass(EngineConfig::default()).await;

    assert_eq!(report.blocked(), 1);
    assert_eq!(report.candidates[0].version, "1.0");
    assert_eq!(
        report.candidates[0].concerns[0].kind,
        ConcernKind::InvalidVersion
    );
}

// ---------------------------------------------------------------------------
// Failures and conflicts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn version_already_upstream_is_a_conflict() {
    let upstream = Arc::new(
        MemoryChannelStore::new()
            .with_channel(ChannelDocument::new("fast").with_versions(["1.0.0"])),
    );
    let h = Harness::new(fast_from_candidate("PT0H"))
        .with_writer(MemoryChannelWriter::backed_by(upstream))
        .added("channels/candidate.yaml", "1.0.0", Duration::hours(1));

    let report = h.pass(EngineConfig::default()).await;

    assert_eq!(report.blocked(), 1);
    match &report.candidates[0].outcome {
        Outcome::Blocked { reason } => assert!(reason.contains("already been promoted")),
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(h.pulls.pulls().is_empty());
}

#[tokio::test]
async fn candidate_failures_do_not_stop_the_batch() {
    let store = MemoryChannelStore::new()
        .with_channel(ChannelDocument::new("candidate").with_versions(["1.0.0", "1.0.1"]))
        .with_channel(
            ChannelDocument::new("fast")
                .with_feeder(FeederDocument::new("candidate").with_delay("PT0H")),
        );
    let h = Harness::new(store).added("channels/candidate.yaml", "1.0.1", Duration::hours(1));

    let report = h.pass(EngineConfig::default()).await;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.promoted(), 1);
    let failed = &report.candidates[0];
    assert_eq!(failed.version, "1.0.0");
    assert!(failed
        .message
        .as_deref()
        .unwrap()
        .starts_with("FAILED channels/fast: Promote 1.0.0."));
    assert_eq!(h.store.versions_of("fast").unwrap(), vec!["1.0.1"]);
}

#[tokio::test]
async fn writer_failure_is_reported() {
    let h = Harness::new(fast_from_candidate("PT0H")).added(
        "channels/candidate.yaml",
        "1.0.0",
        Duration::hours(1),
    );
    h.writer.fail_with("push rejected");

    let report = h.pass(EngineConfig::default()).await;

    assert_eq!(report.failed(), 1);
    match &report.candidates[0].outcome {
        Outcome::Failed { error } => assert!(error.contains("push rejected")),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn second_pass_sees_earlier_promotions() {
    let h = Harness::new(fast_from_candidate("PT0H")).added(
        "channels/candidate.yaml",
        "1.0.0",
        Duration::hours(1),
    );
    let mut engine = h.engine(EngineConfig::default());

    let first = engine.run_pass_at(now()).await.unwrap();
    let second = engine.run_pass_at(now()).await.unwrap();

    assert_eq!(first.promoted(), 1);
    assert!(second.candidates.is_empty());
    assert_eq!(h.notifier.messages().len(), 1);
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_feeder_aborts_pass() {
    let store = MemoryChannelStore::new()
        .with_channel(ChannelDocument::new("fast").with_feeder(FeederDocument::new("candidate")));
    let h = Harness::new(store);

    let err = h
        .engine(EngineConfig::default())
        .run_pass_at(now())
        .await
        .unwrap_err();
    assert!(matches!(err, PromoterError::MissingFeeder { .. }));
    assert!(err.is_configuration());
}

#[tokio::test]
async fn invalid_blocked_edge_aborts_pass() {
    let store = fast_from_candidate("PT0H")
        .with_blocked_edge(BlockedEdgeDocument::new("1.0.0", ".*").named("lower case"));
    let h = Harness::new(store);

    let err = h
        .engine(EngineConfig::default())
        .run_pass_at(now())
        .await
        .unwrap_err();
    assert!(matches!(err, PromoterError::InvalidBlockedEdge { .. }));
}

// ---------------------------------------------------------------------------
// Audits and validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stranded_release_is_reported_once_per_channel() {
    let store = MemoryChannelStore::new()
        .with_channel(
            ChannelDocument::new("candidate-4.9").with_versions(["4.9.1", "4.9.2", "4.9.3"]),
        )
        .with_channel(
            ChannelDocument::new("stable-4.9")
                .with_versions(["4.9.1", "4.9.2", "4.9.3"])
                .with_feeder(FeederDocument::new("candidate-4.9").with_delay("P1W")),
        );
    let graphs = StaticGraphService::new().with_graph(
        "candidate-4.9",
        "amd64",
        GraphDocument::default().edge("4.9.2", "4.9.3"),
    );
    let h = Harness::new(store).with_graphs(graphs);

    let report = h.pass(EngineConfig::default()).await;

    assert!(report.candidates.is_empty());
    assert_eq!(report.connectivity.len(), 2);
    assert!(report.connectivity[0].starts_with("candidate-4.9: 4.9.1 has no update"));
    assert!(report.connectivity[1].starts_with("stable-4.9: 4.9.1 has no update"));
    assert!(h.notifier.messages()[0].contains("4.9.1 has no update"));

    let quiet = h
        .pass(EngineConfig {
            exemptions: Exemptions::new(["4.9.1"]),
            ..EngineConfig::default()
        })
        .await;
    assert!(quiet.connectivity.is_empty());
}

#[tokio::test]
async fn channel_without_feeder_is_still_audited() {
    let store = MemoryChannelStore::new().with_channel(
        ChannelDocument::new("candidate-4.9").with_versions(["4.9.1", "4.9.2", "4.9.3"]),
    );
    let graphs = StaticGraphService::new().with_graph(
        "candidate-4.9",
        "amd64",
        GraphDocument::default().edge("4.9.2", "4.9.3"),
    );
    let h = Harness::new(store).with_graphs(graphs);

    let report = h.pass(EngineConfig::default()).await;

    assert!(report.candidates.is_empty());
    assert_eq!(report.connectivity.len(), 1);
    assert!(report.connectivity[0].starts_with("candidate-4.9: 4.9.1 has no update"));
}

#[tokio::test]
async fn history_failure_still_audits_the_channel() {
    let store = MemoryChannelStore::new()
        .with_channel(
            ChannelDocument::new("candidate-4.9")
                .with_versions(["4.9.1", "4.9.2", "4.9.3", "4.9.4"]),
        )
        .with_channel(
            ChannelDocument::new("stable-4.9")
                .with_versions(["4.9.1", "4.9.2", "4.9.3"])
                .with_feeder(FeederDocument::new("candidate-4.9").with_delay("PT0H")),
        );
    let graphs = StaticGraphService::new().with_graph(
        "candidate-4.9",
        "amd64",
        GraphDocument::default().edge("4.9.2", "4.9.3").edge("4.9.3", "4.9.4"),
    );
    let h = Harness::new(store).with_graphs(graphs);
    h.history.fail_with("blame failed");

    let report = h.pass(EngineConfig::default()).await;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.blocked(), 0);
    assert_eq!(report.candidates[0].version, "4.9.4");
    match &report.candidates[0].outcome {
        Outcome::Failed { error } => assert!(error.contains("blame failed")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(report
        .connectivity
        .iter()
        .any(|w| w.starts_with("stable-4.9: 4.9.1 has no update")));
    assert!(h.store.versions_of("stable-4.9").unwrap().len() == 3);
}

#[tokio::test]
async fn validate_reports_channel_order() {
    let store = MemoryChannelStore::new()
        .with_channel(ChannelDocument::new("candidate-4.9").with_versions(["4.9.1"]))
        .with_channel(ChannelDocument::new("fast-4.9").with_versions(["4.9.1", "4.9.2"]))
        .with_blocked_edge(BlockedEdgeDocument::new("4.9.1", ".*").named("Foo"));
    let h = Harness::new(store);

    let report = h.engine(EngineConfig::default()).validate().await.unwrap();

    assert_eq!(report.channels, 2);
    assert_eq!(report.blocked_edges, 1);
    assert!(!report.is_ok());
    assert_eq!(
        report.order_violations,
        vec!["Release 4.9.2 present in fast-4.9, but not in candidate-4.9".to_string()]
    );
}
