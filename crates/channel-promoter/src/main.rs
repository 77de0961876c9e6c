//! channel-promoter - release channel promotion CLI
//!
//! Promotes versions from feeder channels into the channels they feed once
//! each feeder's gate opens, then audits the resulting update graph.
//!
//! ## Commands
//!
//! - `run`: one promotion pass
//! - `poll`: promotion passes on an interval until interrupted
//! - `validate`: load the data directory and report configuration problems
//! - `edges`: print a channel's update-graph edges

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use channel_graph::{
    init_tracing, path_to_line, split_channel_name, Collaborators, EngineConfig, Exemptions,
    PassReport, PromotionEngine, UpdateGraph, Version,
};
use channel_remote::{
    notifier_for, GitHubConfig, GitHubPullRequests, GraphService, GraphServiceConfig,
    HttpAdvisoryProbe, HttpGraphService, RetryPolicy,
};
use channel_store::{FsChannelStore, GitBlameHistory, GitChannelWriter, UpstreamConfig};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn, Level};

#[derive(Parser)]
#[command(name = "channel-promoter")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Promote releases between update channels", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct Settings {
    /// Graph-data checkout holding channels/ and blocked-edges/
    #[arg(short = 'C', long, global = true, default_value = ".")]
    data_dir: PathBuf,

    /// Architecture whose update graphs are consulted
    #[arg(long, global = true, default_value = "amd64")]
    arch: String,

    /// Update graph service endpoint
    #[arg(long, global = true, env = "GRAPH_SERVICE_URI")]
    graph_uri: Option<String>,

    /// Attempts per graph or advisory request
    #[arg(long, global = true, default_value_t = 5)]
    retry_attempts: u32,

    /// Seconds to wait between attempts
    #[arg(long, global = true, default_value_t = 10)]
    retry_backoff: u64,

    /// Repository pull requests are opened against
    #[arg(long, default_value = "openshift/cincinnati-graph-data")]
    github_repo: String,

    /// Token used to open pull requests
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Labels applied to new pull requests
    #[arg(long, value_delimiter = ',', default_value = "lgtm,approved")]
    labels: Vec<String>,

    /// Remote promotions branch from and push to
    #[arg(long, default_value = "origin")]
    upstream_remote: String,

    /// Branch promotions branch from and pull requests target
    #[arg(long, default_value = "master")]
    upstream_branch: String,

    /// Chat webhook for notifications (stdout when unset)
    #[arg(long, env = "WEBHOOK", hide_env_values = true)]
    webhook: Option<String>,

    /// Line prepended to every webhook notification
    #[arg(long, default_value = "")]
    notify_header: String,

    /// YAML file listing releases exempt from the connectivity audit
    #[arg(long)]
    exemptions: Option<PathBuf>,

    /// Do not notify about candidates that are still waiting
    #[arg(long)]
    no_waiting_notifications: bool,

    /// Skip the connectivity audit after each pass
    #[arg(long)]
    no_connectivity_audit: bool,
}

impl Settings {
    fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            backoff: Duration::from_secs(self.retry_backoff),
        }
    }

    fn graph_service(&self) -> Result<HttpGraphService> {
        let config = match &self.graph_uri {
            Some(uri) => GraphServiceConfig::new(uri),
            None => GraphServiceConfig::default(),
        }
        .with_retry(self.retry_attempts, Duration::from_secs(self.retry_backoff));
        HttpGraphService::new(config).context("Failed to build graph service client")
    }

    fn engine_config(&self) -> Result<EngineConfig> {
        let exemptions = match &self.exemptions {
            Some(path) => load_exemptions(path)?,
            None => Exemptions::default(),
        };
        Ok(EngineConfig {
            architecture: self.arch.clone(),
            waiting_notifications: !self.no_waiting_notifications,
            audit_connectivity: !self.no_connectivity_audit,
            exemptions,
            ..EngineConfig::default()
        })
    }

    fn engine(&self) -> Result<PromotionEngine> {
        let graphs = self.graph_service()?;
        let user_agent = graphs.config().user_agent.clone();

        let mut github = GitHubConfig::new(&self.github_repo);
        if let Some(token) = self.github_token.as_deref().filter(|t| !t.is_empty()) {
            github = github.with_token(token);
        }
        github.base = self.upstream_branch.clone();
        github.labels = self.labels.clone();

        let upstream = UpstreamConfig {
            remote: self.upstream_remote.clone(),
            branch: self.upstream_branch.clone(),
        };

        let collaborators = Collaborators {
            channels: Arc::new(FsChannelStore::new(&self.data_dir)),
            history: Arc::new(GitBlameHistory::new(&self.data_dir)),
            writer: Arc::new(GitChannelWriter::new(&self.data_dir, upstream)),
            graphs: Arc::new(graphs),
            advisories: Arc::new(
                HttpAdvisoryProbe::new(&user_agent, self.retry())
                    .context("Failed to build advisory client")?,
            ),
            pulls: Arc::new(
                GitHubPullRequests::new(github).context("Failed to build GitHub client")?,
            ),
            notifier: notifier_for(self.webhook.as_deref(), &self.notify_header),
        };
        Ok(PromotionEngine::new(collaborators, self.engine_config()?))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single promotion pass
    Run,

    /// Run promotion passes until interrupted
    Poll {
        /// Seconds between the end of one pass and the start of the next
        #[arg(short, long, default_value_t = 3600)]
        interval: u64,
    },

    /// Check channel, feeder and blocked-edge configuration
    Validate,

    /// Print the update-graph edges of a channel
    Edges {
        /// Channel to fetch, e.g. stable-4.10
        channel: String,

        /// Only show edges reachable from this version
        #[arg(long)]
        root_version: Option<String>,

        /// List versions with no unconditional path to the channel's line
        #[arg(long)]
        unreachable: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Run => cmd_run(&cli.settings).await,
        Commands::Poll { interval } => cmd_poll(&cli.settings, Duration::from_secs(interval)).await,
        Commands::Validate => cmd_validate(&cli.settings).await,
        Commands::Edges {
            channel,
            root_version,
            unreachable,
        } => cmd_edges(&cli.settings, &channel, root_version.as_deref(), unreachable).await,
    }
}

fn load_exemptions(path: &Path) -> Result<Exemptions> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read exemptions file: {:?}", path))?;
    Exemptions::from_yaml(&text).with_context(|| format!("Invalid exemptions YAML in {:?}", path))
}

fn log_report(report: &PassReport) {
    for candidate in &report.candidates {
        if let channel_graph::Outcome::Failed { error } = &candidate.outcome {
            error!(
                channel = %candidate.channel,
                version = %candidate.version,
                error = %error,
                "candidate failed"
            );
        }
    }
    for warning in &report.connectivity {
        warn!("{}", warning);
    }
    info!(
        promoted = report.promoted(),
        waiting = report.waiting(),
        blocked = report.blocked(),
        failed = report.failed(),
        "pass complete"
    );
}

async fn cmd_run(settings: &Settings) -> Result<()> {
    let mut engine = settings.engine()?;
    let report = engine.run_pass().await.context("Promotion pass failed")?;
    log_report(&report);
    if report.failed() > 0 {
        anyhow::bail!("{} candidate(s) failed", report.failed());
    }
    Ok(())
}

async fn cmd_poll(settings: &Settings, interval: Duration) -> Result<()> {
    let mut engine = settings.engine()?;
    info!(interval_secs = interval.as_secs(), "polling");
    loop {
        // A broken data directory may be fixed upstream, so keep going.
        match engine.run_pass().await {
            Ok(report) => log_report(&report),
            Err(e) => error!(error = %e, "promotion pass failed"),
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for interrupt")?;
                info!("interrupted, stopping");
                return Ok(());
            }
        }
    }
}

async fn cmd_validate(settings: &Settings) -> Result<()> {
    let engine = settings.engine()?;
    let report = engine
        .validate()
        .await
        .context("Configuration is invalid")?;
    println!(
        "{} channels, {} blocked edges",
        report.channels, report.blocked_edges
    );
    for violation in &report.order_violations {
        println!("{}", violation);
    }
    if !report.is_ok() {
        anyhow::bail!(
            "{} channel order violation(s)",
            report.order_violations.len()
        );
    }
    Ok(())
}

async fn cmd_edges(
    settings: &Settings,
    channel: &str,
    root_version: Option<&str>,
    unreachable: bool,
) -> Result<()> {
    let root = root_version
        .map(Version::parse)
        .transpose()
        .context("Invalid --root-version")?;

    let service = settings.graph_service()?;
    let uri = service.source_uri(channel, &settings.arch);
    let document = service
        .fetch(channel, &settings.arch)
        .await
        .with_context(|| format!("Failed to fetch {}", uri))?;
    let graph = UpdateGraph::from_document(channel, &settings.arch, &uri, &document)
        .with_context(|| format!("Failed to decode {}", uri))?;

    for line in graph.edge_lines(root.as_ref()) {
        println!("{}", line);
    }

    if unreachable {
        let (_, target) = split_channel_name(channel);
        let target = target
            .with_context(|| format!("Channel {} has no release line", channel))?;
        for version in graph.versions() {
            if let Err(message) = path_to_line(version, target, &graph) {
                println!("{}", message);
            }
        }
    }
    Ok(())
}
