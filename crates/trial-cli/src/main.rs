// crates/trial-cli/src/main.rs
// ============================================================================
// Module: Trial CLI Entry Point
// Description: Command dispatcher for ingestion, sponsor resolution, review
//              queue administration, scoring, and catalyst-window inference.
// Purpose: Provide an operator-facing front end over trial-broker/
//          trial-engine/trial-store-sqlite, writing only through an
//          explicit output handle.
// Dependencies: clap, trial-broker, trial-config, trial-core, trial-engine,
//               trial-providers, trial-store-sqlite
// ============================================================================

//! ## Overview
//! Every subcommand loads [`trial_config::TrialConfig`], opens a
//! [`SqliteStore`] against its `store.dsn`, and writes results through an
//! injected writer rather than `println!` — the library crates beneath this
//! one never print, and this is the one place their structured outcomes are
//! rendered.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::io::Write;
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use thiserror::Error;
use time::Date;
use time::OffsetDateTime;
use time::macros::format_description;
use trial_broker::CancellationToken;
use trial_broker::IngestOrchestrator;
use trial_broker::score_and_persist;
use trial_config::RegistryConfig;
use trial_config::StoreConfig;
use trial_config::TrialConfig;
use trial_core::CompanyId;
use trial_core::NctId;
use trial_core::ResolverDecisionMode;
use trial_core::ResolverDecisionRecord;
use trial_core::ResolverReviewItem;
use trial_core::ResolverStore;
use trial_core::ReviewCandidate;
use trial_core::ReviewItemId;
use trial_core::RunId;
use trial_core::ScoreStore;
use trial_core::TrialId;
use trial_engine::GateEngineConfig;
use trial_engine::PriorContext;
use trial_engine::Severity;
use trial_engine::SignalResult;
use trial_engine::TerminalEvent;
use trial_engine::infer_catalyst_window;
use trial_engine::parse_hint;
use trial_engine::resolve_sponsor;
use trial_providers::HttpRegistryClient;
use trial_providers::HttpRegistryClientConfig;
use trial_store_sqlite::SqliteStore;
use trial_store_sqlite::SqliteStoreConfig;
use trial_store_sqlite::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Page size requested per registry fetch.
const DEFAULT_PAGE_SIZE: u32 = 100;
/// Hard cap on requested page size regardless of configuration.
const MAX_PAGE_SIZE: u32 = 500;
/// Per-page HTTP request timeout.
const REGISTRY_TIMEOUT: Duration = Duration::from_secs(30);
/// Outbound User-Agent string for registry requests.
const USER_AGENT: &str = concat!("trial-cli/", env!("CARGO_PKG_VERSION"));
/// Default cap on `review list` output when `--limit` is omitted.
const DEFAULT_REVIEW_LIMIT: usize = 50;
/// Placeholder id passed to `write_review_item`; the store assigns and
/// returns the real one, ignoring this field entirely.
const PLACEHOLDER_REVIEW_ITEM_ID: NonZeroU64 = NonZeroU64::MIN;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "trial-cli", disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Pages the registry and ingests every returned trial.
    Ingest(IngestArgs),
    /// Resolves one trial's sponsor text against the known company graph.
    ResolveSponsor(ResolveSponsorArgs),
    /// Human review queue administration.
    Review {
        /// Selected review subcommand.
        #[command(subcommand)]
        command: ReviewCommand,
    },
    /// Evaluates G1..G4 and the posterior for a trial, persisting the score.
    Score(ScoreArgs),
    /// Infers and persists a trial's catalyst window.
    Catalyst(CatalystArgs),
}

/// `review` subcommands.
#[derive(Subcommand, Debug)]
enum ReviewCommand {
    /// Lists pending review items, oldest first.
    List(ReviewListArgs),
    /// Accepts a queued review item as a human decision.
    Accept(ReviewAcceptArgs),
    /// Rejects a queued review item (not persisted as a decision).
    Reject(ReviewRejectArgs),
}

/// Arguments shared by every subcommand that opens a store.
#[derive(clap::Args, Debug)]
struct ConfigArgs {
    /// Path to the YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Arguments for `ingest`.
#[derive(clap::Args, Debug)]
struct IngestArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// Only request trials updated on or after this date (`YYYY-MM-DD`).
    #[arg(long)]
    since: Option<String>,
}

/// Arguments for `resolve-sponsor`.
#[derive(clap::Args, Debug)]
struct ResolveSponsorArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// The trial's NCT accession.
    #[arg(long)]
    nct_id: String,
    /// The run this decision belongs to.
    #[arg(long)]
    run_id: String,
    /// Sponsor text to record if the trial does not already exist.
    #[arg(long, default_value = "")]
    sponsor_text: String,
}

/// Arguments for `review list`.
#[derive(clap::Args, Debug)]
struct ReviewListArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// Maximum number of items to list.
    #[arg(long, default_value_t = DEFAULT_REVIEW_LIMIT)]
    limit: usize,
}

/// Arguments for `review accept`.
#[derive(clap::Args, Debug)]
struct ReviewAcceptArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// The review item's surrogate key.
    #[arg(long)]
    review_id: u64,
    /// The run this decision belongs to.
    #[arg(long)]
    run_id: String,
    /// The company the reviewer assigned.
    #[arg(long)]
    company_id: u64,
    /// Free-text rationale.
    #[arg(long)]
    notes: Option<String>,
}

/// Arguments for `review reject`.
#[derive(clap::Args, Debug)]
struct ReviewRejectArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// The review item's surrogate key.
    #[arg(long)]
    review_id: u64,
}

/// Arguments for `score`.
#[derive(clap::Args, Debug)]
struct ScoreArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// The trial being scored.
    #[arg(long)]
    trial_id: u64,
    /// The run producing this score.
    #[arg(long)]
    run_id: String,
    /// Fired signal ids, each optionally suffixed `:high`/`:medium`/`:low`
    /// (default `medium`), e.g. `--signal S1:high --signal S3`.
    #[arg(long = "signal")]
    signals: Vec<String>,
    /// Stop-rule flags that fired (matched against `gates.stop_rules` keys).
    #[arg(long = "stop-rule")]
    stop_rules: Vec<String>,
    /// The trial is pivotal/registrational.
    #[arg(long)]
    pivotal: bool,
    /// The trial's indication is oncology.
    #[arg(long)]
    oncology: bool,
    /// The trial's indication is a rare disease.
    #[arg(long)]
    rare_disease: bool,
    /// The trial is Phase 3.
    #[arg(long)]
    phase3: bool,
    /// The trial is Phase 1.
    #[arg(long)]
    phase1: bool,
}

/// Arguments for `catalyst`.
#[derive(clap::Args, Debug)]
struct CatalystArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// The trial the window concerns.
    #[arg(long)]
    trial_id: u64,
    /// Estimated primary-completion date (`YYYY-MM-DD`).
    #[arg(long)]
    epcd: String,
    /// Age, in days, of the registry version `epcd` was read from.
    #[arg(long, default_value_t = 0)]
    epcd_age_days: i64,
    /// Freeform readout hint text, repeatable.
    #[arg(long = "hint")]
    hints: Vec<String>,
    /// Historical slip-distribution mean, in days.
    #[arg(long, default_value_t = 0)]
    mean_slip_days: i64,
    /// Historical slip-distribution 10th percentile, in days.
    #[arg(long, default_value_t = 0)]
    slip_p10_days: i64,
    /// Historical slip-distribution 90th percentile, in days.
    #[arg(long, default_value_t = 0)]
    slip_p90_days: i64,
    /// Number of historical events the slip statistic is based on.
    #[arg(long, default_value_t = 0)]
    slip_n_events: u32,
    /// An actual readout/termination date, if known (`YYYY-MM-DD`);
    /// overrides all window fusion.
    #[arg(long)]
    terminal_event_date: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Top-level CLI error wrapper.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration failed to load or validate.
    #[error("config error: {0}")]
    Config(#[from] trial_config::ConfigError),
    /// The store rejected an operation.
    #[error("store error: {0}")]
    Store(#[from] SqliteStoreError),
    /// A `trial-core` interface error surfaced from the store.
    #[error("interface error: {0}")]
    ResolverStore(#[from] trial_core::ResolverStoreError),
    /// A `trial-core` score-store error surfaced from the store.
    #[error("score error: {0}")]
    ScoreStore(#[from] trial_core::ScoreStoreError),
    /// The registry client could not be constructed or failed.
    #[error("registry error: {0}")]
    Registry(#[from] trial_core::RegistryError),
    /// A batch-level ingestion failure (not a per-trial one).
    #[error("ingest error: {0}")]
    Ingest(#[from] trial_broker::IngestError),
    /// Gate engine configuration was incomplete.
    #[error("gate config error: {0}")]
    GateConfig(#[from] trial_engine::GateEngineError),
    /// A CLI argument could not be parsed into a domain type.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Writing to the output handle failed.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut stdout = std::io::stdout();
    match dispatch(cli.command, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(std::io::stderr(), "{err}");
            ExitCode::FAILURE
        }
    }
}

/// Routes a parsed subcommand to its handler.
fn dispatch(command: Commands, out: &mut dyn Write) -> CliResult<()> {
    match command {
        Commands::Ingest(args) => command_ingest(args, out),
        Commands::ResolveSponsor(args) => command_resolve_sponsor(args, out),
        Commands::Review { command } => match command {
            ReviewCommand::List(args) => command_review_list(args, out),
            ReviewCommand::Accept(args) => command_review_accept(args, out),
            ReviewCommand::Reject(args) => command_review_reject(args, out),
        },
        Commands::Score(args) => command_score(args, out),
        Commands::Catalyst(args) => command_catalyst(args, out),
    }
}

// ============================================================================
// SECTION: Shared Helpers
// ============================================================================

/// Loads configuration from the path given by `--config`, or the default
/// resolution rules when absent.
fn load_config(args: &ConfigArgs) -> CliResult<TrialConfig> {
    Ok(TrialConfig::load(args.config.as_deref())?)
}

/// Opens the store at `store_config.dsn`, filling every other
/// [`SqliteStoreConfig`] field from its in-memory defaults.
fn open_store(store_config: &StoreConfig) -> CliResult<SqliteStore> {
    let config = SqliteStoreConfig {
        path: PathBuf::from(&store_config.dsn),
        ..SqliteStoreConfig::in_memory()
    };
    Ok(SqliteStore::open(config)?)
}

/// Parses a `YYYY-MM-DD` CLI argument, naming `field` in the error on
/// failure.
fn parse_date(text: &str, field: &str) -> CliResult<Date> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(text, &format).map_err(|err| CliError::InvalidArgument(format!("{field}: {err}")))
}

/// Parses a `--trial-id` argument into a [`TrialId`].
fn parse_trial_id(raw: u64) -> CliResult<TrialId> {
    TrialId::try_from(raw).map_err(|err| CliError::InvalidArgument(format!("trial_id: {err}")))
}

/// Parses a `--company-id` argument into a [`CompanyId`].
fn parse_company_id(raw: u64) -> CliResult<CompanyId> {
    CompanyId::try_from(raw).map_err(|err| CliError::InvalidArgument(format!("company_id: {err}")))
}

/// Parses a `--review-id` argument into a [`ReviewItemId`].
fn parse_review_item_id(raw: u64) -> CliResult<ReviewItemId> {
    NonZeroU64::new(raw)
        .map(ReviewItemId::new)
        .ok_or_else(|| CliError::InvalidArgument("review_id must be nonzero".to_string()))
}

/// Parses a `--signal` value of the form `ID` or `ID:severity`.
fn parse_signal_flag(raw: &str) -> CliResult<SignalResult> {
    let (id, severity) = raw.split_once(':').unwrap_or((raw, "medium"));
    let severity = match severity.to_ascii_lowercase().as_str() {
        "high" => Severity::High,
        "medium" => Severity::Medium,
        "low" => Severity::Low,
        other => {
            return Err(CliError::InvalidArgument(format!(
                "unknown severity {other:?} in --signal {raw:?} (expected high, medium, or low)"
            )));
        }
    };
    Ok(SignalResult {
        signal_id: trial_core::SignalId::new(id),
        fired: true,
        severity,
        value: None,
        reason: format!("asserted via --signal {raw}"),
        evidence_spans: Vec::new(),
        low_cert_inputs: false,
    })
}

/// Builds an [`HttpRegistryClient`] from `RegistryConfig` plus the
/// CLI-level constants `RegistryConfig` doesn't carry.
fn build_registry_client(config: &RegistryConfig, since: Option<Date>) -> CliResult<HttpRegistryClient> {
    let client_config = HttpRegistryClientConfig {
        base_url: config.base_url.clone(),
        page_size: DEFAULT_PAGE_SIZE,
        max_page_size: MAX_PAGE_SIZE,
        max_retries: config.max_retries,
        timeout: REGISTRY_TIMEOUT,
        user_agent: USER_AGENT.to_string(),
        since,
    };
    let window = Duration::from_millis(config.rate_limit_window_ms);
    Ok(HttpRegistryClient::new(client_config, config.rate_limit_requests, window)?)
}

// ============================================================================
// SECTION: Ingest
// ============================================================================

/// Pages the registry and ingests every returned trial, printing a batch summary.
fn command_ingest(args: IngestArgs, out: &mut dyn Write) -> CliResult<()> {
    let config = load_config(&args.config)?;
    let store = open_store(&config.store)?;
    let since = args.since.as_deref().map(|text| parse_date(text, "since")).transpose()?;
    let registry = build_registry_client(&config.registry, since)?;
    let orchestrator =
        IngestOrchestrator::new(&registry, &store, &config.change_detector, CancellationToken::new());
    let report = orchestrator.run_batch()?;
    writeln!(
        out,
        "pages={} records_seen={} appended={} unchanged={} failed={} cancelled={}",
        report.pages_fetched,
        report.records_seen,
        report.outcomes.iter().filter(|o| o.appended).count(),
        report.outcomes.iter().filter(|o| !o.appended).count(),
        report.failures.len(),
        report.cancelled
    )?;
    for (label, err) in &report.failures {
        writeln!(out, "failed: {label}: {err}")?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Resolve Sponsor
// ============================================================================

/// Resolves one trial's sponsor text and persists the outcome.
fn command_resolve_sponsor(args: ResolveSponsorArgs, out: &mut dyn Write) -> CliResult<()> {
    let config = load_config(&args.config)?;
    let store = open_store(&config.store)?;
    let nct_id = NctId::new(args.nct_id);
    let trial = store.ensure_trial(&nct_id, &args.sponsor_text)?;
    let companies = store.list_companies()?;
    let run_id = RunId::new(args.run_id);
    let outcome = resolve_sponsor(&trial.sponsor_text, &companies, &config.resolver);
    match outcome {
        trial_engine::ResolverOutcome::Accept(acceptance) => {
            let record = ResolverDecisionRecord {
                run_id,
                nct_id: trial.nct_id,
                sponsor_text: trial.sponsor_text,
                mode: ResolverDecisionMode::Accept,
                company_id: Some(acceptance.company_id),
                probability: acceptance.probability,
                top2_margin: acceptance.top2_margin,
                features: acceptance.features,
                leader_meta: serde_json::Value::Null,
                decided_by: "auto".to_string(),
                notes: None,
                created_at: OffsetDateTime::now_utc(),
            };
            store.write_decision(&record)?;
            writeln!(
                out,
                "accepted company_id={} probability={:.4} method={:?}",
                record.company_id.map_or(0, CompanyId::get),
                record.probability,
                acceptance.method
            )?;
        }
        trial_engine::ResolverOutcome::Review(candidates) => {
            let item = ResolverReviewItem {
                id: ReviewItemId::new(PLACEHOLDER_REVIEW_ITEM_ID),
                run_id,
                nct_id: trial.nct_id,
                sponsor_text: trial.sponsor_text,
                candidates: candidates
                    .into_iter()
                    .map(|candidate| ReviewCandidate {
                        company_id: candidate.company_id,
                        probability: candidate.probability,
                        features: candidate.features,
                    })
                    .collect(),
                created_at: OffsetDateTime::now_utc(),
                resolved: false,
            };
            let candidate_count = item.candidates.len();
            let review_id = store.write_review_item(&item)?;
            writeln!(out, "queued for review: review_id={} candidates={}", review_id.get(), candidate_count)?;
        }
        trial_engine::ResolverOutcome::Reject => {
            writeln!(out, "rejected: no candidate cleared the review floor (not persisted)")?;
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Review Queue
// ============================================================================

/// Lists pending review items, oldest first.
fn command_review_list(args: ReviewListArgs, out: &mut dyn Write) -> CliResult<()> {
    let config = load_config(&args.config)?;
    let store = open_store(&config.store)?;
    let items = store.list_pending_reviews(args.limit)?;
    for item in items {
        writeln!(
            out,
            "review_id={} nct_id={} sponsor_text={:?} candidates={}",
            item.id.get(),
            item.nct_id.as_str(),
            item.sponsor_text,
            item.candidates.len()
        )?;
    }
    Ok(())
}

/// Accepts a queued review item as a human decision.
fn command_review_accept(args: ReviewAcceptArgs, out: &mut dyn Write) -> CliResult<()> {
    let config = load_config(&args.config)?;
    let store = open_store(&config.store)?;
    let review_id = parse_review_item_id(args.review_id)?;
    let company_id = parse_company_id(args.company_id)?;
    let items = store.list_pending_reviews(usize::MAX)?;
    let Some(item) = items.into_iter().find(|item| item.id == review_id) else {
        return Err(CliError::ResolverStore(trial_core::ResolverStoreError::UnknownReviewItem(review_id)));
    };
    let leader = item.candidates.iter().find(|candidate| candidate.company_id == company_id);
    let record = ResolverDecisionRecord {
        run_id: RunId::new(args.run_id),
        nct_id: item.nct_id,
        sponsor_text: item.sponsor_text,
        mode: ResolverDecisionMode::Accept,
        company_id: Some(company_id),
        probability: leader.map_or(1.0, |candidate| candidate.probability),
        top2_margin: 0.0,
        features: leader.map(|candidate| candidate.features.clone()).unwrap_or_default(),
        leader_meta: serde_json::Value::Null,
        decided_by: "human".to_string(),
        notes: args.notes,
        created_at: OffsetDateTime::now_utc(),
    };
    store.write_decision(&record)?;
    store.mark_review_resolved(review_id)?;
    writeln!(out, "accepted review_id={} company_id={}", review_id.get(), company_id.get())?;
    Ok(())
}

/// Rejects a queued review item without recording a decision.
fn command_review_reject(args: ReviewRejectArgs, out: &mut dyn Write) -> CliResult<()> {
    let config = load_config(&args.config)?;
    let store = open_store(&config.store)?;
    let review_id = parse_review_item_id(args.review_id)?;
    store.mark_review_resolved(review_id)?;
    writeln!(out, "rejected review_id={} (not persisted as a decision)", review_id.get())?;
    Ok(())
}

// ============================================================================
// SECTION: Score
// ============================================================================

/// Evaluates the gate/posterior engine over an asserted signal set and persists the score.
fn command_score(args: ScoreArgs, out: &mut dyn Write) -> CliResult<()> {
    let config = load_config(&args.config)?;
    let store = open_store(&config.store)?;
    let trial_id = parse_trial_id(args.trial_id)?;
    let signals = args.signals.iter().map(|raw| parse_signal_flag(raw)).collect::<CliResult<Vec<_>>>()?;
    let stop_rule_flags: BTreeSet<String> = args.stop_rules.into_iter().collect();
    let prior_context = PriorContext {
        pivotal: args.pivotal,
        oncology: args.oncology,
        rare_disease: args.rare_disease,
        phase3: args.phase3,
        phase1: args.phase1,
    };
    let gate_config = GateEngineConfig::from_config(&config.gates)?;
    let score =
        score_and_persist(&store, trial_id, RunId::new(args.run_id), &signals, &stop_rule_flags, prior_context, &gate_config)?;
    writeln!(
        out,
        "trial_id={} p_fail={:.4} gates_fired={} stop_rules_applied={}",
        score.trial_id.get(),
        score.p_fail,
        score.gate_evals.iter().filter(|gate| gate.fired).count(),
        score.stop_rules_applied.len()
    )?;
    Ok(())
}

// ============================================================================
// SECTION: Catalyst
// ============================================================================

/// Infers and persists a trial's catalyst window.
fn command_catalyst(args: CatalystArgs, out: &mut dyn Write) -> CliResult<()> {
    let config = load_config(&args.config)?;
    let store = open_store(&config.store)?;
    let trial_id = parse_trial_id(args.trial_id)?;
    let epcd = parse_date(&args.epcd, "epcd")?;
    let now = OffsetDateTime::now_utc();
    let hints = args
        .hints
        .iter()
        .filter_map(|text| parse_hint(text, trial_id, None, Some(now)))
        .collect::<Vec<_>>();
    let slip = trial_core::SlipStats {
        mean_slip_days: args.mean_slip_days,
        p10_days: args.slip_p10_days,
        p90_days: args.slip_p90_days,
        n_events: args.slip_n_events,
    };
    let terminal_event = args
        .terminal_event_date
        .as_deref()
        .map(|text| parse_date(text, "terminal_event_date"))
        .transpose()?
        .map(|event_date| TerminalEvent { event_date });
    let window = infer_catalyst_window(trial_id, epcd, args.epcd_age_days, &hints, slip, now, terminal_event);
    store.upsert_catalyst_window(&window)?;
    writeln!(
        out,
        "trial_id={} window_start={} window_end={} certainty={:.4} sources={}",
        window.trial_id.get(),
        window.window_start,
        window.window_end,
        window.certainty,
        window.sources.len()
    )?;
    Ok(())
}
