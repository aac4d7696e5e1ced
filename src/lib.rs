//! Aggregation and selection-sync engine for linked time-series views.
//!
//! Flat dataset records are rolled up into per-period, per-category series
//! ([`analytics`]), a single shared selection ([`selection`]) is broadcast to
//! every mounted view over an origin-tagged bus ([`bus`]), and each view
//! re-derives only what a change invalidates ([`views`]). [`session`] ties the
//! pieces together; the `iop` binary drives a session from a JSON bundle.

pub mod analytics;
pub mod bus;
pub mod config;
pub mod model;
pub mod selection;
pub mod session;
pub mod store;
pub mod views;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::analytics::validate::{Severity, ValidationReport, validate_layers, validate_series};
use crate::analytics::{bucketing, stack};
use crate::bus::ViewId;
use crate::config::EngineConfig;
use crate::model::{CategoryKey, Timestamp};
use crate::selection::{ChartMode, SelectionIntent};
use crate::session::Session;
use crate::store::{RecordStore, load_bundle};
use crate::views::{FrameCollector, ViewPipeline};

/// Origin tag for selection changes made from the command line.
pub const CLI_ORIGIN: &str = "cli";

#[derive(Parser, Debug)]
#[command(name = "iop", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the engine config (default: $XDG_CONFIG_HOME/iop/engine.toml)
    #[arg(long, global = true, env = "IOP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Derive every configured view from a dataset bundle and print the
    /// render frames as JSON
    Summary {
        /// JSON bundle of ads/requests/removals/state_spend records
        #[arg(long)]
        data: PathBuf,

        /// Only mount these views (repeatable)
        #[arg(long = "view")]
        views: Vec<String>,

        /// Start of the selected range (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date_arg)]
        since: Option<Timestamp>,

        /// End of the selected range (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date_arg)]
        until: Option<Timestamp>,

        /// Hide a category (repeatable)
        #[arg(long = "hide")]
        hidden: Vec<String>,

        /// Chart mode for stackable views: stacked or line
        #[arg(long)]
        mode: Option<String>,
    },

    /// Check aggregation and stacking invariants for every configured view
    Validate {
        #[arg(long)]
        data: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Print the built-in defaults instead of the loaded file
        #[arg(long)]
        default: bool,
    },
}

fn parse_date_arg(s: &str) -> Result<Timestamp, String> {
    bucketing::parse_date(s).map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

/// Install the fmt subscriber on stderr.
///
/// Precedence: `RUST_LOG`, then `-v` (debug), then the configured filter.
pub fn init_tracing(config_filter: &str, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_new(config_filter).unwrap_or_else(|_| EnvFilter::new("info"))
        }
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(p) => EngineConfig::load_from(p)
            .with_context(|| format!("loading config from {}", p.display()))?,
        None => EngineConfig::load().context("loading config")?,
    };
    Ok(config)
}

/// Run a parsed command. Returns the process exit code.
pub fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config.logging.filter, cli.verbose);

    match cli.command {
        Commands::Summary {
            data,
            views,
            since,
            until,
            hidden,
            mode,
        } => {
            let request = SummaryRequest {
                views,
                since,
                until,
                hidden,
                mode,
            };
            let output = summary(&config, &data, &request)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(0)
        }
        Commands::Validate { data } => {
            let reports = validate(&config, &data)?;
            let failures: usize = reports
                .values()
                .map(|r| r.count_failures(Severity::Error))
                .sum();
            let output = json!({
                "ok": failures == 0,
                "views": reports.iter().map(|(k, r)| (k.clone(), r.to_json())).collect::<serde_json::Map<_, _>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(if failures == 0 { 0 } else { 1 })
        }
        Commands::Config { default } => {
            let shown = if default {
                EngineConfig::default()
            } else {
                config
            };
            print!("{}", shown.to_toml()?);
            Ok(0)
        }
    }
}

/// Selection changes requested on the command line.
#[derive(Debug, Clone, Default)]
pub struct SummaryRequest {
    pub views: Vec<String>,
    pub since: Option<Timestamp>,
    pub until: Option<Timestamp>,
    pub hidden: Vec<String>,
    pub mode: Option<String>,
}

/// Mount the requested views, apply the requested selection and return the
/// resulting frames.
pub fn summary(
    config: &EngineConfig,
    data: &std::path::Path,
    request: &SummaryRequest,
) -> anyhow::Result<serde_json::Value> {
    let bundle = load_bundle(data).with_context(|| format!("loading {}", data.display()))?;
    let mut session = futures::executor::block_on(Session::init(config, bundle.into_loads()))?;

    let specs: Vec<_> = if request.views.is_empty() {
        config.views.clone()
    } else {
        let mut picked = Vec::new();
        for id in &request.views {
            match config.find_view(id) {
                Some(spec) => picked.push(spec.clone()),
                None => bail!("unknown view '{id}'"),
            }
        }
        picked
    };

    let sink = FrameCollector::new();
    for spec in specs {
        session.mount_view(spec, sink.clone())?;
    }

    let origin = ViewId::from(CLI_ORIGIN);
    let mut intents = Vec::new();
    if request.since.is_some() || request.until.is_some() {
        let current = session.snapshot().time_range;
        let (Some(start), Some(end)) = (
            request.since.or(current.map(|r| r.start())),
            request.until.or(current.map(|r| r.end())),
        ) else {
            bail!("no temporal data loaded; pass both --since and --until");
        };
        intents.push(SelectionIntent::SetTimeRange { start, end });
    }
    for key in &request.hidden {
        let key = CategoryKey::from(key.as_str());
        if session.snapshot().is_visible(&key) {
            intents.push(SelectionIntent::ToggleCategory(key));
        } else {
            warn!(category = %key, "--hide names a category that is not visible");
        }
    }
    if let Some(mode) = &request.mode {
        intents.push(SelectionIntent::SetMode(mode.parse::<ChartMode>()?));
    }

    for intent in intents {
        let outcome = session.on_user_selection_change(&origin, intent)?;
        for failure in &outcome.report.failures {
            warn!(view = %failure.view, message = %failure.message, "view did not sync");
        }
    }

    info!(views = sink.frames().len(), "summary derived");
    Ok(json!({
        "selection": session.snapshot(),
        "views": sink.frames(),
    }))
}

/// Check series and stack invariants of every temporal view.
pub fn validate(
    config: &EngineConfig,
    data: &std::path::Path,
) -> anyhow::Result<BTreeMap<String, ValidationReport>> {
    let bundle = load_bundle(data).with_context(|| format!("loading {}", data.display()))?;
    let store = RecordStore::from_bundle(bundle)?;
    let selection = crate::selection::Selection::new(store.full_extent(), store.all_categories());

    let mut reports = BTreeMap::new();
    for spec in config.views.iter().filter(|v| v.kind.is_temporal()) {
        let pipeline = ViewPipeline::new(spec.clone(), &store, selection.snapshot(), &[])?;
        let Some(series) = pipeline.base_series() else {
            continue;
        };
        // Truncated series drop domain keys on purpose.
        let domain: Vec<CategoryKey> = if spec.top_n.is_some() {
            Vec::new()
        } else {
            store.domain(spec.dataset)?.keys().to_vec()
        };
        let mut report = validate_series(series, &domain);
        let layers = stack(series, &domain, spec.ordering);
        report.merge(validate_layers(series, &layers));
        debug!(view = %spec.id, checks = report.checks.len(), ok = report.all_ok(), "view validated");
        reports.insert(spec.id.to_string(), report);
    }
    Ok(reports)
}
