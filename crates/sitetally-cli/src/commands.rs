//! Subcommand implementations.

use crate::RunArgs;
use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use sitetally_catalog::{discover, discover_pending, merge_catalogs, parse_input, Catalog, MergePolicy};
use sitetally_enrich::{
    format_metric, EnrichConfig, LeafOutcome, LeafProgress, MetricSource, RawMetric, RunContext,
    RunError, Scheduler,
};
use sitetally_storage::{StateDir, StorageConfig};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// run
// ============================================================================

pub async fn cmd_run(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => EnrichConfig::load(path)?,
        None => EnrichConfig::default(),
    };
    config.apply_env();
    apply_flags(&mut config, &args);
    config.validate()?;

    let state = Arc::new(
        StateDir::open(config.storage.clone())
            .await
            .with_context(|| format!("opening state dir {}", config.storage.state_dir.display()))?,
    );
    let today = chrono::Local::now().date_naive();

    if let Some(path) = &args.default_catalog {
        let catalog = read_catalog(path)?;
        state.save_default(&catalog).await?;
        eprintln!(
            "{} saved default catalog from {}",
            "ok".green().bold(),
            path.display()
        );
    }
    let default_catalog = state.load_default().await?.unwrap_or_default();
    let ctx = RunContext::new(default_catalog, state.clone(), today);
    let scheduler = Scheduler::new(build_source(&config)?, config.clone()).with_observer(log_progress);

    let result = if args.resume {
        let checkpoint = state.load_checkpoint().await?.ok_or_else(|| {
            anyhow!("no checkpoint in {}; nothing to resume", state.path().display())
        })?;
        scheduler.resume(&ctx, &checkpoint).await
    } else {
        let raw_input = read_input(&args)?;
        let parsed = match raw_input.as_deref() {
            Some(raw) => parse_input(raw).context("parsing input")?,
            None => None,
        };

        let mut settings = state.load_settings().await?;
        let mode = args.mode.unwrap_or(settings.mode);
        let catalog = ctx.select(parsed.as_ref(), mode);

        settings.mode = mode;
        if parsed.is_some() {
            settings.custom_input = raw_input;
        }
        state.save_settings(&settings).await?;

        scheduler.run(&ctx, &catalog).await
    };

    let report = match result {
        Ok(report) => report,
        Err(RunError::EmptyCatalog) if args.resume => {
            eprintln!("{} every entry is already enriched today", "ok".green().bold());
            return Ok(());
        }
        Err(RunError::EmptyCatalog) => {
            bail!("no entries to enrich (pass --input or --default-catalog)")
        }
        Err(err) => return Err(err.into()),
    };

    write_catalog(args.out.as_deref(), &report.catalog)?;
    eprintln!(
        "{} {} succeeded, {} failed ({} fetches, {} chunks, window {})",
        "done".green().bold(),
        report.success.to_string().bold(),
        if report.failed > 0 {
            report.failed.to_string().red().bold()
        } else {
            report.failed.to_string().bold()
        },
        report.attempts,
        report.chunks,
        report.window
    );
    Ok(())
}

fn apply_flags(config: &mut EnrichConfig, args: &RunArgs) {
    if let Some(dir) = &args.state_dir {
        config.storage.state_dir = dir.clone();
    }
    let pacing = &mut config.pacing;
    if let Some(value) = args.chunk_min {
        pacing.chunk_min = value;
    }
    if let Some(value) = args.chunk_max {
        pacing.chunk_max = value;
    }
    if let Some(value) = args.pause_min {
        pacing.pause_min_secs = value;
    }
    if let Some(value) = args.pause_max {
        pacing.pause_max_secs = value;
    }
    if args.seed.is_some() {
        pacing.seed = args.seed;
    }
    if let Some(value) = args.max_attempts {
        config.max_attempts = value;
    }
}

#[cfg(feature = "http")]
fn build_source(config: &EnrichConfig) -> Result<Arc<dyn MetricSource>> {
    if !config.http.headers.contains_key("cookie") {
        tracing::warn!("no cookie configured (set SITETALLY_COOKIE); requests may be rejected");
    }
    let source = sitetally_enrich::HttpMetricSource::new(config.http.clone())?;
    Ok(Arc::new(source))
}

#[cfg(not(feature = "http"))]
fn build_source(_config: &EnrichConfig) -> Result<Arc<dyn MetricSource>> {
    bail!("built without the `http` feature; no metric source available")
}

fn log_progress(progress: &LeafProgress) {
    match &progress.outcome {
        LeafOutcome::Success { metric, .. } => tracing::info!(
            position = progress.position,
            total = progress.total,
            entity = %progress.entity_key,
            metric = %metric,
            "entry enriched"
        ),
        LeafOutcome::Failure { reason } => tracing::warn!(
            position = progress.position,
            total = progress.total,
            entity = %progress.entity_key,
            reason = %reason,
            "entry failed"
        ),
    }
}

fn read_input(args: &RunArgs) -> Result<Option<String>> {
    if let Some(text) = &args.input {
        return Ok(Some(text.clone()));
    }
    match &args.input_file {
        Some(path) if path.as_os_str() == "-" => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("reading input from stdin")?;
            Ok(Some(text))
        }
        Some(path) => fs::read_to_string(path)
            .map(Some)
            .with_context(|| format!("reading input {}", path.display())),
        None => Ok(None),
    }
}

// ============================================================================
// discover / merge / format / status
// ============================================================================

pub async fn cmd_discover(catalog: Option<&Path>, pending: bool, state_dir: &Path) -> Result<()> {
    let catalog = match catalog {
        Some(path) => read_catalog(path)?,
        None => latest_catalog(state_dir).await?,
    };
    let today = chrono::Local::now().date_naive();
    let leaves = if pending {
        discover_pending(&catalog, today)
    } else {
        discover(&catalog)
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for leaf in &leaves {
        writeln!(out, "{}\t{}", leaf.path, leaf.entity_key)?;
    }
    eprintln!("{} {} entries", "found".green().bold(), leaves.len());
    Ok(())
}

pub fn cmd_merge(base: &Path, custom: &Path, mode: MergePolicy) -> Result<()> {
    let merged = merge_catalogs(&read_catalog(base)?, &read_catalog(custom)?, mode);
    write_catalog(None, &merged)
}

pub fn cmd_format(value: &str) -> Result<()> {
    let raw = if value.trim().is_empty() {
        RawMetric::Unavailable
    } else {
        let number: f64 = value
            .trim()
            .parse()
            .with_context(|| format!("`{value}` is not a number"))?;
        if !number.is_finite() || number < 0.0 {
            bail!("`{value}` is not a non-negative number");
        }
        RawMetric::Value(number)
    };
    println!("{}", format_metric(raw));
    Ok(())
}

pub async fn cmd_status(state_dir: &Path) -> Result<()> {
    if !state_dir.is_dir() {
        bail!("state dir {} does not exist", state_dir.display());
    }
    let state = open_state(state_dir).await?;
    let settings = state.load_settings().await?;
    let Some(catalog) = state.load_checkpoint().await? else {
        eprintln!("{} no checkpoint in {}", "info:".yellow().bold(), state_dir.display());
        return Ok(());
    };

    let today = chrono::Local::now().date_naive();
    let leaves = discover(&catalog);
    let failed = leaves
        .iter()
        .filter(|leaf| leaf.original.failure_reason.is_some())
        .count();
    let enriched = leaves
        .iter()
        .filter(|leaf| leaf.original.failure_reason.is_none() && leaf.original.metric.is_some())
        .count();
    let fresh = leaves
        .iter()
        .filter(|leaf| leaf.original.is_fresh(today))
        .count();

    println!("entries:  {}", leaves.len());
    println!("enriched: {} ({} today)", enriched.to_string().green(), fresh);
    println!("failed:   {}", failed.to_string().red());
    println!("pending:  {}", leaves.len() - enriched - failed);
    println!("mode:     {}", settings.mode);
    if let Some(saved_at) = settings.saved_at {
        println!("last run: {}", saved_at.to_rfc3339());
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

async fn open_state(dir: &Path) -> Result<StateDir> {
    StateDir::open(StorageConfig {
        state_dir: PathBuf::from(dir),
        ..Default::default()
    })
    .await
    .with_context(|| format!("opening state dir {}", dir.display()))
}

/// Latest checkpoint, falling back to the saved default catalog.
async fn latest_catalog(state_dir: &Path) -> Result<Catalog> {
    if state_dir.is_dir() {
        let state = open_state(state_dir).await?;
        if let Some(catalog) = state.load_checkpoint().await? {
            return Ok(catalog);
        }
        if let Some(catalog) = state.load_default().await? {
            return Ok(catalog);
        }
    }
    bail!(
        "no catalog given and nothing saved in {} (pass --catalog)",
        state_dir.display()
    )
}

fn read_catalog(path: &Path) -> Result<Catalog> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading catalog {}", path.display()))?;
    Catalog::from_json_str(&text).with_context(|| format!("parsing catalog {}", path.display()))
}

fn write_catalog(out: Option<&Path>, catalog: &Catalog) -> Result<()> {
    let json = serde_json::to_string_pretty(catalog)?;
    match out {
        Some(path) => {
            fs::write(path, format!("{json}\n"))
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
        }
        None => println!("{json}"),
    }
    Ok(())
}
