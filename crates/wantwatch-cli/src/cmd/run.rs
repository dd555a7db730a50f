use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, FixedOffset, Local, Utc};
use clap::Args;
use tracing::info;
use wantwatch_core::baseline::FileBaselineStore;
use wantwatch_core::config::WatchConfig;
use wantwatch_core::lock::RunLock;
use wantwatch_core::run::{RunCoordinator, RunReport};

use crate::channels;
use crate::discogs::DiscogsClient;
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};

/// Arguments for `wantwatch run`.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Fetch and compare, but neither save the baseline nor notify.
    #[arg(long)]
    pub dry_run: bool,

    /// Seconds to wait for another run holding the state lock.
    #[arg(long, default_value_t = 0)]
    pub lock_wait: u64,
}

/// Current wall-clock time in the configured notification offset.
pub fn notification_now(config: &WatchConfig) -> Result<DateTime<FixedOffset>> {
    Ok(match config.utc_offset()? {
        Some(offset) => Utc::now().with_timezone(&offset),
        None => {
            let local = Local::now();
            local.with_timezone(local.offset())
        }
    })
}

pub fn run_run(args: &RunArgs, config: &WatchConfig, output: OutputMode) -> Result<()> {
    config.validate()?;
    let state_dir = config.state_dir()?;

    let lock = match RunLock::acquire(&state_dir, Duration::from_secs(args.lock_wait)) {
        Ok(lock) => lock,
        Err(err) => {
            let message = format!("{} ({})", err.code().message(), state_dir.display());
            render_error(output, &CliError::from_code(message, err.code()))?;
            bail!("run lock unavailable");
        }
    };

    let store = FileBaselineStore::new(&state_dir, &config.state.key);
    let client = DiscogsClient::from_config(config)?;
    let configured = channels::from_config(config)?;
    let now = notification_now(config)?;

    info!(
        state = %store.path().display(),
        channels = configured.len(),
        dry_run = args.dry_run,
        "starting run"
    );

    let coordinator = configured.iter().fold(
        RunCoordinator::new(&store, &client, &client, config.run_settings(args.dry_run)),
        |coordinator, channel| coordinator.with_channel(channel.as_ref()),
    );

    let result = coordinator.run(now);
    lock.release();

    match result {
        Ok(report) => render_mode(output, &report, render_text, render_pretty),
        Err(err) => {
            render_error(output, &CliError::from_code(err.to_string(), err.code()))?;
            bail!("run failed");
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn render_text(report: &RunReport, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "started_at={}", report.started_at.to_rfc3339())?;
    writeln!(w, "dry_run={}", report.dry_run)?;
    writeln!(w, "bootstrap={}", report.bootstrap)?;
    writeln!(w, "persisted={}", report.persisted)?;
    writeln!(w, "items={}", report.outcomes.len())?;
    writeln!(w, "increased={}", report.increased.len())?;
    writeln!(w, "degraded={}", report.degraded.len())?;
    writeln!(w, "baseline_entries={}", report.baseline_entries)?;
    for item in &report.increased {
        writeln!(
            w,
            "increase id={} previous={} current={}",
            item.item.id, item.previous, item.current
        )?;
    }
    for item in &report.degraded {
        writeln!(w, "degraded id={} reason={}", item.id, item.reason)?;
    }
    if let Some(dispatch) = &report.dispatch {
        for delivery in &dispatch.deliveries {
            match &delivery.error {
                None => writeln!(w, "delivery channel={} ok", delivery.channel)?,
                Some(err) => writeln!(w, "delivery channel={} error={err}", delivery.channel)?,
            }
        }
    }
    Ok(())
}

fn render_pretty(report: &RunReport, w: &mut dyn Write) -> io::Result<()> {
    let heading = if report.dry_run {
        "wantwatch run (dry run)"
    } else {
        "wantwatch run"
    };
    pretty_section(w, heading)?;
    pretty_kv(w, "started", report.started_at.format("%Y-%m-%d %H:%M %:z").to_string())?;
    pretty_kv(w, "items", report.outcomes.len().to_string())?;
    pretty_kv(w, "bootstrap", yes_no(report.bootstrap))?;
    pretty_kv(w, "increased", report.increased.len().to_string())?;
    pretty_kv(w, "degraded", report.degraded.len().to_string())?;
    pretty_kv(w, "persisted", yes_no(report.persisted))?;

    if !report.degraded.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Degraded (counted as 0)")?;
        for item in &report.degraded {
            writeln!(w, "  {}  {}", item.id, item.reason)?;
        }
    }

    if let Some(message) = &report.message {
        writeln!(w)?;
        pretty_section(w, &message.subject)?;
        // The body repeats the subject on its first line.
        let blocks = message.body.split_once('\n').map_or("", |(_, rest)| rest);
        writeln!(w, "{blocks}")?;
    }

    if let Some(dispatch) = &report.dispatch {
        writeln!(w)?;
        pretty_section(w, "Deliveries")?;
        for delivery in &dispatch.deliveries {
            match &delivery.error {
                None => pretty_kv(w, &delivery.channel, "sent")?,
                Some(err) => pretty_kv(w, &delivery.channel, format!("FAILED: {err}"))?,
            }
        }
    }
    Ok(())
}
