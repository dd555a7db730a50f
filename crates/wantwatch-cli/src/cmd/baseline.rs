use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use serde::Serialize;
use tracing::info;
use wantwatch_core::baseline::{BaselineStore, FileBaselineStore};
use wantwatch_core::config::WatchConfig;
use wantwatch_core::lock::RunLock;

use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};

#[derive(Args, Debug)]
pub struct BaselineArgs {
    #[command(subcommand)]
    command: BaselineCommand,
}

#[derive(Subcommand, Debug)]
enum BaselineCommand {
    /// Print the stored listing counts
    Show,
    /// Delete the stored counts; the next run bootstraps silently
    Reset,
}

#[derive(Debug, Serialize)]
struct BaselineView {
    path: PathBuf,
    entries: usize,
    counts: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
struct ResetView {
    path: PathBuf,
    removed: bool,
}

pub fn run_baseline(args: &BaselineArgs, config: &WatchConfig, output: OutputMode) -> Result<()> {
    let state_dir = config.state_dir()?;
    let store = FileBaselineStore::new(&state_dir, &config.state.key);
    match args.command {
        BaselineCommand::Show => run_show(&store, output),
        BaselineCommand::Reset => {
            // Resetting under a live run would let it re-create the document.
            let lock = match RunLock::acquire(&state_dir, Duration::ZERO) {
                Ok(lock) => lock,
                Err(err) => {
                    let message = format!("{} ({})", err.code().message(), state_dir.display());
                    render_error(output, &CliError::from_code(message, err.code()))?;
                    bail!("baseline reset refused");
                }
            };
            let result = run_reset(&store, output);
            lock.release();
            result
        }
    }
}

fn run_show(store: &FileBaselineStore, output: OutputMode) -> Result<()> {
    let baseline = match store.load() {
        Ok(baseline) => baseline,
        Err(err) => {
            render_error(output, &CliError::from_code(err.to_string(), err.code()))?;
            bail!("baseline unreadable");
        }
    };

    let view = BaselineView {
        path: store.path().to_path_buf(),
        entries: baseline.len(),
        counts: baseline
            .iter()
            .map(|(id, count)| (id.to_string(), count))
            .collect(),
    };
    render_mode(output, &view, render_show_text, render_show_pretty)
}

fn render_show_text(view: &BaselineView, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "path={}", view.path.display())?;
    writeln!(w, "entries={}", view.entries)?;
    for (id, count) in &view.counts {
        writeln!(w, "{id}={count}")?;
    }
    Ok(())
}

fn render_show_pretty(view: &BaselineView, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Baseline")?;
    pretty_kv(w, "path", view.path.display().to_string())?;
    pretty_kv(w, "entries", view.entries.to_string())?;
    if view.counts.is_empty() {
        writeln!(w)?;
        writeln!(w, "No counts recorded yet; the next run bootstraps.")?;
        return Ok(());
    }
    writeln!(w)?;
    writeln!(w, "{:<14} {:>8}", "ITEM", "FOR SALE")?;
    for (id, count) in &view.counts {
        writeln!(w, "{id:<14} {count:>8}")?;
    }
    Ok(())
}

fn run_reset(store: &FileBaselineStore, output: OutputMode) -> Result<()> {
    let removed = match store.reset() {
        Ok(removed) => removed,
        Err(err) => {
            render_error(output, &CliError::from_code(err.to_string(), err.code()))?;
            bail!("baseline reset failed");
        }
    };
    info!(path = %store.path().display(), removed, "baseline reset");

    let view = ResetView {
        path: store.path().to_path_buf(),
        removed,
    };
    render_mode(
        output,
        &view,
        |view, w| writeln!(w, "removed={}", view.removed),
        |view, w| {
            if view.removed {
                writeln!(w, "Removed {}", view.path.display())
            } else {
                writeln!(w, "Nothing to remove at {}", view.path.display())
            }
        },
    )
}
