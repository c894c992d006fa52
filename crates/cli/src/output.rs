//! Output formatting for probe outcomes

use anyhow::{Context, Result};
use colored::*;
use netkeeper_probes::{AggregatedResult, DownloadResult, PingResult, ProbeOutcome};
use std::fmt::Write;
use std::time::Duration;

/// Print `outcome` to stdout, as JSON or human-readable text
pub fn print_outcome(outcome: &ProbeOutcome, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(outcome).context("Failed to serialize result")?;
        println!("{}", text);
    } else {
        print!("{}", format_human(outcome));
    }
    Ok(())
}

/// Human-readable report
pub fn format_human(outcome: &ProbeOutcome) -> String {
    let mut out = String::new();
    let status = if outcome.is_success() {
        "ok".green().bold()
    } else {
        "failed".red().bold()
    };
    let _ = writeln!(out, "{} {}", outcome.kind().as_str().to_uppercase().cyan().bold(), status);

    match outcome {
        ProbeOutcome::Ping(result) => format_ping(&mut out, result),
        ProbeOutcome::Connect(result) => format_aggregate(&mut out, result),
        ProbeOutcome::Download(result) => format_download(&mut out, result),
    }

    if let Some(error) = outcome.error() {
        let _ = writeln!(out, "  {}: {}", "error".bold(), error.to_string().red());
    }
    out
}

fn format_aggregate(out: &mut String, result: &AggregatedResult) {
    let _ = writeln!(
        out,
        "  {}: {} ({} ok, {} timeouts, {} errors)",
        "attempts".bold(),
        result.attempts,
        result.successful_attempts.to_string().green(),
        result.timeouts.to_string().yellow(),
        result.errors.to_string().red(),
    );
    if result.successful_attempts > 0 {
        let _ = writeln!(out, "  {}: {}", "average".bold(), millis(result.average_duration));
    }
}

fn format_ping(out: &mut String, result: &PingResult) {
    let _ = writeln!(out, "  {}: {}", "command".bold(), result.command);
    format_aggregate(out, &result.aggregate);
    if let Some(code) = result.exit_code {
        let _ = writeln!(out, "  {}: {}", "exit code".bold(), code);
    }

    let stats = &result.statistics;
    if stats.valid {
        let _ = writeln!(
            out,
            "  {}: {} sent, {} received, {}% loss",
            "packets".bold(),
            stats.packets_transmitted,
            stats.packets_received,
            stats.packet_loss
        );
        let _ = writeln!(
            out,
            "  {}: {:.3} ms over {} replies of {} bytes",
            "rtt".bold(),
            stats.average_time,
            stats.valid_times,
            stats.bytes
        );
    } else if !result.output.is_empty() {
        let _ = writeln!(out, "  {}: {}", "output".bold(), result.output.dimmed());
    }
}

fn format_download(out: &mut String, result: &DownloadResult) {
    let _ = writeln!(out, "  {}: {}", "url".bold(), result.url);
    if !result.http_codes.is_empty() {
        let chain: Vec<String> = result
            .http_codes
            .iter()
            .zip(&result.http_messages)
            .map(|(code, message)| format!("{} {}", code, message))
            .collect();
        let _ = writeln!(out, "  {}: {}", "http".bold(), chain.join(" -> "));
    }
    for note in &result.diagnostics {
        let _ = writeln!(out, "  {}: {}", "note".bold(), note.yellow());
    }
    if let Some(name) = &result.file_name {
        let _ = writeln!(out, "  {}: {}", "file".bold(), name);
    }
    let _ = writeln!(
        out,
        "  {}: {} bytes in {}",
        "transfer".bold(),
        result.bytes_transferred,
        millis(result.duration)
    );
    if result.stopped {
        let _ = writeln!(out, "  {}", "task was stopped".yellow());
    } else if !result.valid {
        let _ = writeln!(out, "  {}", "task was deleted or rescheduled".yellow());
    }
    if result.file_exists {
        let state = if result.delete_success { "deleted" } else { "kept" };
        let _ = writeln!(out, "  {}: {}", "file state".bold(), state);
    }
}

fn millis(duration: Duration) -> String {
    format!("{:.1} ms", duration.as_secs_f64() * 1000.0)
}
