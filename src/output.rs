use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunReport};
use crate::batch::Strategy;
use crate::outcome::RunOutcome;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr and a plain summary on stdout.
pub struct TextOutput;

impl TextOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(Self::render_report(report).as_bytes())
    }

    pub fn render_report(report: &RunReport) -> String {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";

        let mut out = String::new();
        out.push_str(&format!("{cyan}kira-seqfetch summary{reset}\n"));
        out.push_str(&format!(
            "requested: {}, already present: {}, rounds: {}\n",
            report.requested,
            report.already_present,
            report.rounds.len()
        ));
        for (index, round) in report.rounds.iter().enumerate() {
            let color = if round.failed_batches > 0 { yellow } else { reset };
            out.push_str(&format!(
                "{color}  round {} ({}): {}/{} batches written, {} failed{reset}\n",
                index + 1,
                strategy_name(round.strategy),
                round.written_batches,
                round.batches,
                round.failed_batches
            ));
        }
        match &report.outcome {
            RunOutcome::Complete => {
                out.push_str(&format!(
                    "{green}All sequences were downloaded to {}{reset}\n",
                    report.output
                ));
            }
            RunOutcome::PartialFailure { unresolved, .. } => {
                if !unresolved.is_empty() {
                    out.push_str(&format!(
                        "{red}{} sequences could not be downloaded. Check whether these accessions still exist:{reset}\n",
                        unresolved.len()
                    ));
                    for id in unresolved {
                        out.push_str(&format!("{yellow}  {id}{reset}\n"));
                    }
                }
            }
            RunOutcome::Aborted => {
                out.push_str(&format!("{yellow}Aborted, nothing was downloaded{reset}\n"));
            }
        }
        if !report.invalid_input.is_empty() {
            out.push_str(&format!(
                "{red}{} input lines are not valid accessions and were not requested:{reset}\n",
                report.invalid_input.len()
            ));
            for line in &report.invalid_input {
                out.push_str(&format!("{yellow}  {line:?}{reset}\n"));
            }
        }
        out
    }
}

fn strategy_name(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Primary => "epost/efetch",
        Strategy::Fallback => "direct efetch",
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        let message = event
            .message
            .split_once("; ")
            .map(|(_, rest)| rest)
            .unwrap_or(&event.message);
        match event.elapsed {
            Some(elapsed) => eprintln!("{message} ({} ms)", elapsed.as_millis()),
            None => eprintln!("{message}"),
        }
    }
}
