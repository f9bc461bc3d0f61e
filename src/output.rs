use std::io::{self, Write};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::app::{
    ConcatResult, MineResult, Phase, PlanResult, ProgressEvent, ProgressSink, StatusResult,
};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}, ETA: {eta}] [{bar:40.cyan/blue}] {pos:>5.green}/{len:5} {msg}";

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

/// Machine-readable results on stdout. As a sink it drops every event.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_plan(result: &PlanResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_mine(result: &MineResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_concat(result: &ConcatResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_status(result: &StatusResult) -> io::Result<()> {
        Self::print_json(result)
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

/// Progress bar on stderr, next to JSON on stdout.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.set_message("Processing...");
        Self { bar }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn event(&self, event: ProgressEvent) {
        if let Some((done, total)) = event.completed {
            self.bar.set_length(total as u64);
            self.bar.set_position(done as u64);
        }
        match event.phase {
            Phase::Done => self.bar.finish_with_message(event.message),
            phase => self
                .bar
                .set_message(format!("{} {}", phase.label(), event.message)),
        }
    }
}
