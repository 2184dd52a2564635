//! Progress bar rendering for transfer events

use crate::output::ellipsize_start;
use console::style;
use hfmd_types::{TaskId, TransferEvent, TransferOutcome};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;

const NAME_WIDTH: usize = 32;

/// Manages one progress bar per file plus an overall file counter
pub struct TransferProgress {
    multi: MultiProgress,
    overall: Option<ProgressBar>,
    bars: HashMap<TaskId, (ProgressBar, String)>,
}

impl TransferProgress {
    /// `visible = false` swallows all drawing, e.g. for JSON output
    pub fn new(visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        Self {
            multi: MultiProgress::with_draw_target(target),
            overall: None,
            bars: HashMap::new(),
        }
    }

    /// Update bars from an event
    pub fn handle_event(&mut self, event: &TransferEvent) {
        match event {
            TransferEvent::JobStarted { files, .. } => {
                let pb = self.multi.add(ProgressBar::new(*files as u64));
                pb.set_style(overall_style());
                pb.set_prefix("Files");
                self.overall = Some(pb);
            }

            TransferEvent::TaskStarted { task, path } => {
                let name = ellipsize_start(path, NAME_WIDTH);
                let pb = match &self.overall {
                    Some(overall) => self.multi.insert_before(overall, ProgressBar::new(0)),
                    None => self.multi.add(ProgressBar::new(0)),
                };
                pb.set_style(file_style());
                pb.set_message(name.clone());
                self.bars.insert(*task, (pb, name));
            }

            TransferEvent::TaskTotal { task, total } => {
                if let Some((pb, _)) = self.bars.get(task) {
                    pb.set_length(*total);
                }
            }

            TransferEvent::TaskProgress { task, transferred } => {
                if let Some((pb, _)) = self.bars.get(task) {
                    pb.set_position(*transferred);
                }
            }

            TransferEvent::TaskFinished { task, outcome } => {
                if let Some((pb, name)) = self.bars.remove(task) {
                    finish_bar(&pb, &name, outcome);
                }
                if let Some(overall) = &self.overall {
                    overall.inc(1);
                }
            }

            TransferEvent::JobFinished { .. } => {
                if let Some(overall) = self.overall.take() {
                    overall.finish_and_clear();
                }
            }
        }
    }

    /// Clear all progress bars
    pub fn clear(&mut self) {
        for (_, (pb, _)) in self.bars.drain() {
            pb.finish_and_clear();
        }
        if let Some(overall) = self.overall.take() {
            overall.finish_and_clear();
        }
    }
}

fn finish_bar(pb: &ProgressBar, name: &str, outcome: &TransferOutcome) {
    match outcome {
        TransferOutcome::Completed { resumed_from, .. } => {
            let note = if *resumed_from > 0 {
                format!(" (resumed at {})", crate::output::format_bytes(*resumed_from))
            } else {
                String::new()
            };
            pb.finish_with_message(format!("{} {}{}", style("✓").green().bold(), name, note));
        }
        TransferOutcome::Skipped { .. } => {
            pb.finish_with_message(format!(
                "{} {} {}",
                style("✓").green(),
                name,
                style("already present").dim()
            ));
        }
        TransferOutcome::Failed { error } => {
            pb.abandon_with_message(format!(
                "{} {}: {}",
                style("✗").red().bold(),
                name,
                style(error).red()
            ));
        }
        TransferOutcome::Cancelled { .. } => {
            pb.abandon_with_message(format!("{} {} cancelled", style("○").dim(), name));
        }
    }
}

fn file_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(
            "{spinner:.green} {msg:32} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░  ")
}

fn overall_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold} [{elapsed_precise}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}
