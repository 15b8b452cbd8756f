use std::{sync::mpsc::Receiver, time::Duration};

use colored::Colorize;
use ffmiddleman_core::{progress::is_progress_line, JobStatus, QueueEvent, QueueSummary};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::debug;

/// Last lines of a failed job's log shown on the terminal. The whole log
/// goes to the log file.
const FAILURE_TAIL_LINES: usize = 8;

/// Renders [`QueueEvent`]s: a header and a progress bar per job, a coloured
/// outcome line when it ends.
pub struct BatchDisplay {
    progress:  MultiProgress,
    job_count: usize,
    total:     u64,
    bar:       Option<ProgressBar>,
}

impl BatchDisplay {
    pub fn new(progress: MultiProgress, job_count: usize) -> Self {
        Self {
            progress,
            job_count,
            total: 0,
            bar: None,
        }
    }

    /// Runs until the orchestrator drops its end of the channel.
    pub fn run(mut self, events: Receiver<QueueEvent>) {
        for event in events {
            self.handle(event);
        }
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    fn println(&self, line: &str) {
        self.progress.suspend(|| println!("{}", line));
    }

    fn handle(&mut self, event: QueueEvent) {
        match event {
            QueueEvent::TotalDurationKnown {
                seconds, ..
            } => {
                self.total = seconds;
            },
            QueueEvent::JobStarted {
                job,
                source,
                command_line,
            } => {
                let header = format!("[{}/{}] {}", job + 1, self.job_count, source.display());
                self.println(&header.bold().to_string());
                self.println(&command_line.dimmed().to_string());
                self.bar = Some(self.progress.add(job_bar(self.total)));
            },
            QueueEvent::OutputChunk {
                text, ..
            } => {
                for line in text.split(['\r', '\n']) {
                    if !line.trim().is_empty() && !is_progress_line(line) {
                        debug!("ffmpeg: {}", line);
                    }
                }
            },
            QueueEvent::Progress {
                elapsed, ..
            } => {
                if let Some(bar) = &self.bar {
                    bar.set_position(elapsed);
                }
            },
            QueueEvent::Paused {
                ..
            } => {
                if let Some(bar) = &self.bar {
                    bar.set_message("paused, type r to resume");
                }
            },
            QueueEvent::Resumed {
                ..
            } => {
                if let Some(bar) = &self.bar {
                    bar.set_message("");
                }
            },
            QueueEvent::JobFinished {
                job,
                status,
                log,
            } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
                self.finish_job(job, status, &log);
            },
            QueueEvent::AllFinished(summary) => {
                self.println(&summary_line(&summary));
            },
        }
    }

    fn finish_job(&self, job: usize, status: JobStatus, log: &str) {
        let outcome = match status {
            JobStatus::Succeeded => status.to_string().green(),
            JobStatus::Skipped => status.to_string().yellow(),
            _ => status.to_string().red(),
        };
        self.println(&format!("[{}/{}] {}", job + 1, self.job_count, outcome.bold()));

        if status == JobStatus::Failed && !log.is_empty() {
            let lines: Vec<_> = log.lines().collect();
            let tail = lines.len().saturating_sub(FAILURE_TAIL_LINES);
            for line in lines.iter().skip(tail) {
                self.println(&format!("    {}", line.dimmed()));
            }
        }
    }
}

fn job_bar(total: u64) -> ProgressBar {
    if total == 0 {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {elapsed_precise} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        return bar;
    }

    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{elapsed_precise} {wide_bar} [{pos}/{len}s] ({percent}%) {eta} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

fn summary_line(summary: &QueueSummary) -> String {
    format!(
        "Done: {} succeeded, {} failed, {} skipped of {}",
        summary.succeeded.to_string().green(),
        summary.failed.to_string().red(),
        summary.skipped.to_string().yellow(),
        summary.total
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_mentions_every_counter() {
        colored::control::set_override(false);
        let line = summary_line(&QueueSummary {
            succeeded: 2,
            failed:    1,
            skipped:   0,
            total:     3,
        });

        assert_eq!(line, "Done: 2 succeeded, 1 failed, 0 skipped of 3");
    }

    #[test]
    fn unknown_total_gets_a_spinner() {
        assert_eq!(job_bar(0).length(), None);
        assert_eq!(job_bar(90).length(), Some(90));
    }
}
