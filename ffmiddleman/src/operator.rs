use std::{
    io::{self, BufRead, Write},
    path::Path,
    sync::mpsc::{Receiver, Sender},
    thread,
};

use colored::Colorize;
use ffmiddleman_core::{CollisionDecision, Operator, QueueMessage};
use indicatif::MultiProgress;
use tracing::debug;

use crate::commands::CollisionPolicy;

/// Single-key commands typed while a batch runs.
fn control_message(line: &str) -> Option<QueueMessage> {
    match line.trim() {
        "p" => Some(QueueMessage::Pause),
        "r" => Some(QueueMessage::Resume),
        "q" => Some(QueueMessage::Teardown),
        _ => None,
    }
}

/// Reads stdin line by line. Control keys go to the orchestrator, anything
/// else answers the pending prompt.
pub fn spawn_input_router(messages: Sender<QueueMessage>, answers: Sender<String>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let delivered = match control_message(&line) {
                Some(message) => messages.send(message).is_ok(),
                None => answers.send(line).is_ok(),
            };
            if !delivered {
                break;
            }
        }
        debug!("Input closed");
    });
}

pub struct TerminalOperator {
    policy:   CollisionPolicy,
    answers:  Receiver<String>,
    progress: MultiProgress,
}

impl TerminalOperator {
    pub fn new(policy: CollisionPolicy, answers: Receiver<String>, progress: MultiProgress) -> Self {
        Self {
            policy,
            answers,
            progress,
        }
    }

    /// `None` once input is closed. Lines typed ahead of the question answer
    /// it.
    fn ask(&mut self, question: &str) -> Option<bool> {
        self.progress.suspend(|| {
            eprint!("{} ", question.bold());
            let _ = io::stderr().flush();
        });

        self.answers.recv().ok().map(|answer| is_yes(&answer))
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

impl Operator for TerminalOperator {
    fn resolve_collision(&mut self, destination: &Path) -> CollisionDecision {
        match self.policy {
            CollisionPolicy::Overwrite => CollisionDecision::Overwrite,
            CollisionPolicy::Skip => CollisionDecision::Skip,
            CollisionPolicy::Ask => {
                let question =
                    format!("{} already exists. Overwrite? [y/N]", destination.display());
                if self.ask(&question).unwrap_or(false) {
                    CollisionDecision::Overwrite
                } else {
                    CollisionDecision::Skip
                }
            },
        }
    }

    fn confirm_teardown(&mut self) -> bool {
        self.ask("A job is still running. Stop it and quit? [y/N]").unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use indicatif::ProgressDrawTarget;

    use super::*;

    fn operator(policy: CollisionPolicy) -> (TerminalOperator, Sender<String>) {
        let (answers_tx, answers_rx) = mpsc::channel();
        let progress = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        (TerminalOperator::new(policy, answers_rx, progress), answers_tx)
    }

    #[test]
    fn control_keys() {
        assert_eq!(control_message("p\n"), Some(QueueMessage::Pause));
        assert_eq!(control_message(" r "), Some(QueueMessage::Resume));
        assert_eq!(control_message("q"), Some(QueueMessage::Teardown));
        assert_eq!(control_message("y"), None);
    }

    #[test]
    fn fixed_policies_never_ask() {
        let (mut overwrite, _tx) = operator(CollisionPolicy::Overwrite);
        let (mut skip, _tx) = operator(CollisionPolicy::Skip);

        assert_eq!(
            overwrite.resolve_collision(Path::new("out.mkv")),
            CollisionDecision::Overwrite
        );
        assert_eq!(skip.resolve_collision(Path::new("out.mkv")), CollisionDecision::Skip);
    }

    #[test]
    fn ask_uses_the_answer() {
        let (mut operator, answers) = operator(CollisionPolicy::Ask);

        answers.send("Yes".to_owned()).expect("operator is listening");
        assert_eq!(
            operator.resolve_collision(Path::new("out.mkv")),
            CollisionDecision::Overwrite
        );

        answers.send("n".to_owned()).expect("operator is listening");
        assert!(!operator.confirm_teardown());
    }

    #[test]
    fn closed_input_skips_and_confirms() {
        let (mut operator, answers) = operator(CollisionPolicy::Ask);
        drop(answers);

        assert_eq!(operator.resolve_collision(Path::new("out.mkv")), CollisionDecision::Skip);
        assert!(operator.confirm_teardown());
    }
}
