use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, Sender, TryRecvError},
};

use anyhow::{anyhow, Context};
use tracing::{debug, error, info, warn};

use crate::{
    config::JobRequest,
    parameters::{command_line, compile_arguments},
    process::{DurationProbe, ExitOutcome, Invocation, ProcessController},
    progress::{total_duration, ProgressTracker},
    queue::{JobStatus, Queue, QueueSummary},
};

/// Input of the orchestrator loop. Process reader threads and the host send
/// these; only the loop receives them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueMessage {
    Output { job: usize, text: String },
    Exited { job: usize, outcome: ExitOutcome },
    Pause,
    Resume,
    Teardown,
}

/// What the orchestrator reports back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    JobStarted {
        job:          usize,
        source:       PathBuf,
        command_line: String,
    },
    TotalDurationKnown { job: usize, seconds: u64 },
    OutputChunk { job: usize, text: String },
    Progress { job: usize, elapsed: u64, total: u64 },
    Paused { job: usize },
    Resumed { job: usize },
    /// Also sent for skipped jobs and jobs that failed to start, with an
    /// empty or explanatory log respectively.
    JobFinished {
        job:    usize,
        status: JobStatus,
        log:    String,
    },
    AllFinished(QueueSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionDecision {
    Overwrite,
    Skip,
}

/// Decisions the orchestrator cannot take on its own. Both calls block the
/// loop until answered.
pub trait Operator {
    fn resolve_collision(&mut self, destination: &Path) -> CollisionDecision;

    /// Asked when a teardown is requested while a job is running.
    fn confirm_teardown(&mut self) -> bool;
}

enum JobEnd {
    Exited,
    TornDown,
}

/// Runs the jobs of one [`JobRequest`] strictly one after another.
pub struct Orchestrator<C, P, O> {
    request:    JobRequest,
    encoder:    PathBuf,
    queue:      Queue,
    controller: C,
    probe:      P,
    operator:   O,
    events:     Sender<QueueEvent>,
    sender:     Sender<QueueMessage>,
    receiver:   Receiver<QueueMessage>,
    tracker:    ProgressTracker,
}

impl<C, P, O> Orchestrator<C, P, O>
where
    C: ProcessController,
    P: DurationProbe,
    O: Operator,
{
    #[inline]
    pub fn new(
        request: JobRequest,
        encoder: impl Into<PathBuf>,
        controller: C,
        probe: P,
        operator: O,
        events: Sender<QueueEvent>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            queue: Queue::new(&request),
            request,
            encoder: encoder.into(),
            controller,
            probe,
            operator,
            events,
            sender,
            receiver,
            tracker: ProgressTracker::default(),
        }
    }

    /// Handle for the host to send [`QueueMessage::Pause`],
    /// [`QueueMessage::Resume`] and [`QueueMessage::Teardown`].
    #[inline]
    pub fn sender(&self) -> Sender<QueueMessage> {
        self.sender.clone()
    }

    #[inline]
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    #[inline]
    pub fn controller(&self) -> &C {
        &self.controller
    }

    #[inline]
    pub fn operator(&self) -> &O {
        &self.operator
    }

    /// Works through the whole batch. Returns early, without
    /// [`QueueEvent::AllFinished`], when the host tears the run down.
    #[inline]
    pub fn run(&mut self) -> anyhow::Result<QueueSummary> {
        self.queue.begin()?;
        info!("Starting batch of {} file(s)", self.queue.len());

        let mut next = self.queue.cursor();
        while let Some(index) = next {
            if self.drain_idle_messages() {
                info!("Batch torn down before job {}", index);
                return Ok(self.queue.summary());
            }

            if self.launch(index)? {
                if let JobEnd::TornDown = self.supervise(index)? {
                    return Ok(self.queue.summary());
                }
            }

            next = self.queue.advance()?;
        }

        let summary = self.queue.summary();
        info!(
            "Batch finished: {} succeeded, {} failed, {} skipped",
            summary.succeeded, summary.failed, summary.skipped
        );
        self.emit(QueueEvent::AllFinished(summary));
        Ok(summary)
    }

    /// Handles whatever arrived while no job was running. Returns whether a
    /// teardown was requested.
    fn drain_idle_messages(&mut self) -> bool {
        loop {
            match self.receiver.try_recv() {
                Ok(QueueMessage::Teardown) => return true,
                Ok(message) => debug!("Ignoring {:?} with no job running", message),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// Prepares and starts job `index`. Returns whether a process is now
    /// running for it.
    fn launch(&mut self, index: usize) -> anyhow::Result<bool> {
        let job = self.queue.job(index).cloned().context("cursor points past the queue")?;

        if job.destination_path == job.source_path {
            warn!(
                "Destination of {} is the source itself, set a prefix, suffix, format or \
                 destination directory",
                job.source_path.display()
            );
            self.finish(index, JobStatus::Failed, "destination is the source file".to_owned())?;
            return Ok(false);
        }

        if job.destination_path.exists() {
            match self.operator.resolve_collision(&job.destination_path) {
                CollisionDecision::Skip => {
                    info!("Skipping {}", job.source_path.display());
                    self.finish(index, JobStatus::Skipped, String::new())?;
                    return Ok(false);
                },
                CollisionDecision::Overwrite => {
                    debug!("Overwriting {}", job.destination_path.display());
                },
            }
        }

        let total = total_duration(&self.request.action, &job.source_path, &mut self.probe);
        self.emit(QueueEvent::TotalDurationKnown {
            job:     index,
            seconds: total,
        });

        let invocation = Invocation {
            program:     self.encoder.clone(),
            arguments:   compile_arguments(
                &job.source_path,
                &self.request.action,
                &self.request.naming,
                self.request.extra_args.as_deref(),
            ),
            working_dir: job.source_path.parent().unwrap_or(Path::new(".")).to_path_buf(),
        };
        let command_line =
            command_line(&invocation.program.to_string_lossy(), &invocation.arguments);
        info!("Job {}: {}", index, command_line);
        self.emit(QueueEvent::JobStarted {
            job: index,
            source: job.source_path.clone(),
            command_line,
        });

        match self.controller.start(index, &invocation, self.sender.clone()) {
            Ok(()) => {
                self.queue.set_status(index, JobStatus::Running)?;
                self.tracker = ProgressTracker::new(total);
                Ok(true)
            },
            Err(e) => {
                error!("{}: {:#}", job.source_path.display(), anyhow::Error::from(e));
                self.finish(index, JobStatus::Failed, "failed to start".to_owned())?;
                Ok(false)
            },
        }
    }

    /// Routes messages for the running job `index` until it exits or the run
    /// is torn down.
    fn supervise(&mut self, index: usize) -> anyhow::Result<JobEnd> {
        loop {
            let message = self
                .receiver
                .recv()
                .map_err(|_| anyhow!("message channel closed while job {} was running", index))?;

            match message {
                QueueMessage::Output {
                    job,
                    text,
                } if job == index => {
                    let moved = self.tracker.push_chunk(&text);
                    self.emit(QueueEvent::OutputChunk {
                        job,
                        text,
                    });
                    if let Some(elapsed) = moved {
                        self.emit(QueueEvent::Progress {
                            job,
                            elapsed,
                            total: self.tracker.total(),
                        });
                    }
                },
                QueueMessage::Exited {
                    job,
                    outcome,
                } if job == index => {
                    self.controller.release(index);
                    let status = if outcome.success() {
                        JobStatus::Succeeded
                    } else {
                        warn!("Job {} exited with code {:?}", index, outcome.code);
                        JobStatus::Failed
                    };
                    let log = std::mem::take(&mut self.tracker).into_log().text();
                    self.finish(index, status, log)?;
                    return Ok(JobEnd::Exited);
                },
                QueueMessage::Output {
                    job, ..
                }
                | QueueMessage::Exited {
                    job, ..
                } => {
                    debug!("Ignoring message for stale job {}", job);
                },
                QueueMessage::Pause => {
                    if self.controller.pause() {
                        self.queue.set_status(index, JobStatus::Paused)?;
                        info!("Paused job {}", index);
                        self.emit(QueueEvent::Paused {
                            job: index,
                        });
                    }
                },
                QueueMessage::Resume => {
                    if self.controller.resume() {
                        self.queue.set_status(index, JobStatus::Running)?;
                        info!("Resumed job {}", index);
                        self.emit(QueueEvent::Resumed {
                            job: index,
                        });
                    }
                },
                QueueMessage::Teardown => {
                    if self.operator.confirm_teardown() {
                        self.controller.terminate();
                        self.controller.release(index);
                        let log = std::mem::take(&mut self.tracker).into_log().text();
                        self.finish(index, JobStatus::Failed, log)?;
                        info!("Batch torn down during job {}", index);
                        return Ok(JobEnd::TornDown);
                    }
                    debug!("Teardown declined");
                },
            }
        }
    }

    fn finish(&mut self, index: usize, status: JobStatus, log: String) -> anyhow::Result<()> {
        self.queue.set_status(index, status)?;
        self.emit(QueueEvent::JobFinished {
            job: index,
            status,
            log,
        });
        Ok(())
    }

    fn emit(&self, event: QueueEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver is gone");
        }
    }
}
