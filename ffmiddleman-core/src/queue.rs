use std::{fmt, path::PathBuf};

use thiserror::Error;

use crate::{config::JobRequest, naming::destination_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Skipped,
    Succeeded,
    Failed,
}

impl JobStatus {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Skipped | Self::Succeeded | Self::Failed)
    }

    fn can_become(self, next: Self) -> bool {
        use JobStatus::{Failed, Paused, Pending, Running, Skipped, Succeeded};

        matches!(
            (self, next),
            (Pending, Running | Skipped | Failed)
                | (Running, Paused | Succeeded | Failed)
                | (Paused, Running | Succeeded | Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Skipped => "skipped",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub source_path:      PathBuf,
    pub destination_path: PathBuf,
    status:               JobStatus,
}

impl Job {
    #[inline]
    pub fn status(&self) -> JobStatus {
        self.status
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Idle,
    Running,
    AllDone,
}

/// Outcome counters of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub succeeded: usize,
    pub failed:    usize,
    pub skipped:   usize,
    pub total:     usize,
}

/// The jobs of one batch, worked through strictly in order.
///
/// The cursor only moves forward and only past a job that has reached a
/// terminal status. A terminal status is final.
#[derive(Debug, Clone)]
pub struct Queue {
    jobs:   Vec<Job>,
    cursor: usize,
    status: QueueStatus,
}

impl Queue {
    #[inline]
    pub fn new(request: &JobRequest) -> Self {
        let jobs = request
            .files
            .iter()
            .map(|source| Job {
                destination_path: destination_path(source, &request.naming),
                source_path:      source.clone(),
                status:           JobStatus::Pending,
            })
            .collect();

        Self {
            jobs,
            cursor: 0,
            status: QueueStatus::Idle,
        }
    }

    #[inline]
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    #[inline]
    pub fn job(&self, index: usize) -> Option<&Job> {
        self.jobs.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    #[inline]
    pub fn status(&self) -> QueueStatus {
        self.status
    }

    /// Index of the job under the cursor, `None` once the batch is done.
    #[inline]
    pub fn cursor(&self) -> Option<usize> {
        (self.status != QueueStatus::AllDone && self.cursor < self.jobs.len())
            .then_some(self.cursor)
    }

    #[inline]
    pub fn begin(&mut self) -> Result<(), QueueError> {
        if self.status != QueueStatus::Idle {
            return Err(QueueError::AlreadyStarted);
        }
        self.status = if self.jobs.is_empty() {
            QueueStatus::AllDone
        } else {
            QueueStatus::Running
        };
        Ok(())
    }

    #[inline]
    pub fn set_status(&mut self, index: usize, next: JobStatus) -> Result<(), QueueError> {
        let job = self.jobs.get_mut(index).ok_or(QueueError::NoSuchJob(index))?;
        if job.status.is_terminal() {
            return Err(QueueError::AlreadyTerminal {
                index,
                status: job.status,
            });
        }
        if !job.status.can_become(next) {
            return Err(QueueError::InvalidTransition {
                index,
                from: job.status,
                to: next,
            });
        }

        job.status = next;
        Ok(())
    }

    /// Moves past the current job, which must be terminal. Returns the next
    /// index, or `None` when the batch is complete.
    #[inline]
    pub fn advance(&mut self) -> Result<Option<usize>, QueueError> {
        let Some(current) = self.cursor() else {
            return Ok(None);
        };
        let status = self.jobs[current].status;
        if !status.is_terminal() {
            return Err(QueueError::NotFinished {
                index: current,
                status,
            });
        }

        self.cursor += 1;
        if self.cursor == self.jobs.len() {
            self.status = QueueStatus::AllDone;
            return Ok(None);
        }
        Ok(Some(self.cursor))
    }

    #[inline]
    pub fn summary(&self) -> QueueSummary {
        self.jobs.iter().fold(
            QueueSummary {
                total: self.jobs.len(),
                ..Default::default()
            },
            |mut summary, job| {
                match job.status {
                    JobStatus::Succeeded => summary.succeeded += 1,
                    JobStatus::Failed => summary.failed += 1,
                    JobStatus::Skipped => summary.skipped += 1,
                    _ => (),
                }
                summary
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("The queue has already been started")]
    AlreadyStarted,
    #[error("No job at index {0}")]
    NoSuchJob(usize),
    #[error("Job {index} is already {status}")]
    AlreadyTerminal { index: usize, status: JobStatus },
    #[error("Job {index} cannot go from {from} to {to}")]
    InvalidTransition {
        index: usize,
        from:  JobStatus,
        to:    JobStatus,
    },
    #[error("Job {index} is still {status}")]
    NotFinished { index: usize, status: JobStatus },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActionConfig, NamingConfig};

    fn queue(files: &[&str]) -> Queue {
        let (request, _) = JobRequest::new(
            files.iter().map(PathBuf::from).collect(),
            ActionConfig::default(),
            NamingConfig {
                suffix: Some("_out".to_owned()),
                ..Default::default()
            },
            None,
        );
        Queue::new(&request)
    }

    #[test]
    fn jobs_mirror_the_files() {
        let queue = queue(&["/m/a.mkv", "/m/b.mp4"]);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.status(), QueueStatus::Idle);
        assert_eq!(queue.jobs()[1].destination_path, PathBuf::from("/m/b_out.mp4"));
        assert!(queue.jobs().iter().all(|job| job.status() == JobStatus::Pending));
    }

    #[test]
    fn terminal_status_is_set_once() {
        let mut queue = queue(&["/m/a.mkv"]);
        queue.begin().expect("fresh queue");
        queue.set_status(0, JobStatus::Running).expect("pending job can run");
        queue.set_status(0, JobStatus::Succeeded).expect("running job can succeed");

        assert_eq!(
            queue.set_status(0, JobStatus::Failed),
            Err(QueueError::AlreadyTerminal {
                index:  0,
                status: JobStatus::Succeeded,
            })
        );
    }

    #[test]
    fn pending_job_cannot_succeed() {
        let mut queue = queue(&["/m/a.mkv"]);
        assert!(matches!(
            queue.set_status(0, JobStatus::Succeeded),
            Err(QueueError::InvalidTransition { .. })
        ));
        assert!(matches!(
            queue.set_status(4, JobStatus::Running),
            Err(QueueError::NoSuchJob(4))
        ));
    }

    #[test]
    fn cursor_only_moves_past_finished_jobs() {
        let mut queue = queue(&["/m/a.mkv", "/m/b.mkv"]);
        queue.begin().expect("fresh queue");

        assert!(matches!(queue.advance(), Err(QueueError::NotFinished { index: 0, .. })));

        queue.set_status(0, JobStatus::Skipped).expect("pending job can be skipped");
        assert_eq!(queue.advance(), Ok(Some(1)));

        queue.set_status(1, JobStatus::Failed).expect("pending job can fail");
        assert_eq!(queue.advance(), Ok(None));
        assert_eq!(queue.status(), QueueStatus::AllDone);
        assert_eq!(queue.cursor(), None);
        assert_eq!(queue.summary(), QueueSummary {
            succeeded: 0,
            failed:    1,
            skipped:   1,
            total:     2,
        });
    }

    #[test]
    fn empty_batch_is_done_immediately() {
        let mut queue = queue(&[]);
        queue.begin().expect("fresh queue");

        assert_eq!(queue.status(), QueueStatus::AllDone);
        assert_eq!(queue.begin(), Err(QueueError::AlreadyStarted));
    }
}
