//! Batch front-end for ffmpeg.
//!
//! A [`JobRequest`] names a list of source files and the actions to apply to
//! each of them. The [`Orchestrator`] turns it into a [`Queue`] and runs the
//! jobs one after another through a [`ProcessController`], reporting progress
//! as [`QueueEvent`]s.

pub mod cli_parameter;
pub mod config;
pub mod naming;
pub mod orchestrator;
pub mod parameters;
pub mod process;
pub mod progress;
pub mod queue;
pub mod settings;

pub use config::{ActionConfig, CutRange, Hardsub, JobRequest, NamingConfig, Transcode};
pub use orchestrator::{
    CollisionDecision,
    Operator,
    Orchestrator,
    QueueEvent,
    QueueMessage,
};
pub use process::{
    DurationProbe,
    ExitOutcome,
    FfprobeProbe,
    Invocation,
    ProcessController,
    ProcessError,
    SystemController,
};
pub use queue::{Job, JobStatus, Queue, QueueStatus, QueueSummary};
pub use settings::{FieldDefaults, ToolPaths};
