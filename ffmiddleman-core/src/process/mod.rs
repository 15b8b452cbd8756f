use std::{
    collections::{HashSet, VecDeque},
    ffi::OsStr,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    sync::mpsc::Sender,
    thread,
};

use sysinfo::{Pid, ProcessesToUpdate, System};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use self::platform::{PlatformSuspender, Suspender};
use crate::orchestrator::QueueMessage;

mod platform;

/// A fully compiled command, ready to be spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program:     PathBuf,
    pub arguments:   Vec<String>,
    pub working_dir: PathBuf,
}

impl Invocation {
    /// Name the tool's processes show up under, e.g. `ffmpeg` for
    /// `/usr/bin/ffmpeg` or `ffmpeg.exe`.
    #[inline]
    pub fn tool_name(&self) -> &OsStr {
        self.program.file_stem().unwrap_or(self.program.as_os_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    #[inline]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitOutcome {
    #[inline]
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Runs one external process at a time on behalf of a job.
pub trait ProcessController {
    /// Spawns the process. Its error stream is forwarded to `messages` as
    /// [`QueueMessage::Output`], followed by exactly one
    /// [`QueueMessage::Exited`] once it has ended.
    fn start(
        &mut self,
        job: usize,
        invocation: &Invocation,
        messages: Sender<QueueMessage>,
    ) -> Result<(), ProcessError>;

    /// Returns `false` without doing anything when there is no process or it
    /// is already paused.
    fn pause(&mut self) -> bool;

    /// Returns `false` without doing anything when there is no process or it
    /// is not paused.
    fn resume(&mut self) -> bool;

    fn terminate(&mut self);

    /// Forgets the process of `job` after its exit has been observed.
    fn release(&mut self, job: usize);
}

/// Synchronous duration query used when a job has no cut range.
pub trait DurationProbe {
    /// Returns the probe's standard output.
    fn probe(&mut self, source: &Path) -> Result<String, ProcessError>;
}

#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: PathBuf,
}

impl FfprobeProbe {
    #[inline]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DurationProbe for FfprobeProbe {
    #[inline]
    fn probe(&mut self, source: &Path) -> Result<String, ProcessError> {
        let file_name = source.file_name().unwrap_or(source.as_os_str());
        let mut command = Command::new(&self.program);
        command
            .arg("-i")
            .arg(file_name)
            .arg("-show_format")
            .stdin(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = source.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|source| ProcessError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(ProcessError::ProbeFailed {
                source_path: source.to_path_buf(),
                code:        output.status.code(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[derive(Debug)]
struct RunningProcess {
    pid:       Pid,
    job:       usize,
    tool_name: String,
    paused:    bool,
}

/// [`ProcessController`] backed by real child processes.
///
/// Pausing and resuming act on the child and on every descendant running
/// the same tool, since wrappers may re-exec it.
#[derive(Debug)]
pub struct SystemController<S = PlatformSuspender> {
    suspender: S,
    system:    System,
    running:   Option<RunningProcess>,
}

impl SystemController {
    #[inline]
    pub fn new() -> Self {
        Self::with_suspender(PlatformSuspender::default())
    }
}

impl Default for SystemController {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Suspender> SystemController<S> {
    #[inline]
    pub fn with_suspender(suspender: S) -> Self {
        Self {
            suspender,
            system: System::new(),
            running: None,
        }
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.running.as_ref().is_some_and(|running| running.paused)
    }

    #[inline]
    pub fn suspender(&self) -> &S {
        &self.suspender
    }

    /// The root followed by all its live descendants, parents before
    /// children.
    fn process_tree(&mut self, root: Pid) -> Vec<Pid> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let mut tree = vec![root];
        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);
        while let Some(parent) = queue.pop_front() {
            for (pid, process) in self.system.processes() {
                if process.parent() == Some(parent) && seen.insert(*pid) {
                    tree.push(*pid);
                    queue.push_back(*pid);
                }
            }
        }

        tree
    }

    /// Processes of the tree that run the tool itself. The root always
    /// counts.
    fn tool_processes(&mut self, root: Pid, tool_name: &str) -> Vec<Pid> {
        let tree = self.process_tree(root);
        tree.into_iter()
            .filter(|pid| {
                *pid == root
                    || self.system.process(*pid).is_some_and(|process| {
                        Path::new(process.name()).file_stem() == Some(OsStr::new(tool_name))
                    })
            })
            .collect()
    }

    fn signal_tool(&mut self, suspend: bool) -> bool {
        let Some((pid, tool_name)) = self
            .running
            .as_ref()
            .filter(|running| running.paused != suspend)
            .map(|running| (running.pid, running.tool_name.clone()))
        else {
            return false;
        };

        for target in self.tool_processes(pid, &tool_name) {
            let result = if suspend {
                self.suspender.suspend(target.as_u32())
            } else {
                self.suspender.resume(target.as_u32())
            };
            if let Err(e) = result {
                warn!("{}", e);
            }
        }

        if let Some(running) = &mut self.running {
            running.paused = suspend;
        }
        true
    }
}

/// Like `read_until`, but a chunk ends at either `\r` or `\n`, so status
/// rewrites and whole lines are both forwarded as soon as they are complete.
fn read_chunk<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<usize> {
    let mut read = 0;
    loop {
        let (done, used) = {
            let available = match reader.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            match available.iter().position(|&b| b == b'\r' || b == b'\n') {
                Some(i) => {
                    buf.extend_from_slice(&available[..=i]);
                    (true, i + 1)
                },
                None => {
                    buf.extend_from_slice(available);
                    (available.is_empty(), available.len())
                },
            }
        };
        reader.consume(used);
        read += used;
        if done {
            return Ok(read);
        }
    }
}

impl<S: Suspender> ProcessController for SystemController<S> {
    #[inline]
    fn start(
        &mut self,
        job: usize,
        invocation: &Invocation,
        messages: Sender<QueueMessage>,
    ) -> Result<(), ProcessError> {
        const BUFFER_CAPACITY: usize = 256;

        if let Some(running) = &self.running {
            return Err(ProcessError::AlreadyRunning {
                job: running.job,
            });
        }

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.arguments)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        // A terminal Ctrl-C reaches only us; stopping the job goes through
        // teardown.
        platform::own_process_group(&mut command);
        let mut child = command
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;
        let pid = child.id();
        debug!("Spawned {} as pid {}", invocation.program.display(), pid);

        let Some(stderr) = child.stderr.take() else {
            // Unreachable with a piped stderr, but never leave an orphan.
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProcessError::NoStderr);
        };

        thread::spawn(move || {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::with_capacity(BUFFER_CAPACITY);

            loop {
                match read_chunk(&mut reader, &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = simdutf8::basic::from_utf8(&buf).map_or_else(
                            |_| String::from_utf8_lossy(&buf).into_owned(),
                            str::to_owned,
                        );
                        buf.clear();
                        if messages
                            .send(QueueMessage::Output {
                                job,
                                text,
                            })
                            .is_err()
                        {
                            break;
                        }
                    },
                    Err(e) => {
                        warn!("Failed to read output of pid {}: {}", pid, e);
                        break;
                    },
                }
            }

            let outcome = child.wait().map_or_else(
                |e| {
                    warn!("Failed to wait for pid {}: {}", pid, e);
                    ExitOutcome {
                        code: None,
                    }
                },
                ExitOutcome::from,
            );
            let _ = messages.send(QueueMessage::Exited {
                job,
                outcome,
            });
        });

        self.running = Some(RunningProcess {
            pid: Pid::from_u32(pid),
            job,
            tool_name: invocation.tool_name().to_string_lossy().into_owned(),
            paused: false,
        });
        Ok(())
    }

    #[inline]
    fn pause(&mut self) -> bool {
        self.signal_tool(true)
    }

    #[inline]
    fn resume(&mut self) -> bool {
        self.signal_tool(false)
    }

    #[inline]
    fn terminate(&mut self) {
        let Some(pid) = self.running.as_ref().map(|running| running.pid) else {
            return;
        };

        for target in self.process_tree(pid).into_iter().rev() {
            if let Some(process) = self.system.process(target) {
                if !process.kill() {
                    warn!("Failed to kill pid {}", target);
                }
            }
        }
        info!("Terminated pid {} and its children", pid);
    }

    #[inline]
    fn release(&mut self, job: usize) {
        if self.running.as_ref().is_some_and(|running| running.job == job) {
            self.running = None;
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to start {program:?}")]
    Spawn {
        program: PathBuf,
        #[source]
        source:  io::Error,
    },
    #[error("Spawned process has no error stream")]
    NoStderr,
    #[error("A process for job {job} is still registered")]
    AlreadyRunning { job: usize },
    #[error("Probing {source_path:?} failed with exit code {code:?}")]
    ProbeFailed {
        source_path: PathBuf,
        code:        Option<i32>,
    },
    #[error("Failed to {action} pid {pid}")]
    Signal { pid: u32, action: &'static str },
    #[error("Failed to {action} pid {pid}")]
    Os {
        pid:    u32,
        action: &'static str,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, time::Duration};

    use super::*;

    #[derive(Debug, Default)]
    struct CountingSuspender {
        suspended: Vec<u32>,
        resumed:   Vec<u32>,
    }

    impl Suspender for CountingSuspender {
        fn suspend(&mut self, pid: u32) -> Result<(), ProcessError> {
            self.suspended.push(pid);
            Ok(())
        }

        fn resume(&mut self, pid: u32) -> Result<(), ProcessError> {
            self.resumed.push(pid);
            Ok(())
        }
    }

    #[test]
    fn no_process_means_no_op() {
        let mut controller = SystemController::with_suspender(CountingSuspender::default());

        assert!(!controller.pause());
        assert!(!controller.resume());
        controller.terminate();
        assert!(controller.suspender().suspended.is_empty());
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let mut controller = SystemController::with_suspender(CountingSuspender::default());
        let (tx, _rx) = mpsc::channel();
        let invocation = Invocation {
            program:     PathBuf::from("ffmiddleman-surely-missing-tool"),
            arguments:   Vec::new(),
            working_dir: std::env::temp_dir(),
        };

        let result = controller.start(0, &invocation, tx);
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
        assert!(!controller.pause());
    }

    #[test]
    fn chunks_end_at_either_line_break() {
        let mut reader = io::Cursor::new(b"Input #0, matroska\nframe=1\rframe=2\rError".to_vec());
        let mut buf = Vec::new();
        let mut chunks = Vec::new();
        while read_chunk(&mut reader, &mut buf).expect("cursor reads") > 0 {
            chunks.push(String::from_utf8(std::mem::take(&mut buf)).expect("utf-8"));
        }

        assert_eq!(chunks, ["Input #0, matroska\n", "frame=1\r", "frame=2\r", "Error"]);
    }

    #[test]
    fn tool_name_drops_directory_and_extension() {
        let invocation = Invocation {
            program:     PathBuf::from("/opt/bin/ffmpeg.exe"),
            arguments:   Vec::new(),
            working_dir: PathBuf::new(),
        };
        assert_eq!(invocation.tool_name(), "ffmpeg");
    }

    #[cfg(unix)]
    #[test]
    fn pause_and_resume_strictly_alternate() {
        let mut controller = SystemController::with_suspender(CountingSuspender::default());
        let (tx, rx) = mpsc::channel();
        let invocation = Invocation {
            program:     PathBuf::from("sleep"),
            arguments:   vec!["30".to_owned()],
            working_dir: std::env::temp_dir(),
        };
        controller.start(3, &invocation, tx).expect("sleep should spawn");

        assert!(!controller.resume());
        assert!(controller.pause());
        assert!(!controller.pause());
        assert!(controller.is_paused());
        assert_eq!(controller.suspender().suspended.len(), 1);
        assert!(controller.resume());
        assert_eq!(controller.suspender().resumed.len(), 1);

        controller.terminate();
        let exited = rx
            .iter()
            .find_map(|message| match message {
                QueueMessage::Exited {
                    job,
                    outcome,
                } => Some((job, outcome)),
                _ => None,
            })
            .expect("process should report its exit");
        assert_eq!(exited.0, 3);
        assert!(!exited.1.success());

        controller.release(3);
        assert!(!controller.pause());
    }

    /// Process group id from `/proc/<pid>/stat`.
    #[cfg(target_os = "linux")]
    fn process_group_of(pid: &str) -> u32 {
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).expect("proc stat");
        let (_, after_name) = stat.rsplit_once(')').expect("stat has a command name");
        after_name.split_whitespace().nth(2).and_then(|pgrp| pgrp.parse().ok()).expect("pgrp")
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn tool_runs_in_its_own_process_group() {
        let mut controller = SystemController::with_suspender(CountingSuspender::default());
        let (tx, rx) = mpsc::channel();
        let invocation = Invocation {
            program:     PathBuf::from("sleep"),
            arguments:   vec!["30".to_owned()],
            working_dir: std::env::temp_dir(),
        };
        controller.start(0, &invocation, tx).expect("sleep should spawn");
        let pid = controller.running.as_ref().expect("sleep is running").pid.as_u32();

        let child_group = process_group_of(&pid.to_string());
        controller.terminate();
        let _ = rx.recv_timeout(Duration::from_secs(10));

        assert_eq!(child_group, pid);
        assert_ne!(child_group, process_group_of("self"));
    }

    #[cfg(unix)]
    #[test]
    fn stderr_is_forwarded_before_exit() {
        let mut controller = SystemController::with_suspender(CountingSuspender::default());
        let (tx, rx) = mpsc::channel();
        let invocation = Invocation {
            program:     PathBuf::from("sh"),
            arguments:   vec![
                "-c".to_owned(),
                r"printf 'frame=1 time=00:00:01\rframe=2 time=00:00:02\r' >&2; exit 3".to_owned(),
            ],
            working_dir: std::env::temp_dir(),
        };
        controller.start(0, &invocation, tx).expect("sh should spawn");

        let mut text = String::new();
        let mut outcome = None;
        while let Ok(message) = rx.recv_timeout(Duration::from_secs(10)) {
            match message {
                QueueMessage::Output {
                    text: chunk, ..
                } => text.push_str(&chunk),
                QueueMessage::Exited {
                    outcome: exit, ..
                } => {
                    outcome = Some(exit);
                    break;
                },
                _ => (),
            }
        }

        assert_eq!(text, "frame=1 time=00:00:01\rframe=2 time=00:00:02\r");
        assert_eq!(outcome, Some(ExitOutcome {
            code: Some(3)
        }));
    }
}
