use super::ProcessError;

/// Freezes and thaws a single process.
pub trait Suspender {
    fn suspend(&mut self, pid: u32) -> Result<(), ProcessError>;
    fn resume(&mut self, pid: u32) -> Result<(), ProcessError>;
}

#[cfg(unix)]
pub use self::unix_impl::{own_process_group, UnixSuspender as PlatformSuspender};
#[cfg(windows)]
pub use self::windows_impl::{own_process_group, WindowsSuspender as PlatformSuspender};

// ------------------------------ Unix (signals) ------------------------------

#[cfg(unix)]
mod unix_impl {
    use std::{os::unix::process::CommandExt, process::Command};

    use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System};

    use super::*;

    /// Puts the child in a new process group led by itself, out of reach of
    /// the terminal's `SIGINT`.
    #[inline]
    pub fn own_process_group(command: &mut Command) {
        command.process_group(0);
    }

    /// `SIGSTOP` / `SIGCONT`.
    #[derive(Debug, Default)]
    pub struct UnixSuspender {
        system: System,
    }

    impl UnixSuspender {
        fn send(
            &mut self,
            pid: u32,
            signal: Signal,
            action: &'static str,
        ) -> Result<(), ProcessError> {
            let target = Pid::from_u32(pid);
            self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[target]),
                true,
                ProcessRefreshKind::nothing(),
            );

            match self.system.process(target).and_then(|process| process.kill_with(signal)) {
                Some(true) => Ok(()),
                _ => Err(ProcessError::Signal {
                    pid,
                    action,
                }),
            }
        }
    }

    impl Suspender for UnixSuspender {
        #[inline]
        fn suspend(&mut self, pid: u32) -> Result<(), ProcessError> {
            self.send(pid, Signal::Stop, "suspend")
        }

        #[inline]
        fn resume(&mut self, pid: u32) -> Result<(), ProcessError> {
            self.send(pid, Signal::Continue, "resume")
        }
    }
}

// ------------------------- Windows (thread suspend) -------------------------

#[cfg(windows)]
mod windows_impl {
    use std::{io, mem, os::windows::process::CommandExt, process::Command};

    use windows_sys::Win32::{
        Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE},
        System::{
            Diagnostics::ToolHelp::{
                CreateToolhelp32Snapshot,
                Thread32First,
                Thread32Next,
                TH32CS_SNAPTHREAD,
                THREADENTRY32,
            },
            Threading::{
                OpenThread,
                ResumeThread,
                SuspendThread,
                CREATE_NEW_PROCESS_GROUP,
                THREAD_SUSPEND_RESUME,
            },
        },
    };

    use super::*;

    /// A new process group does not receive the console's Ctrl-C.
    #[inline]
    pub fn own_process_group(command: &mut Command) {
        command.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    /// Windows has no process-wide stop, so every thread of the process is
    /// suspended or resumed individually.
    #[derive(Debug, Default)]
    pub struct WindowsSuspender;

    struct Snapshot(HANDLE);

    impl Drop for Snapshot {
        fn drop(&mut self) {
            // SAFETY: the handle came from a successful CreateToolhelp32Snapshot
            // and is closed exactly once.
            unsafe { CloseHandle(self.0) };
        }
    }

    fn thread_ids(pid: u32) -> io::Result<Vec<u32>> {
        // SAFETY: plain FFI call, the result is checked below.
        let handle = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0) };
        if handle == INVALID_HANDLE_VALUE {
            return Err(io::Error::last_os_error());
        }
        let snapshot = Snapshot(handle);

        // SAFETY: THREADENTRY32 is plain data; all zeroes is a valid value.
        let mut entry: THREADENTRY32 = unsafe { mem::zeroed() };
        entry.dwSize = mem::size_of::<THREADENTRY32>() as u32;

        let mut ids = Vec::new();
        // SAFETY: `entry` is a properly sized THREADENTRY32 that outlives
        // both calls.
        let mut more = unsafe { Thread32First(snapshot.0, &mut entry) } != 0;
        while more {
            if entry.th32OwnerProcessID == pid {
                ids.push(entry.th32ThreadID);
            }
            // SAFETY: as above.
            more = unsafe { Thread32Next(snapshot.0, &mut entry) } != 0;
        }

        Ok(ids)
    }

    fn for_each_thread(pid: u32, suspend: bool) -> Result<(), ProcessError> {
        let action = if suspend { "suspend" } else { "resume" };
        let os_error = |source| ProcessError::Os {
            pid,
            action,
            source,
        };

        for thread_id in thread_ids(pid).map_err(os_error)? {
            // SAFETY: plain FFI call, the result is checked below.
            let thread = unsafe { OpenThread(THREAD_SUSPEND_RESUME, 0, thread_id) };
            if thread.is_null() {
                // The thread may have exited since the snapshot was taken.
                continue;
            }

            // SAFETY: `thread` is a valid handle opened with
            // THREAD_SUSPEND_RESUME.
            let previous = unsafe {
                if suspend {
                    SuspendThread(thread)
                } else {
                    ResumeThread(thread)
                }
            };
            let error = (previous == u32::MAX).then(io::Error::last_os_error);
            // SAFETY: opened above and closed exactly once.
            unsafe { CloseHandle(thread) };

            if let Some(error) = error {
                return Err(os_error(error));
            }
        }

        Ok(())
    }

    impl Suspender for WindowsSuspender {
        #[inline]
        fn suspend(&mut self, pid: u32) -> Result<(), ProcessError> {
            for_each_thread(pid, true)
        }

        #[inline]
        fn resume(&mut self, pid: u32) -> Result<(), ProcessError> {
            for_each_thread(pid, false)
        }
    }
}
