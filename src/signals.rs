//! Dump signal delivery.
//!
//! A managed runtime prints its thread dump when it receives a quit signal
//! (SIGQUIT on Unix) or a console break event (CTRL-BREAK on Windows). The
//! strategies here ask the OS to deliver that signal to our own process group.
//! Each strategy talks to the OS through a small seam trait so the decision
//! logic can run against a scripted fake.

use std::sync::Arc;

/// The single failure kind: the OS did not take the dump request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpRequestFailed {
    /// The current process group id did not resolve to a positive value.
    /// Nothing was sent.
    NoTarget { pgid: i32 },
    /// The OS rejected the signal or console event.
    Rejected { os_error: Option<i64> },
}

impl DumpRequestFailed {
    /// OS error code behind the failure, if the platform reported one.
    pub fn os_error(&self) -> Option<i64> {
        match self {
            DumpRequestFailed::NoTarget { .. } => None,
            DumpRequestFailed::Rejected { os_error } => *os_error,
        }
    }
}

impl std::fmt::Display for DumpRequestFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DumpRequestFailed::NoTarget { pgid } => {
                write!(f, "could not determine process group (got {})", pgid)
            }
            DumpRequestFailed::Rejected {
                os_error: Some(code),
            } => write!(f, "OS rejected the dump request (os error {})", code),
            DumpRequestFailed::Rejected { os_error: None } => {
                write!(f, "OS rejected the dump request")
            }
        }
    }
}

impl std::error::Error for DumpRequestFailed {}

/// Something that can ask the OS to make the hosting runtime dump its threads.
pub trait DumpSignaler: Send + Sync {
    /// Deliver the dump signal. Returns once the OS has accepted or refused
    /// the request; the dump itself happens later, in the runtime's handler.
    fn signal(&self) -> Result<(), DumpRequestFailed>;

    /// The keyboard gesture that has the same effect.
    fn describe(&self) -> &'static str;
}

// --- POSIX process-group strategy ---

/// OS calls needed to signal a process group.
pub trait GroupSignalOs: Send + Sync {
    /// Id of the calling process's group.
    fn process_group_id(&self) -> i32;
    /// Send the quit signal to `pgid`. `Err` carries the errno.
    fn signal_group(&self, pgid: i32) -> Result<(), i32>;
}

/// Real group calls via `nix`.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct NixGroupOs;

#[cfg(unix)]
impl GroupSignalOs for NixGroupOs {
    fn process_group_id(&self) -> i32 {
        nix::unistd::getpgrp().as_raw()
    }

    fn signal_group(&self, pgid: i32) -> Result<(), i32> {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        killpg(Pid::from_raw(pgid), Signal::SIGQUIT).map_err(|errno| errno as i32)
    }
}

/// Sends SIGQUIT to the whole current process group.
///
/// The group is targeted rather than our own pid so the signal also reaches
/// whichever thread or sibling process owns the runtime's quit handler.
#[derive(Debug, Default, Clone)]
pub struct PosixGroupSignaler<O> {
    os: O,
}

impl<O: GroupSignalOs> PosixGroupSignaler<O> {
    pub fn with_os(os: O) -> Self {
        Self { os }
    }
}

#[cfg(unix)]
impl PosixGroupSignaler<NixGroupOs> {
    pub fn new() -> Self {
        Self::with_os(NixGroupOs)
    }
}

impl<O: GroupSignalOs> DumpSignaler for PosixGroupSignaler<O> {
    fn signal(&self) -> Result<(), DumpRequestFailed> {
        let pgid = self.os.process_group_id();
        if pgid <= 0 {
            tracing::debug!(pgid, "process group did not resolve, not signalling");
            return Err(DumpRequestFailed::NoTarget { pgid });
        }

        tracing::debug!(pgid, "sending SIGQUIT to process group");
        self.os
            .signal_group(pgid)
            .map_err(|errno| DumpRequestFailed::Rejected {
                os_error: Some(i64::from(errno)),
            })
    }

    fn describe(&self) -> &'static str {
        "CTRL-\\"
    }
}

// --- Windows console-event strategy ---

/// OS call needed to raise a console break event.
pub trait ConsoleEventOs: Send + Sync {
    /// Raise CTRL-BREAK for our console group. `Err` carries the last-error code.
    fn raise_break(&self) -> Result<(), u32>;
}

/// Real console call via `windows-sys`.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32ConsoleOs;

#[cfg(windows)]
impl ConsoleEventOs for Win32ConsoleOs {
    fn raise_break(&self) -> Result<(), u32> {
        use windows_sys::Win32::Foundation::GetLastError;
        use windows_sys::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};

        // Group 0 addresses every process attached to our console.
        // SAFETY: plain Win32 call with no pointer arguments.
        if unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, 0) } != 0 {
            Ok(())
        } else {
            Err(unsafe { GetLastError() })
        }
    }
}

/// Raises a console CTRL-BREAK event for the current console group.
#[derive(Debug, Default, Clone)]
pub struct ConsoleEventSignaler<C> {
    os: C,
}

impl<C: ConsoleEventOs> ConsoleEventSignaler<C> {
    pub fn with_os(os: C) -> Self {
        Self { os }
    }
}

#[cfg(windows)]
impl ConsoleEventSignaler<Win32ConsoleOs> {
    pub fn new() -> Self {
        Self::with_os(Win32ConsoleOs)
    }
}

impl<C: ConsoleEventOs> DumpSignaler for ConsoleEventSignaler<C> {
    fn signal(&self) -> Result<(), DumpRequestFailed> {
        tracing::debug!("raising console CTRL-BREAK event");
        self.os
            .raise_break()
            .map_err(|code| DumpRequestFailed::Rejected {
                os_error: Some(i64::from(code)),
            })
    }

    fn describe(&self) -> &'static str {
        "CTRL-BREAK"
    }
}

/// The strategy for the host OS, chosen at build time.
#[cfg(unix)]
pub fn platform_signaler() -> Arc<dyn DumpSignaler> {
    Arc::new(PosixGroupSignaler::new())
}

/// The strategy for the host OS, chosen at build time.
#[cfg(windows)]
pub fn platform_signaler() -> Arc<dyn DumpSignaler> {
    Arc::new(ConsoleEventSignaler::new())
}

#[cfg(not(any(unix, windows)))]
compile_error!("stackdump supports unix and windows hosts only");
