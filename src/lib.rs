//! Ask the hosting process to print its thread dump.
//!
//! A managed runtime (a JVM, for instance) writes every thread's stack to
//! its diagnostic output when it receives SIGQUIT on Unix or CTRL-BREAK on
//! Windows. [`request_dump`] sends that signal to the current process group
//! and reports whether the OS accepted it.

pub mod config;
pub mod ffi;
#[cfg(feature = "serve")]
pub mod serve;
pub mod signals;
pub mod trigger;

pub use signals::{DumpRequestFailed, DumpSignaler};
pub use trigger::{request_dump, SignalTrigger, TriggerResult};
