//! One-shot dump trigger: one signaler call, translated into a pass/fail outcome.

use crate::signals::{platform_signaler, DumpRequestFailed, DumpSignaler};
use std::sync::Arc;

/// Outcome of a single dump request.
///
/// `accepted` only means the OS took the request. The runtime writes the
/// dump asynchronously from its own signal handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerResult {
    pub accepted: bool,
    /// Why the request failed. Always `None` when `accepted`.
    pub failure: Option<DumpRequestFailed>,
}

impl TriggerResult {
    fn success() -> Self {
        Self {
            accepted: true,
            failure: None,
        }
    }

    fn failed(failure: DumpRequestFailed) -> Self {
        Self {
            accepted: false,
            failure: Some(failure),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn failure(&self) -> Option<&DumpRequestFailed> {
        self.failure.as_ref()
    }

    /// OS error code for a rejected request, when one was reported.
    pub fn os_error(&self) -> Option<i64> {
        self.failure.as_ref().and_then(DumpRequestFailed::os_error)
    }
}

impl From<TriggerResult> for bool {
    fn from(result: TriggerResult) -> bool {
        result.accepted
    }
}

/// Requests thread dumps through an injected [`DumpSignaler`].
///
/// Holds no mutable state; clones share the signaler and may be used from
/// any number of threads at once.
#[derive(Clone)]
pub struct SignalTrigger {
    signaler: Arc<dyn DumpSignaler>,
}

impl SignalTrigger {
    pub fn new(signaler: Arc<dyn DumpSignaler>) -> Self {
        Self { signaler }
    }

    /// Trigger wired to the host OS strategy.
    pub fn for_current_platform() -> Self {
        Self::new(platform_signaler())
    }

    /// Ask the OS to deliver the dump signal. Never panics.
    pub fn request_dump(&self) -> TriggerResult {
        match self.signaler.signal() {
            Ok(()) => {
                tracing::debug!("dump request accepted");
                TriggerResult::success()
            }
            Err(failure) => {
                tracing::debug!(
                    error = %failure,
                    os_error = ?failure.os_error(),
                    "dump request failed"
                );
                TriggerResult::failed(failure)
            }
        }
    }

    /// Keyboard gesture equivalent to a dump on this platform.
    pub fn gesture(&self) -> &'static str {
        self.signaler.describe()
    }
}

impl std::fmt::Debug for SignalTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalTrigger")
            .field("gesture", &self.gesture())
            .finish()
    }
}

/// Request a dump of the current process group. `true` if the OS accepted.
pub fn request_dump() -> bool {
    SignalTrigger::for_current_platform().request_dump().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::testing::{FakeConsoleOs, FakeGroupOs};
    use crate::signals::{ConsoleEventSignaler, PosixGroupSignaler};

    fn posix_trigger(os: Arc<FakeGroupOs>) -> SignalTrigger {
        SignalTrigger::new(Arc::new(PosixGroupSignaler::with_os(os)))
    }

    #[test]
    fn test_resolved_group_and_successful_send_is_accepted() {
        let os = Arc::new(FakeGroupOs::new(4821, Ok(())));
        let result = posix_trigger(Arc::clone(&os)).request_dump();

        assert!(result.is_accepted());
        assert_eq!(result.failure(), None);
        assert_eq!(result.os_error(), None);
        assert_eq!(*os.sent_to.lock().unwrap(), vec![4821]);
    }

    #[test]
    fn test_unresolved_group_fails_without_send() {
        let os = Arc::new(FakeGroupOs::new(-1, Ok(())));
        let result = posix_trigger(Arc::clone(&os)).request_dump();

        assert!(!result.is_accepted());
        assert_eq!(
            result.failure(),
            Some(&DumpRequestFailed::NoTarget { pgid: -1 })
        );
        assert_eq!(os.send_calls(), 0);
    }

    #[test]
    fn test_failed_send_is_rejected() {
        let os = Arc::new(FakeGroupOs::new(4821, Err(-1)));
        let result = posix_trigger(Arc::clone(&os)).request_dump();

        assert!(!result.is_accepted());
        assert_eq!(result.os_error(), Some(-1));
        assert_eq!(os.send_calls(), 1);
    }

    #[test]
    fn test_console_event_outcomes() {
        let ok = SignalTrigger::new(Arc::new(ConsoleEventSignaler::with_os(
            FakeConsoleOs::new(Ok(())),
        )));
        assert!(ok.request_dump().is_accepted());
        assert_eq!(ok.gesture(), "CTRL-BREAK");

        let failing = SignalTrigger::new(Arc::new(ConsoleEventSignaler::with_os(
            FakeConsoleOs::new(Err(5)),
        )));
        let result = failing.request_dump();
        assert!(!result.is_accepted());
        assert_eq!(result.os_error(), Some(5));
    }

    #[test]
    fn test_repeated_calls_give_same_outcome() {
        let os = Arc::new(FakeGroupOs::new(4821, Ok(())));
        let trigger = posix_trigger(Arc::clone(&os));
        for _ in 0..5 {
            assert!(trigger.request_dump().is_accepted());
        }
        assert_eq!(os.send_calls(), 5);

        let unresolved = posix_trigger(Arc::new(FakeGroupOs::new(0, Ok(()))));
        for _ in 0..5 {
            assert!(!bool::from(unresolved.request_dump()));
        }
    }

    #[test]
    fn test_outcome_tracks_os_state_per_call() {
        let os = Arc::new(FakeGroupOs::new(4821, Ok(())));
        os.sends.lock().unwrap().extend([Err(1), Ok(()), Err(3)]);
        let trigger = posix_trigger(Arc::clone(&os));

        assert_eq!(trigger.request_dump().os_error(), Some(1));
        assert!(trigger.request_dump().is_accepted());
        assert_eq!(trigger.request_dump().os_error(), Some(3));
        // Script exhausted, falls back to the default result.
        assert!(trigger.request_dump().is_accepted());
    }

    #[test]
    fn test_concurrent_calls_are_independent() {
        let os = Arc::new(FakeGroupOs::new(4821, Ok(())));
        // Every odd send fails.
        os.sends
            .lock()
            .unwrap()
            .extend((0..64).map(|i| if i % 2 == 0 { Ok(()) } else { Err(11) }));
        let trigger = posix_trigger(Arc::clone(&os));

        let results: Vec<TriggerResult> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..64)
                .map(|_| {
                    let trigger = trigger.clone();
                    s.spawn(move || trigger.request_dump())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(os.send_calls(), 64);
        let accepted = results.iter().filter(|r| r.is_accepted()).count();
        assert_eq!(accepted, 32);
        for result in results.iter().filter(|r| !r.is_accepted()) {
            assert_eq!(result.os_error(), Some(11));
        }
    }

    #[test]
    fn test_debug_shows_gesture() {
        let trigger = posix_trigger(Arc::new(FakeGroupOs::new(1, Ok(()))));
        assert_eq!(
            format!("{trigger:?}"),
            "SignalTrigger { gesture: \"CTRL-\\\\\" }"
        );
    }
}
