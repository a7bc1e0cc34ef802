//! C ABI entry points, so a managed runtime can load the cdylib and ask for
//! its own thread dump.

use crate::signals::DumpRequestFailed;
use crate::trigger::{SignalTrigger, TriggerResult};

fn dump_without_unwinding() -> TriggerResult {
    std::panic::catch_unwind(|| SignalTrigger::for_current_platform().request_dump()).unwrap_or(
        TriggerResult {
            accepted: false,
            failure: Some(DumpRequestFailed::Rejected { os_error: None }),
        },
    )
}

/// Copy the outcome into the caller's out-parameter, if any.
///
/// # Safety
///
/// `os_error` must be null or valid for a write of one `i64`.
unsafe fn report(result: &TriggerResult, os_error: *mut i64) -> bool {
    if !os_error.is_null() {
        // SAFETY: non-null and writable per the caller contract.
        unsafe { os_error.write(result.os_error().unwrap_or(0)) };
    }
    result.accepted
}

/// Request a thread dump of the current process group.
///
/// Returns `true` if the OS accepted the request.
#[no_mangle]
pub extern "C" fn stackdump_request_dump() -> bool {
    dump_without_unwinding().into()
}

/// Like [`stackdump_request_dump`], and also reports the OS error code
/// through `os_error` (0 when there is none). A null `os_error` is ignored.
///
/// # Safety
///
/// `os_error` must be null or point to writable memory for one `i64`.
#[no_mangle]
pub unsafe extern "C" fn stackdump_request_dump_ex(os_error: *mut i64) -> bool {
    let result = dump_without_unwinding();
    // SAFETY: forwarded caller contract.
    unsafe { report(&result, os_error) }
}
