//! Turning termination signals into ordinary error returns.
//!
//! The handlers only record which signal arrived. The executor polls the
//! flag while a stage runs, kills the child, and returns
//! [`DriverError::Interrupted`](crate::DriverError::Interrupted) so the
//! workspace is dropped on the normal unwind path.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::error::DriverError;

/// Records the first cancellation request.
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicI32);

impl CancelFlag {
    pub const fn new() -> Self {
        Self(AtomicI32::new(0))
    }

    /// Marks the flag as raised by `signal`. Safe to call from a signal handler.
    pub fn raise(&self, signal: i32) {
        let _ = self
            .0
            .compare_exchange(0, signal, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn raised(&self) -> Option<i32> {
        match self.0.load(Ordering::SeqCst) {
            0 => None,
            signal => Some(signal),
        }
    }
}

static INTERRUPTED: CancelFlag = CancelFlag::new();

/// Installs handlers for SIGINT, SIGTERM and SIGHUP and returns the flag
/// they raise.
#[cfg(unix)]
pub fn install_handlers() -> Result<&'static CancelFlag, DriverError> {
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

    extern "C" fn on_signal(signal: std::ffi::c_int) {
        INTERRUPTED.raise(signal);
    }

    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP] {
        // SAFETY: the handler only performs an atomic store.
        unsafe { sigaction(signal, &action) }.map_err(DriverError::SignalSetup)?;
    }
    Ok(&INTERRUPTED)
}

#[cfg(not(unix))]
pub fn install_handlers() -> Result<&'static CancelFlag, DriverError> {
    Ok(&INTERRUPTED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_lowered() {
        let flag = CancelFlag::new();
        assert_eq!(flag.raised(), None);
    }

    #[test]
    fn keeps_first_signal() {
        let flag = CancelFlag::new();
        flag.raise(15);
        flag.raise(2);
        assert_eq!(flag.raised(), Some(15));
    }
}
