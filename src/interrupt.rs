//! SIGINT translation for a tool that owns child process groups.
//!
//! The sampling runner leads its own process group, so a terminal ^C
//! delivered to the tuner does not reach it. The installed handler
//! forwards SIGINT to the live group (the runner reports its tally and
//! exits) and raises a cancellation flag. Everything past that point is
//! ordinary control flow: the supervisor notices the flag or the closed
//! stream, surfaces [`Interrupted`], and `main` maps it to exit code 130.
//!
//! The handler body is restricted to atomics and `killpg`, both
//! async-signal-safe.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use anyhow::{bail, Result};

static CANCELLED: AtomicBool = AtomicBool::new(false);
static LIVE_GROUP: AtomicI32 = AtomicI32::new(0);

/// Marker error for user cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interrupted by user")
    }
}

impl std::error::Error for Interrupted {}

extern "C" fn forward_sigint(_signal: libc::c_int) {
    let group = LIVE_GROUP.load(Ordering::SeqCst);
    if group > 0 {
        unsafe {
            libc::killpg(group, libc::SIGINT);
        }
    }
    CANCELLED.store(true, Ordering::SeqCst);
}

/// Install the SIGINT handler. Call once at startup.
pub fn install() -> Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = forward_sigint as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut()) != 0 {
            bail!(
                "Failed to install SIGINT handler: {}",
                io::Error::last_os_error()
            );
        }
    }
    Ok(())
}

/// Record the live runner process group.
pub fn register_group(group: i32) {
    LIVE_GROUP.store(group, Ordering::SeqCst);
}

/// Forget the process group once it has been reaped.
pub fn clear_group() {
    LIVE_GROUP.store(0, Ordering::SeqCst);
}

/// True once the user has interrupted the run.
pub fn cancelled() -> bool {
    CANCELLED.load(Ordering::SeqCst)
}

/// Fail with [`Interrupted`] once the user has interrupted the run.
pub fn check() -> Result<()> {
    if cancelled() {
        Err(Interrupted.into())
    } else {
        Ok(())
    }
}
