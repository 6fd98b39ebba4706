//! Cleanup coordinator.
//!
//! Reclaims every tracked kernel object when the process goes away, either
//! through the exit hook or a fatal signal. The body runs at most once per
//! engine: the first trigger flips the cleaning flag and every later
//! trigger returns immediately.
//!
//! Order: exported descriptors, then framebuffers newest first, then tiled
//! buffers newest first, then the report, then the descriptor safety net.
//! A framebuffer is removed before the buffer backing it is destroyed.
//!
//! On the signal path nothing here takes the stderr lock, allocates, or
//! spins unboundedly. Table access uses a bounded `try_lock_for`; if the
//! interrupted code holds the lock the table steps are skipped.

use std::fmt;
use std::os::raw::c_int;
use std::os::unix::io::RawFd;
use std::sync::atomic::Ordering;

use nix::sys::signal::Signal;
use tilerot_core::kprint::{level_enabled, LogLevel};
use tilerot_core::spinlock::SpinLockGuard;
use tilerot_core::{kdebug, kinfo, kwarn, Result, SignalHandler, Syscalls, TilerError, TrackedHandle};

use crate::drm_sys::{DrmModeDestroyDumb, DRM_IOCTL_MODE_DESTROY_DUMB, DRM_IOCTL_MODE_RMFB};
use crate::engine::{drm_call, Engine, Tables};
use crate::report::{render_line, CleanupEvent, LineBuf};

/// Spin budget for taking the tables lock from a signal handler
const SIGNAL_LOCK_ATTEMPTS: u32 = 1 << 16;

/// Signals that run the cleanup body before the process dies
pub const TERMINATION_SIGNALS: [c_int; 9] = [
    libc::SIGFPE,
    libc::SIGILL,
    libc::SIGSEGV,
    libc::SIGBUS,
    libc::SIGABRT,
    libc::SIGSYS,
    libc::SIGTERM,
    libc::SIGINT,
    libc::SIGQUIT,
];

/// Whether a request to reset `signum` to its default disposition should
/// install the cleanup handler instead
#[inline]
pub fn redirects_default(signum: c_int) -> bool {
    TERMINATION_SIGNALS.contains(&signum)
}

/// What started the cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Exit,
    Signal(c_int),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Trigger::Exit => write!(f, "exit"),
            Trigger::Signal(signum) => match Signal::try_from(signum) {
                Ok(sig) => write!(f, "signal {} ({})", signum, sig.as_str()),
                Err(_) => write!(f, "signal {}", signum),
            },
        }
    }
}

enum Tracked {
    Descriptor(RawFd),
    Framebuffer(TrackedHandle),
    Buffer(TrackedHandle),
}

fn status(result: Result<()>) -> (c_int, i32) {
    match result {
        Ok(()) => (0, 0),
        Err(TilerError::Driver { errno, .. }) => (-1, errno),
        Err(_) => (-1, 0),
    }
}

impl<S: Syscalls> Engine<S> {
    /// Move from armed to cleaning
    ///
    /// Returns `true` for exactly one caller.
    pub fn begin_cleanup(&self) -> bool {
        self.cleaning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Run the cleanup body if no trigger has run it yet
    ///
    /// Returns whether this call ran it.
    pub fn cleanup(&self, trigger: Trigger) -> bool {
        if !self.begin_cleanup() {
            return false;
        }
        self.report.push(CleanupEvent::Started(trigger));

        if !self.release_tracked(trigger) {
            self.report.push(CleanupEvent::TablesBusy);
        }
        self.flush_report(trigger);
        self.close_safety_net();
        true
    }

    /// Install the cleanup handler for every termination signal still at
    /// its default disposition
    ///
    /// Signals the application already handles are left alone. Returns the
    /// number of handlers installed.
    pub fn arm_signals(&self, handler: SignalHandler) -> usize {
        let mut armed = 0;
        for signum in TERMINATION_SIGNALS {
            if !self.sys.has_default_disposition(signum) {
                kdebug!("signal {} already handled, leaving it", signum);
                continue;
            }
            match self.sys.install_handler(signum, handler) {
                Ok(()) => armed += 1,
                Err(e) => kwarn!("{}", e),
            }
        }
        armed
    }

    fn lock_tables(&self, trigger: Trigger) -> Option<SpinLockGuard<'_, Tables>> {
        match trigger {
            Trigger::Exit => Some(self.tables.lock()),
            Trigger::Signal(_) => self.tables.try_lock_for(SIGNAL_LOCK_ATTEMPTS),
        }
    }

    /// Release tracked objects one at a time, never holding the lock
    /// across a driver call
    ///
    /// Returns `false` if the tables could not be locked.
    fn release_tracked(&self, trigger: Trigger) -> bool {
        loop {
            let next = {
                let Some(mut tables) = self.lock_tables(trigger) else {
                    return false;
                };
                tables
                    .descriptors
                    .pop()
                    .map(Tracked::Descriptor)
                    .or_else(|| tables.framebuffers.pop_newest().map(Tracked::Framebuffer))
                    .or_else(|| tables.buffers.pop_newest().map(Tracked::Buffer))
            };
            match next {
                Some(obj) => self.release(obj),
                None => return true,
            }
        }
    }

    fn release(&self, obj: Tracked) {
        let event = match obj {
            Tracked::Descriptor(fd) => {
                let ret = self.sys.close(fd);
                CleanupEvent::DescriptorClosed { fd, ret }
            }
            Tracked::Framebuffer(fb) => {
                let mut fb_id = fb.handle;
                let (ret, errno) =
                    status(drm_call(&self.sys, fb.channel, DRM_IOCTL_MODE_RMFB, &mut fb_id));
                CleanupEvent::FramebufferRemoved { channel: fb.channel, fb_id: fb.handle, ret, errno }
            }
            Tracked::Buffer(bo) => {
                let mut req = DrmModeDestroyDumb { handle: bo.handle };
                let (ret, errno) =
                    status(drm_call(&self.sys, bo.channel, DRM_IOCTL_MODE_DESTROY_DUMB, &mut req));
                CleanupEvent::BufferDestroyed { channel: bo.channel, handle: bo.handle, ret, errno }
            }
        };
        self.report.push(event);
    }

    fn flush_report(&self, trigger: Trigger) {
        match trigger {
            Trigger::Exit => {
                while let Some(event) = self.report.pop() {
                    match event.level() {
                        LogLevel::Warn => kwarn!("{}", event),
                        _ => kinfo!("{}", event),
                    }
                }
                let dropped = self.report.dropped();
                if dropped > 0 {
                    kwarn!("{} cleanup events not reported", dropped);
                }
            }
            Trigger::Signal(_) => {
                let mut line = LineBuf::new();
                while let Some(event) = self.report.pop() {
                    if !level_enabled(event.level()) {
                        continue;
                    }
                    render_line(&mut line, &event);
                    self.sys.write_stderr(line.as_bytes());
                }
            }
        }
    }

    /// Close `0..safety_net_fds`, catching descriptors the tables missed
    fn close_safety_net(&self) {
        for fd in 0..self.config.safety_net_fds {
            self.sys.close(fd);
        }
    }
}
