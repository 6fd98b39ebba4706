//! [`Syscalls`] over plain libc.
//!
//! For processes that are not preloaded with the shim, such as
//! `tilerot-probe`, where the libc `ioctl` is the real one.

use std::os::raw::{c_int, c_ulong, c_void};
use std::os::unix::io::RawFd;

use nix::errno::Errno;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use tilerot_core::{Result, SignalHandler, Syscalls, TilerError};

/// Direct libc calls
#[derive(Debug, Clone, Copy, Default)]
pub struct LibcSyscalls;

/// Whether `signum` is at `SIG_DFL`, via a query-only `sigaction`
pub fn default_disposition(signum: c_int) -> bool {
    // Safety: a null new action makes sigaction a pure query
    unsafe {
        let mut old: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(signum, std::ptr::null(), &mut old) != 0 {
            return false;
        }
        old.sa_sigaction == libc::SIG_DFL
    }
}

/// Install `handler` for `signum` with `sigaction`
pub fn install_with_sigaction(signum: c_int, handler: SignalHandler) -> Result<()> {
    let signal = Signal::try_from(signum)
        .map_err(|e| TilerError::Signal { signum, errno: e as i32 })?;
    let action = SigAction::new(SigHandler::Handler(handler), SaFlags::empty(), SigSet::empty());
    // Safety: the handler only runs the async-signal-safe cleanup path
    unsafe { sigaction(signal, &action) }
        .map(|_| ())
        .map_err(|e| TilerError::Signal { signum, errno: e as i32 })
}

impl Syscalls for LibcSyscalls {
    unsafe fn ioctl(&self, fd: RawFd, request: c_ulong, arg: *mut c_void) -> c_int {
        libc::ioctl(fd, request as _, arg)
    }

    fn errno(&self) -> i32 {
        Errno::last_raw()
    }

    fn set_errno(&self, errno: i32) {
        Errno::set_raw(errno);
    }

    fn close(&self, fd: RawFd) -> c_int {
        // Safety: closing a descriptor has no memory-safety requirements
        unsafe { libc::close(fd) }
    }

    fn write_stderr(&self, bytes: &[u8]) {
        let mut rest = bytes;
        while !rest.is_empty() {
            // Safety: `rest` is a live slice
            let n = unsafe { libc::write(libc::STDERR_FILENO, rest.as_ptr() as *const c_void, rest.len()) };
            if n <= 0 {
                break;
            }
            rest = &rest[n as usize..];
        }
    }

    fn has_default_disposition(&self, signum: c_int) -> bool {
        default_disposition(signum)
    }

    fn install_handler(&self, signum: c_int, handler: SignalHandler) -> Result<()> {
        install_with_sigaction(signum, handler)
    }
}
