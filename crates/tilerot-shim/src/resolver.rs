//! Real entry points behind the interposed ones.
//!
//! This library exports `ioctl` and `signal`, so calling either by name
//! from inside it would recurse. The next definitions in link order are
//! looked up once with `dlsym(RTLD_NEXT)`; if a lookup fails the raw
//! syscall (ioctl) or `sigaction` (signal) stands in.

use std::os::raw::{c_char, c_int, c_ulong, c_void};
use std::os::unix::io::RawFd;

use tilerot_core::{kwarn, Result, SignalHandler, Syscalls, TilerError};
use tilerot_drm::libc_sys::{install_with_sigaction, LibcSyscalls};

type IoctlFn = unsafe extern "C" fn(c_int, c_ulong, *mut c_void) -> c_int;
type SignalFn = unsafe extern "C" fn(c_int, libc::sighandler_t) -> libc::sighandler_t;

/// Look up the next definition of `name` (NUL-terminated)
unsafe fn next_symbol<T: Copy>(name: &'static [u8]) -> Option<T> {
    debug_assert_eq!(name.last(), Some(&0));
    let ptr = libc::dlsym(libc::RTLD_NEXT, name.as_ptr() as *const c_char);
    if ptr.is_null() {
        None
    } else {
        Some(std::mem::transmute_copy(&ptr))
    }
}

/// [`Syscalls`] for a preloaded process
pub struct RealCalls {
    ioctl: Option<IoctlFn>,
    signal: Option<SignalFn>,
    libc: LibcSyscalls,
}

impl RealCalls {
    /// Resolve the real entry points
    pub fn resolve() -> Self {
        // Safety: the named symbols have the signatures of IoctlFn/SignalFn
        let (ioctl, signal) = unsafe { (next_symbol(b"ioctl\0"), next_symbol(b"signal\0")) };
        if ioctl.is_none() {
            kwarn!("real ioctl not found, using the raw syscall");
        }
        if signal.is_none() {
            kwarn!("real signal not found, using sigaction");
        }
        Self { ioctl, signal, libc: LibcSyscalls }
    }

    /// Whether both entry points were found by name
    pub fn fully_resolved(&self) -> bool {
        self.ioctl.is_some() && self.signal.is_some()
    }

    /// Set the disposition of `signum` through the real `signal`
    ///
    /// Returns the previous disposition, or `SIG_ERR`.
    ///
    /// # Safety
    ///
    /// `handler` must be `SIG_DFL`, `SIG_IGN` or a valid handler address.
    pub unsafe fn signal(&self, signum: c_int, handler: libc::sighandler_t) -> libc::sighandler_t {
        if let Some(real) = self.signal {
            return real(signum, handler);
        }
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        let mut old: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(signum, &action, &mut old) != 0 {
            return libc::SIG_ERR;
        }
        old.sa_sigaction
    }
}

impl Syscalls for RealCalls {
    unsafe fn ioctl(&self, fd: RawFd, request: c_ulong, arg: *mut c_void) -> c_int {
        match self.ioctl {
            Some(real) => real(fd, request, arg),
            None => libc::syscall(libc::SYS_ioctl, fd, request, arg) as c_int,
        }
    }

    fn errno(&self) -> i32 {
        self.libc.errno()
    }

    fn set_errno(&self, errno: i32) {
        self.libc.set_errno(errno)
    }

    fn close(&self, fd: RawFd) -> c_int {
        self.libc.close(fd)
    }

    fn write_stderr(&self, bytes: &[u8]) {
        self.libc.write_stderr(bytes)
    }

    fn has_default_disposition(&self, signum: c_int) -> bool {
        self.libc.has_default_disposition(signum)
    }

    fn install_handler(&self, signum: c_int, handler: SignalHandler) -> Result<()> {
        let Some(real) = self.signal else {
            return install_with_sigaction(signum, handler);
        };
        // Safety: `handler` is a valid `void (*)(int)`
        let prev = unsafe { real(signum, handler as libc::sighandler_t) };
        if prev == libc::SIG_ERR {
            return Err(TilerError::Signal { signum, errno: self.errno() });
        }
        Ok(())
    }
}
