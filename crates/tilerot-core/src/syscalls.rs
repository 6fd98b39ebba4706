//! Injection seam for the real OS primitives.
//!
//! The shim exports its own `ioctl` and `signal`, so nothing inside it may
//! call those names directly. Everything that reaches the kernel goes
//! through a `Syscalls` implementation resolved once at startup.
//!
//! # Implementors
//!
//! - `RealCalls` (tilerot-shim): entry points found with `dlsym(RTLD_NEXT)`.
//! - `LibcSyscalls` (tilerot-drm): plain libc calls, for tools that are not
//!   preloaded.
//! - `FakeDriver` (tilerot-drm tests): a scripted DRM device.

use std::os::raw::{c_int, c_ulong, c_void};
use std::os::unix::io::RawFd;

use crate::error::Result;

/// A plain `void (*)(int)` signal handler
pub type SignalHandler = extern "C" fn(c_int);

/// The real primitives the engine delegates to.
///
/// Methods used from the fatal-signal path (`ioctl`, `close`, `errno`,
/// `write_stderr`) must be async-signal-safe in every implementation.
pub trait Syscalls: Send + Sync {
    /// Issue a control request on a channel.
    ///
    /// Returns the driver status; on failure the error code is available
    /// from [`errno`](Self::errno) until the next call.
    ///
    /// # Safety
    ///
    /// `arg` must point to the argument block `request` expects, valid for
    /// reads and writes of the size encoded in `request`.
    unsafe fn ioctl(&self, fd: RawFd, request: c_ulong, arg: *mut c_void) -> c_int;

    /// Error code left by the most recent failing call on this thread.
    fn errno(&self) -> i32;

    /// Overwrite the calling thread's error code.
    fn set_errno(&self, errno: i32);

    /// Close a descriptor.
    fn close(&self, fd: RawFd) -> c_int;

    /// Write raw bytes to standard error without locking or allocating.
    fn write_stderr(&self, bytes: &[u8]);

    /// Whether `signum` is still at its default disposition.
    fn has_default_disposition(&self, signum: c_int) -> bool;

    /// Install `handler` for `signum`.
    fn install_handler(&self, signum: c_int, handler: SignalHandler) -> Result<()>;
}
