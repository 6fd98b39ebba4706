//! # tilerot-shim
//!
//! Preloadable library that rotates an unmodified fullscreen KMS
//! application by 270°:
//!
//! ```text
//! LD_PRELOAD=/path/to/libtiler_shim.so ROTATE_DEBUG=1 ./app
//! ```
//!
//! Exports `ioctl`, routed through the [`Engine`] dispatcher, and `signal`,
//! which keeps the cleanup handler in place when the application resets a
//! termination signal to its default. The engine is created on the first
//! intercepted call; the exit hook and the fatal-signal handler run its
//! cleanup once.

use std::os::raw::{c_int, c_ulong, c_void};
use std::sync::OnceLock;

use tilerot_core::constants::CLEANUP_EXIT_STATUS;
use tilerot_core::{kdebug, kerror, ShimConfig, SignalHandler};
use tilerot_drm::{redirects_default, Engine, Trigger};

pub mod resolver;

use resolver::RealCalls;

static ENGINE: OnceLock<Engine<RealCalls>> = OnceLock::new();

fn engine() -> &'static Engine<RealCalls> {
    ENGINE.get_or_init(|| {
        let mut config = ShimConfig::from_env();
        if let Err(e) = config.validate() {
            kerror!("invalid configuration ({}), using defaults", e);
            config = ShimConfig::new().debug(config.debug);
        }
        config.apply_logging();

        let engine = Engine::new(RealCalls::resolve(), config);
        let armed = engine.arm_signals(on_fatal_signal);
        kdebug!("tiler shim loaded, {} cleanup handlers armed", armed);
        engine
    })
}

/// Fatal-signal handler: clean up, then leave without running atexit
extern "C" fn on_fatal_signal(signum: c_int) {
    if let Some(engine) = ENGINE.get() {
        engine.cleanup(Trigger::Signal(signum));
    }
    // Safety: _exit is async-signal-safe
    unsafe { libc::_exit(CLEANUP_EXIT_STATUS) }
}

/// Disposition to actually install for a `signal(signum, handler)` request
fn effective_handler(signum: c_int, handler: libc::sighandler_t, cleanup: SignalHandler) -> libc::sighandler_t {
    if handler == libc::SIG_DFL && redirects_default(signum) {
        cleanup as libc::sighandler_t
    } else {
        handler
    }
}

/// Interposed `ioctl(2)`
///
/// # Safety
///
/// Same contract as the libc function.
#[cfg_attr(not(test), no_mangle)]
pub unsafe extern "C" fn ioctl(fd: c_int, request: c_ulong, arg: *mut c_void) -> c_int {
    engine().dispatch(fd, request, arg)
}

/// Interposed `signal(2)`
///
/// # Safety
///
/// Same contract as the libc function.
#[cfg_attr(not(test), no_mangle)]
pub unsafe extern "C" fn signal(signum: c_int, handler: libc::sighandler_t) -> libc::sighandler_t {
    let engine = engine();
    let installed = effective_handler(signum, handler, on_fatal_signal);
    if installed != handler {
        kdebug!("signal {} reset to default, keeping cleanup handler", signum);
    }
    engine.syscalls().signal(signum, installed)
}

#[cfg(not(test))]
#[ctor::dtor]
fn on_process_exit() {
    if let Some(engine) = ENGINE.get() {
        engine.cleanup(Trigger::Exit);
    }
}
