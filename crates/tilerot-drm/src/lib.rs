//! # tilerot-drm
//!
//! DRM/KMS interception engine for the tilerot rotation shim.
//!
//! The [`Engine`] sits between an unmodified fullscreen application and
//! the kernel DRM driver. Dumb buffers become OMAP TILER allocations, every
//! plane is committed with a 270° rotation, CRTC geometry is swapped both
//! ways, and every kernel object created along the way is tracked so the
//! [cleanup coordinator](cleanup) can reclaim it on exit or fatal signal.
//!
//! ## Modules
//!
//! - `drm_sys` - uapi structures and request codes
//! - `request` - Request classification and typed argument decoding
//! - `engine` - The `Engine` context object and its tracking tables
//! - `dispatcher` - `Engine::dispatch`, the single intercepted entry point
//! - `alloc` - Dumb buffer to tiled buffer translation
//! - `rotation` - Plane enumeration, property discovery, atomic commit
//! - `geometry` - hdisplay/vdisplay swap
//! - `cleanup` - Idempotent shutdown and signal-handler policy
//! - `report` - Signal-safe cleanup report
//! - `libc_sys` - `Syscalls` over plain libc

cfg_if::cfg_if! {
    if #[cfg(not(target_os = "linux"))] {
        compile_error!("tilerot-drm requires Linux (DRM/KMS uapi)");
    }
}

pub mod drm_sys;
pub mod request;
pub mod engine;
pub mod dispatcher;
pub mod alloc;
pub mod rotation;
pub mod geometry;
pub mod cleanup;
pub mod report;
pub mod libc_sys;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{Engine, TrackerSnapshot};
pub use request::{Command, DrmArg};
pub use alloc::{tiled_layout, TiledLayout};
pub use rotation::{apply_rotation, find_rotation_property, list_planes, RotationReport};
pub use geometry::swap_axes;
pub use cleanup::{redirects_default, Trigger, TERMINATION_SIGNALS};
pub use report::{CleanupEvent, CleanupReport};
pub use libc_sys::LibcSyscalls;
