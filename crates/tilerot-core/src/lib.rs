//! # tilerot-core
//!
//! Core types for the tilerot rotation shim.
//!
//! This crate is platform-agnostic and contains no DRM-specific code.
//! The ioctl bindings and the interception engine live in `tilerot-drm`;
//! the preloadable library lives in `tilerot-shim`.
//!
//! ## Modules
//!
//! - `tracker` - Fixed-capacity tables of kernel resources to reclaim
//! - `syscalls` - Injection seam for the real ioctl/signal primitives
//! - `config` - Shim configuration
//! - `error` - Error types
//! - `spinlock` - Spinlock with `try_lock`, usable from signal context
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

cfg_if::cfg_if! {
    if #[cfg(not(unix))] {
        compile_error!("tilerot-core requires a Unix target (raw descriptors)");
    }
}

pub mod tracker;
pub mod syscalls;
pub mod config;
pub mod error;
pub mod spinlock;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use tracker::{DescriptorSet, HandleTable, TrackedHandle};
pub use syscalls::{SignalHandler, Syscalls};
pub use config::ShimConfig;
pub use error::{DecodeError, Result, TilerError};
pub use spinlock::SpinLock;
pub use env::{env_get, env_get_bool, env_get_opt};

/// Fixed constants of the rotation scheme
pub mod constants {
    /// Slots per tracking table
    pub const TABLE_CAPACITY: usize = 32;

    /// Allocation width the TILER requires, independent of the requested width
    pub const TILER_FIXED_WIDTH: u32 = 8192;

    /// Upper bound on planes enumerated per allocation
    pub const MAX_PLANES: usize = 16;

    /// Upper bound on properties listed per plane
    pub const MAX_PROPS: usize = 64;

    /// Descriptors `0..SAFETY_NET_FDS` are closed at the end of cleanup
    pub const SAFETY_NET_FDS: i32 = 128;

    /// Exit status after signal-driven cleanup
    pub const CLEANUP_EXIT_STATUS: i32 = 1;

    /// Environment toggle for verbose diagnostics
    pub const DEBUG_ENV: &str = "ROTATE_DEBUG";
}
