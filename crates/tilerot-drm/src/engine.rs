//! The context object shared by the dispatcher and the cleanup
//! coordinator.
//!
//! Owns the injected [`Syscalls`], the configuration, the three tracking
//! tables behind one [`SpinLock`], the cleanup flag and the pre-allocated
//! cleanup report. One instance lives for the whole process.

use std::mem::size_of;
use std::os::raw::{c_ulong, c_void};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use tilerot_core::{
    kdebug, kwarn, DescriptorSet, HandleTable, Result, ShimConfig, SpinLock, Syscalls,
    TilerError, TrackedHandle,
};

use crate::report::CleanupReport;

/// The tracking tables, always accessed under the engine's lock
#[derive(Debug)]
pub(crate) struct Tables {
    pub(crate) buffers: HandleTable,
    pub(crate) framebuffers: HandleTable,
    pub(crate) descriptors: DescriptorSet,
}

impl Tables {
    fn new(capacity: usize) -> Self {
        Self {
            buffers: HandleTable::new(capacity),
            framebuffers: HandleTable::new(capacity),
            descriptors: DescriptorSet::new(capacity),
        }
    }
}

/// Point-in-time copy of the tracking tables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerSnapshot {
    pub buffers: Vec<TrackedHandle>,
    pub framebuffers: Vec<TrackedHandle>,
    pub descriptors: Vec<RawFd>,
}

/// Interception engine
pub struct Engine<S: Syscalls> {
    pub(crate) sys: S,
    pub(crate) config: ShimConfig,
    pub(crate) tables: SpinLock<Tables>,
    pub(crate) cleaning: AtomicBool,
    pub(crate) report: CleanupReport,
}

impl<S: Syscalls> Engine<S> {
    /// Create an engine over the given primitives
    pub fn new(sys: S, config: ShimConfig) -> Self {
        let capacity = config.table_capacity;
        Self {
            sys,
            tables: SpinLock::new(Tables::new(capacity)),
            cleaning: AtomicBool::new(false),
            report: CleanupReport::with_table_capacity(capacity),
            config,
        }
    }

    #[inline]
    pub fn syscalls(&self) -> &S {
        &self.sys
    }

    #[inline]
    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    /// Whether the cleanup coordinator has started
    #[inline]
    pub fn is_cleaning(&self) -> bool {
        self.cleaning.load(Ordering::Acquire)
    }

    /// Copy of everything currently tracked
    pub fn snapshot(&self) -> TrackerSnapshot {
        let tables = self.tables.lock();
        TrackerSnapshot {
            buffers: tables.buffers.iter().collect(),
            framebuffers: tables.framebuffers.iter().collect(),
            descriptors: tables.descriptors.iter().collect(),
        }
    }

    // ── Tracking ──
    //
    // Adds check the cleanup flag under the lock: once the drain has begun
    // nothing new enters the tables.

    pub(crate) fn track_buffer(&self, entry: TrackedHandle) {
        self.track(entry, "buffer", |t| &mut t.buffers);
    }

    pub(crate) fn track_framebuffer(&self, entry: TrackedHandle) {
        self.track(entry, "framebuffer", |t| &mut t.framebuffers);
    }

    fn track(&self, entry: TrackedHandle, what: &str, table: impl FnOnce(&mut Tables) -> &mut HandleTable) {
        let result = {
            let mut tables = self.tables.lock();
            if self.is_cleaning() {
                None
            } else {
                Some(table(&mut *tables).add(entry))
            }
        };
        match result {
            None => kdebug!("cleanup running, not tracking {} {}", what, entry.handle),
            Some(Err(e)) => kwarn!("no space to add {} {}: {}", what, entry.handle, e),
            Some(Ok(())) => {}
        }
    }

    pub(crate) fn untrack_buffer(&self, entry: TrackedHandle) -> bool {
        self.tables.lock().buffers.remove(entry).is_some()
    }

    pub(crate) fn untrack_framebuffer(&self, entry: TrackedHandle) -> bool {
        self.tables.lock().framebuffers.remove(entry).is_some()
    }

    pub(crate) fn track_descriptor(&self, fd: RawFd) {
        let result = {
            let mut tables = self.tables.lock();
            if self.is_cleaning() {
                return;
            }
            tables.descriptors.add_if_absent(fd)
        };
        if let Err(e) = result {
            kwarn!("no space to add exported descriptor {}: {}", fd, e);
        }
    }
}

/// Issue `request` with `arg` as its argument block
///
/// Used for the engine's own requests, never for the application's.
pub(crate) fn drm_call<S, T>(sys: &S, fd: RawFd, request: c_ulong, arg: &mut T) -> Result<()>
where
    S: Syscalls + ?Sized,
{
    debug_assert_eq!(crate::drm_sys::ioc_size(request), size_of::<T>());
    // Safety: `arg` is a live, exclusively borrowed block of the size
    // `request` encodes.
    let ret = unsafe { sys.ioctl(fd, request, arg as *mut T as *mut c_void) };
    if ret != 0 {
        return Err(TilerError::Driver { request: request as u64, errno: sys.errno() });
    }
    Ok(())
}
