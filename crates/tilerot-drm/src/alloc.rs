//! Tiled buffer allocation.
//!
//! A dumb-buffer request is replaced by an OMAP GEM allocation in TILER
//! memory, which the display controller can scan out rotated. The TILER
//! needs a fixed 8192-pixel width whatever the application asked for; the
//! requested height is kept. The caller gets back the new handle with the
//! pitch and size of the tiled layout.

use std::os::raw::{c_int, c_void};
use std::os::unix::io::RawFd;

use tilerot_core::{kinfo, kwarn, Syscalls, TrackedHandle};

use crate::drm_sys::{
    DrmModeCreateDumb, DrmOmapGemNew, OmapTiledSize, DRM_IOCTL_MODE_CREATE_DUMB, DRM_IOCTL_OMAP_GEM_NEW,
    OMAP_BO_SCANOUT, OMAP_BO_TILED_16, OMAP_BO_TILED_32, OMAP_BO_WC,
};
use crate::engine::Engine;
use crate::rotation::apply_rotation;

/// Geometry and flags of one tiled allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiledLayout {
    pub flags: u32,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub size: u64,
    /// False when the requested depth was not 16 or 32 bpp and the 32 bpp
    /// layout was substituted
    pub supported: bool,
}

/// Layout for a `bpp`-deep buffer of `height` rows at the fixed width
pub fn tiled_layout(bpp: u32, height: u32, fixed_width: u32) -> TiledLayout {
    let (tiling, bytes_per_pixel, supported) = match bpp {
        16 => (OMAP_BO_TILED_16, 2, true),
        32 => (OMAP_BO_TILED_32, 4, true),
        _ => (OMAP_BO_TILED_32, 4, false),
    };
    let pitch = bytes_per_pixel * fixed_width;
    TiledLayout {
        flags: tiling | OMAP_BO_WC | OMAP_BO_SCANOUT,
        width: fixed_width,
        height,
        pitch,
        size: pitch as u64 * height as u64,
        supported,
    }
}

impl<S: Syscalls> Engine<S> {
    /// Serve a dumb-buffer request with a tiled allocation
    ///
    /// Returns the allocation's status with its errno in place. On failure
    /// the caller's block is untouched and nothing is tracked or rotated.
    /// A height the tiled size field cannot hold goes to the driver as the
    /// original dumb-buffer request.
    pub(crate) fn create_tiled(&self, fd: RawFd, dumb: &mut DrmModeCreateDumb) -> c_int {
        kinfo!("intercept create_dumb {}x{}x{}", dumb.width, dumb.height, dumb.bpp);

        let layout = tiled_layout(dumb.bpp, dumb.height, self.config.fixed_width);
        if !layout.supported {
            kwarn!("unsupported bpp {}, allocating 32 bpp", dumb.bpp);
        }
        let Ok(height) = u16::try_from(layout.height) else {
            kwarn!("height {} exceeds the tiled size field, forwarding untiled", layout.height);
            // Safety: `dumb` is the caller's CREATE_DUMB block
            return unsafe {
                self.sys.ioctl(fd, DRM_IOCTL_MODE_CREATE_DUMB, dumb as *mut DrmModeCreateDumb as *mut c_void)
            };
        };

        let mut req = DrmOmapGemNew {
            size: OmapTiledSize { width: layout.width as u16, height },
            flags: layout.flags,
            ..Default::default()
        };
        // Safety: `req` is the block OMAP_GEM_NEW expects and outlives the call
        let ret = unsafe {
            self.sys.ioctl(fd, DRM_IOCTL_OMAP_GEM_NEW, &mut req as *mut DrmOmapGemNew as *mut c_void)
        };
        let errno = self.sys.errno();
        if ret != 0 {
            kwarn!("tiled allocation on {} failed: ret={} errno={}", fd, ret, errno);
            self.sys.set_errno(errno);
            return ret;
        }

        dumb.handle = req.handle;
        dumb.pitch = layout.pitch;
        dumb.size = layout.size;
        kinfo!("   created tiled buffer with handle {}", req.handle);

        self.track_buffer(TrackedHandle::new(fd, req.handle));
        if let Err(e) = apply_rotation(&self.sys, fd, &self.config) {
            kwarn!("rotation not applied on {}: {}", fd, e);
        }

        self.sys.set_errno(errno);
        ret
    }
}
