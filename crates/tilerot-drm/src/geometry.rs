//! Display geometry swap.
//!
//! With the planes scanned out at 270°, the CRTC must be programmed with
//! the panel's native (landscape) resolution while the application keeps
//! seeing its logical (portrait) one. Swapping `hdisplay`/`vdisplay` on the
//! way in (SETCRTC) and on the way out (GETCRTC) does both.

use crate::drm_sys::DrmModeModeinfo;

/// Exchange horizontal and vertical display resolution.
///
/// Sync, total and clock fields stay as they are.
#[inline]
pub fn swap_axes(mode: &mut DrmModeModeinfo) {
    core::mem::swap(&mut mode.hdisplay, &mut mode.vdisplay);
}
