//! Request dispatcher.
//!
//! Every intercepted control request enters through [`Engine::dispatch`].
//! Anything outside the DRM family is forwarded without a look. DRM
//! requests are classified, decoded, transformed before and after the real
//! call as their command requires, and returned with the real call's status
//! and errno.

use std::os::raw::{c_int, c_ulong, c_void};
use std::os::unix::io::RawFd;

use tilerot_core::{kdebug, kinfo, kwarn, Syscalls, TrackedHandle};

use crate::drm_sys::{ioc_nr, is_drm_request, DRM_IOCTL_FRAME_NOISE};
use crate::engine::Engine;
use crate::geometry::swap_axes;
use crate::request::{decode, Command, DrmArg};

impl<S: Syscalls> Engine<S> {
    /// Handle one intercepted control request
    ///
    /// # Safety
    ///
    /// `arg` must be what the application passed for `request`: for a
    /// recognized command, either null or a block of the size the request
    /// code encodes, not aliased for the duration of the call.
    pub unsafe fn dispatch(&self, fd: RawFd, request: c_ulong, arg: *mut c_void) -> c_int {
        if !is_drm_request(request) {
            return self.sys.ioctl(fd, request, arg);
        }

        let entry_errno = self.sys.errno();
        if request != DRM_IOCTL_FRAME_NOISE {
            kdebug!("ioctl {} [{:02x}] {}", fd, ioc_nr(request), request);
        }

        let Some(cmd) = Command::classify(request) else {
            self.sys.set_errno(entry_errno);
            return self.sys.ioctl(fd, request, arg);
        };

        match decode(cmd, arg) {
            Ok(DrmArg::CreateDumb(dumb)) => {
                self.sys.set_errno(entry_errno);
                return self.create_tiled(fd, dumb);
            }
            Ok(decoded) => self.before(fd, decoded),
            Err(e) => kwarn!("{} on {}: {}, passing through", cmd.name(), fd, e),
        }

        self.sys.set_errno(entry_errno);
        let ret = self.sys.ioctl(fd, request, arg);
        let errno = self.sys.errno();

        if ret == 0 {
            if let Ok(decoded) = decode(cmd, arg) {
                self.after(fd, decoded);
            }
        }

        self.sys.set_errno(errno);
        ret
    }

    /// Work done before the request reaches the driver
    fn before(&self, fd: RawFd, arg: DrmArg<'_>) {
        match arg {
            DrmArg::DestroyDumb(req) => {
                kinfo!("destroy {} {}", fd, req.handle);
                self.untrack_buffer(TrackedHandle::new(fd, req.handle));
            }
            DrmArg::RmFb(fb_id) => {
                kinfo!("remove {} {}", fd, *fb_id);
                self.untrack_framebuffer(TrackedHandle::new(fd, *fb_id));
            }
            DrmArg::SetCrtc(crtc) => {
                kinfo!(
                    "mode_setcrtc: {}x{} {} {}",
                    crtc.mode.hdisplay,
                    crtc.mode.vdisplay,
                    crtc.mode.htotal,
                    crtc.mode.vtotal
                );
                swap_axes(&mut crtc.mode);
            }
            DrmArg::AddFb(cmd) => {
                kinfo!(
                    "addfb [{}] {}x{} {} {} {} {}",
                    cmd.fb_id,
                    cmd.width,
                    cmd.height,
                    cmd.pitch,
                    cmd.bpp,
                    cmd.depth,
                    cmd.handle
                );
            }
            _ => {}
        }
    }

    /// Work done after the driver accepted the request
    fn after(&self, fd: RawFd, arg: DrmArg<'_>) {
        match arg {
            DrmArg::GetCrtc(crtc) => {
                kinfo!(
                    "mode_getcrtc: {}x{} {} {}",
                    crtc.mode.hdisplay,
                    crtc.mode.vdisplay,
                    crtc.mode.htotal,
                    crtc.mode.vtotal
                );
                swap_axes(&mut crtc.mode);
            }
            DrmArg::AddFb(cmd) => self.track_framebuffer(TrackedHandle::new(fd, cmd.fb_id)),
            DrmArg::PrimeHandleToFd(prime) => {
                kinfo!("add handle fd {} {}", prime.handle, prime.fd);
                self.track_descriptor(prime.fd);
            }
            DrmArg::GetProperty(prop) => {
                kdebug!("get_property {}", String::from_utf8_lossy(prop.name_bytes()));
            }
            DrmArg::ObjGetProperties(req) => {
                kdebug!(
                    "mode_obj_get_property: object {} has {} properties",
                    req.obj_id,
                    req.count_props
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tilerot_core::ShimConfig;

    use crate::drm_sys::*;
    use crate::testing::{panel_mode, FakeDriver, Released};

    fn engine() -> Engine<FakeDriver> {
        Engine::new(FakeDriver::omap(), ShimConfig::new())
    }

    fn ptr<T>(arg: &mut T) -> *mut c_void {
        arg as *mut T as *mut c_void
    }

    #[test]
    fn non_drm_requests_pass_through_untouched() {
        let engine = engine();
        let mut block = [0xa5u8; 16];
        // TCGETS
        let ret = unsafe { engine.dispatch(0, 0x5401, block.as_mut_ptr() as *mut c_void) };

        assert_eq!(ret, 0);
        assert_eq!(block, [0xa5u8; 16]);
        assert_eq!(engine.syscalls().requests(), vec![0x5401]);
    }

    #[test]
    fn unrecognized_drm_request_is_forwarded() {
        let engine = engine();
        let mut block = [0u8; 28];
        let ret = unsafe { engine.dispatch(3, DRM_IOCTL_FRAME_NOISE, block.as_mut_ptr() as *mut c_void) };

        assert_eq!(ret, 0);
        assert_eq!(engine.syscalls().requests(), vec![DRM_IOCTL_FRAME_NOISE]);
    }

    #[test]
    fn failure_status_and_errno_reach_the_caller() {
        let engine = engine();
        engine.syscalls().fail(DRM_IOCTL_MODE_ADDFB, libc::ENOSPC);
        let mut cmd = DrmModeFbCmd { width: 480, height: 800, bpp: 32, depth: 24, handle: 1, ..Default::default() };

        let ret = unsafe { engine.dispatch(3, DRM_IOCTL_MODE_ADDFB, ptr(&mut cmd)) };

        assert_eq!(ret, -1);
        assert_eq!(engine.syscalls().errno(), libc::ENOSPC);
        assert!(engine.snapshot().framebuffers.is_empty());
    }

    #[test]
    fn success_keeps_callers_errno() {
        let engine = engine();
        engine.syscalls().set_errno(libc::EAGAIN);
        let mut dumb = DrmModeCreateDumb { width: 800, height: 480, bpp: 32, ..Default::default() };

        let ret = unsafe { engine.dispatch(3, DRM_IOCTL_MODE_CREATE_DUMB, ptr(&mut dumb)) };

        assert_eq!(ret, 0);
        assert_eq!(engine.syscalls().errno(), libc::EAGAIN);
    }

    #[test]
    fn setcrtc_reaches_driver_swapped() {
        let engine = engine();
        let mut crtc = DrmModeCrtc { crtc_id: 40, mode: panel_mode(), ..Default::default() };
        crtc.mode.hdisplay = 480;
        crtc.mode.vdisplay = 800;

        let ret = unsafe { engine.dispatch(3, DRM_IOCTL_MODE_SETCRTC, ptr(&mut crtc)) };

        assert_eq!(ret, 0);
        let sent = engine.syscalls().set_modes();
        assert_eq!((sent[0].hdisplay, sent[0].vdisplay), (800, 480));
        assert_eq!(sent[0].htotal, 1056);
    }

    #[test]
    fn getcrtc_reports_swapped_geometry() {
        let engine = engine();
        let mut crtc = DrmModeCrtc::default();

        let ret = unsafe { engine.dispatch(3, DRM_IOCTL_MODE_GETCRTC, ptr(&mut crtc)) };

        assert_eq!(ret, 0);
        assert_eq!((crtc.mode.hdisplay, crtc.mode.vdisplay), (480, 800));
        assert_eq!((crtc.mode.htotal, crtc.mode.vtotal), (1056, 525));
    }

    #[test]
    fn failed_getcrtc_is_not_swapped() {
        let engine = engine();
        engine.syscalls().fail(DRM_IOCTL_MODE_GETCRTC, libc::EINVAL);
        let mut crtc = DrmModeCrtc { mode: panel_mode(), ..Default::default() };

        let ret = unsafe { engine.dispatch(3, DRM_IOCTL_MODE_GETCRTC, ptr(&mut crtc)) };

        assert_eq!(ret, -1);
        assert_eq!(crtc.mode.hdisplay, 800);
    }

    #[test]
    fn allocate_then_destroy_twice() {
        let engine = engine();
        let mut dumb = DrmModeCreateDumb { width: 1920, height: 1080, bpp: 32, ..Default::default() };

        assert_eq!(unsafe { engine.dispatch(3, DRM_IOCTL_MODE_CREATE_DUMB, ptr(&mut dumb)) }, 0);
        let handle = dumb.handle;
        assert_eq!(dumb.pitch, 32768);
        assert_eq!(dumb.size, 32768 * 1080);
        assert_eq!(engine.snapshot().buffers, vec![TrackedHandle::new(3, handle)]);

        let mut destroy = DrmModeDestroyDumb { handle };
        assert_eq!(unsafe { engine.dispatch(3, DRM_IOCTL_MODE_DESTROY_DUMB, ptr(&mut destroy)) }, 0);
        assert!(engine.snapshot().buffers.is_empty());

        // Untracked: the table is unchanged and the request still goes out
        let mut again = DrmModeDestroyDumb { handle };
        assert_eq!(unsafe { engine.dispatch(3, DRM_IOCTL_MODE_DESTROY_DUMB, ptr(&mut again)) }, 0);
        assert!(engine.snapshot().buffers.is_empty());
        assert_eq!(
            engine.syscalls().released(),
            vec![Released::Buffer(3, handle), Released::Buffer(3, handle)]
        );
    }

    #[test]
    fn framebuffers_tracked_and_removed() {
        let engine = engine();
        let mut cmd = DrmModeFbCmd { width: 480, height: 800, bpp: 32, depth: 24, handle: 1, ..Default::default() };

        assert_eq!(unsafe { engine.dispatch(3, DRM_IOCTL_MODE_ADDFB, ptr(&mut cmd)) }, 0);
        assert_eq!(cmd.fb_id, 50);
        assert_eq!(engine.snapshot().framebuffers, vec![TrackedHandle::new(3, 50)]);

        let mut fb_id = cmd.fb_id;
        assert_eq!(unsafe { engine.dispatch(3, DRM_IOCTL_MODE_RMFB, ptr(&mut fb_id)) }, 0);
        assert!(engine.snapshot().framebuffers.is_empty());
    }

    #[test]
    fn framebuffer_removal_matches_channel() {
        let engine = engine();
        let mut cmd = DrmModeFbCmd::default();
        unsafe { engine.dispatch(3, DRM_IOCTL_MODE_ADDFB, ptr(&mut cmd)) };

        let mut fb_id = cmd.fb_id;
        unsafe { engine.dispatch(4, DRM_IOCTL_MODE_RMFB, ptr(&mut fb_id)) };
        assert_eq!(engine.snapshot().framebuffers, vec![TrackedHandle::new(3, cmd.fb_id)]);
    }

    #[test]
    fn exported_descriptors_tracked_once() {
        let engine = engine();
        let mut prime = DrmPrimeHandle { handle: 1, ..Default::default() };

        assert_eq!(unsafe { engine.dispatch(3, DRM_IOCTL_PRIME_HANDLE_TO_FD, ptr(&mut prime)) }, 0);
        assert_eq!(prime.fd, 40);

        engine.syscalls().reuse_export_fd();
        let mut again = DrmPrimeHandle { handle: 1, ..Default::default() };
        assert_eq!(unsafe { engine.dispatch(3, DRM_IOCTL_PRIME_HANDLE_TO_FD, ptr(&mut again)) }, 0);
        assert_eq!(again.fd, 40);

        assert_eq!(engine.snapshot().descriptors, vec![40]);
    }

    #[test]
    fn undecodable_argument_is_forwarded() {
        let engine = engine();
        let ret = unsafe { engine.dispatch(3, DRM_IOCTL_MODE_SETCRTC, std::ptr::null_mut()) };

        // The driver, not the engine, rejects the null block
        assert_eq!(ret, -1);
        assert_eq!(engine.syscalls().errno(), libc::EFAULT);
        assert_eq!(engine.syscalls().requests(), vec![DRM_IOCTL_MODE_SETCRTC]);
    }
}
