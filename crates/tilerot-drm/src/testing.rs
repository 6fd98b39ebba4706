//! Scripted DRM device for unit tests.
//!
//! Implements [`Syscalls`] over an in-memory model: planes with property
//! lists, a property-name registry, GEM and framebuffer id counters, a CRTC
//! holding one mode, and per-request failure injection. Every request is
//! recorded so tests can assert on what reached the "kernel".

use std::os::raw::{c_char, c_int, c_ulong, c_void};
use std::os::unix::io::RawFd;
use std::sync::{Mutex, MutexGuard};

use tilerot_core::{SignalHandler, Syscalls};

use crate::drm_sys::*;

/// An object the cleanup path gave back to the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    Descriptor(RawFd),
    Framebuffer(RawFd, u32),
    Buffer(RawFd, u32),
}

/// One atomic commit as the driver received it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commit {
    pub plane: u32,
    pub prop: u32,
    pub value: u64,
    pub flags: u32,
}

#[derive(Debug, Clone)]
struct FakePlane {
    id: u32,
    props: Vec<u32>,
}

#[derive(Debug)]
struct FakeState {
    planes: Vec<FakePlane>,
    properties: Vec<(u32, &'static str)>,
    failing: Vec<(c_ulong, i32)>,
    failing_planes: Vec<u32>,
    next_handle: u32,
    next_fb: u32,
    next_fd: RawFd,
    reuse_export_fd: bool,
    crtc_mode: DrmModeModeinfo,
    errno: i32,

    requests: Vec<c_ulong>,
    client_caps: Vec<(u64, u64)>,
    gem_allocs: Vec<DrmOmapGemNew>,
    commits: Vec<Commit>,
    set_modes: Vec<DrmModeModeinfo>,
    released: Vec<Released>,
    exported: Vec<RawFd>,
    closed: Vec<RawFd>,
    stderr: Vec<u8>,
    custom_handlers: Vec<c_int>,
    installed: Vec<c_int>,
}

/// In-memory DRM device
#[derive(Debug)]
pub struct FakeDriver {
    state: Mutex<FakeState>,
}

/// The 800x480 panel mode the fake CRTC reports
pub fn panel_mode() -> DrmModeModeinfo {
    DrmModeModeinfo {
        clock: 33_260,
        hdisplay: 800,
        hsync_start: 840,
        hsync_end: 968,
        htotal: 1056,
        vdisplay: 480,
        vsync_start: 490,
        vsync_end: 492,
        vtotal: 525,
        vrefresh: 60,
        ..Default::default()
    }
}

impl FakeDriver {
    /// A device with no planes
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                planes: Vec::new(),
                properties: Vec::new(),
                failing: Vec::new(),
                failing_planes: Vec::new(),
                next_handle: 1,
                next_fb: 50,
                next_fd: 40,
                reuse_export_fd: false,
                crtc_mode: panel_mode(),
                errno: 0,
                requests: Vec::new(),
                client_caps: Vec::new(),
                gem_allocs: Vec::new(),
                commits: Vec::new(),
                set_modes: Vec::new(),
                released: Vec::new(),
                exported: Vec::new(),
                closed: Vec::new(),
                stderr: Vec::new(),
                custom_handlers: Vec::new(),
                installed: Vec::new(),
            }),
        }
    }

    /// Two planes (31, 32) exposing zpos (0), rotation (5) and alpha (3)
    pub fn omap() -> Self {
        Self::new()
            .property(0, "zpos")
            .property(5, "rotation")
            .property(3, "alpha")
            .plane(31, &[0, 5, 3])
            .plane(32, &[0, 5, 3])
    }

    /// Register a property name
    pub fn property(self, id: u32, name: &'static str) -> Self {
        self.state().properties.push((id, name));
        self
    }

    /// Add a plane exposing `props`
    pub fn plane(self, id: u32, props: &[u32]) -> Self {
        self.state().planes.push(FakePlane { id, props: props.to_vec() });
        self
    }

    /// Make every `request` fail with `errno`
    pub fn fail(&self, request: c_ulong, errno: i32) {
        self.state().failing.push((request, errno));
    }

    /// Reject atomic commits touching `plane`
    pub fn fail_commit_on(&self, plane: u32) {
        self.state().failing_planes.push(plane);
    }

    /// Treat `fd` as an exported buffer descriptor
    pub fn mark_exported(&self, fd: RawFd) {
        self.state().exported.push(fd);
    }

    /// Hand out the previous descriptor again on the next PRIME exports
    pub fn reuse_export_fd(&self) {
        self.state().reuse_export_fd = true;
    }

    /// Pretend the application installed its own handler for `signum`
    pub fn set_custom_handler(&self, signum: c_int) {
        self.state().custom_handlers.push(signum);
    }

    pub fn requests(&self) -> Vec<c_ulong> {
        self.state().requests.clone()
    }

    pub fn client_caps(&self) -> Vec<(u64, u64)> {
        self.state().client_caps.clone()
    }

    pub fn gem_allocs(&self) -> Vec<DrmOmapGemNew> {
        self.state().gem_allocs.clone()
    }

    pub fn commits(&self) -> Vec<Commit> {
        self.state().commits.clone()
    }

    /// Modes programmed through SETCRTC, as the driver saw them
    pub fn set_modes(&self) -> Vec<DrmModeModeinfo> {
        self.state().set_modes.clone()
    }

    pub fn released(&self) -> Vec<Released> {
        self.state().released.clone()
    }

    pub fn closed(&self) -> Vec<RawFd> {
        self.state().closed.clone()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.state().stderr).into_owned()
    }

    pub fn installed(&self) -> Vec<c_int> {
        self.state().installed.clone()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy `src` into a user buffer at `ptr`
unsafe fn copy_out<T: Copy>(ptr: u64, src: &[T]) {
    if ptr != 0 {
        std::ptr::copy_nonoverlapping(src.as_ptr(), ptr as *mut T, src.len());
    }
}

impl FakeState {
    unsafe fn handle(&mut self, fd: RawFd, request: c_ulong, arg: *mut c_void) -> Result<(), i32> {
        if arg.is_null() {
            return Err(libc::EFAULT);
        }
        match request {
            DRM_IOCTL_SET_CLIENT_CAP => {
                let cap = &*(arg as *const DrmSetClientCap);
                self.client_caps.push((cap.capability, cap.value));
            }
            DRM_IOCTL_MODE_GETPLANERESOURCES => {
                let res = &mut *(arg as *mut DrmModeGetPlaneRes);
                let ids: Vec<u32> = self.planes.iter().map(|p| p.id).collect();
                if res.count_planes as usize >= ids.len() {
                    copy_out(res.plane_id_ptr, &ids);
                }
                res.count_planes = ids.len() as u32;
            }
            DRM_IOCTL_MODE_OBJ_GETPROPERTIES => {
                let req = &mut *(arg as *mut DrmModeObjGetProperties);
                let plane = self.planes.iter().find(|p| p.id == req.obj_id).ok_or(libc::ENOENT)?;
                let values: Vec<u64> = plane.props.iter().map(|&id| id as u64 * 10).collect();
                if req.count_props as usize >= plane.props.len() {
                    copy_out(req.props_ptr, &plane.props);
                    copy_out(req.prop_values_ptr, &values);
                }
                req.count_props = plane.props.len() as u32;
            }
            DRM_IOCTL_MODE_GETPROPERTY => {
                let prop = &mut *(arg as *mut DrmModeGetProperty);
                let (_, name) =
                    self.properties.iter().find(|(id, _)| *id == prop.prop_id).ok_or(libc::ENOENT)?;
                prop.name = [0; DRM_PROP_NAME_LEN];
                for (dst, src) in prop.name.iter_mut().zip(name.bytes()) {
                    *dst = src as c_char;
                }
            }
            DRM_IOCTL_MODE_ATOMIC => {
                let req = &*(arg as *const DrmModeAtomic);
                let plane = *(req.objs_ptr as *const u32);
                if self.failing_planes.contains(&plane) {
                    return Err(libc::EINVAL);
                }
                self.commits.push(Commit {
                    plane,
                    prop: *(req.props_ptr as *const u32),
                    value: *(req.prop_values_ptr as *const u64),
                    flags: req.flags,
                });
            }
            DRM_IOCTL_OMAP_GEM_NEW => {
                let req = &mut *(arg as *mut DrmOmapGemNew);
                req.handle = self.next_handle;
                self.next_handle += 1;
                self.gem_allocs.push(*req);
            }
            DRM_IOCTL_MODE_DESTROY_DUMB => {
                let req = &*(arg as *const DrmModeDestroyDumb);
                self.released.push(Released::Buffer(fd, req.handle));
            }
            DRM_IOCTL_MODE_ADDFB => {
                let req = &mut *(arg as *mut DrmModeFbCmd);
                req.fb_id = self.next_fb;
                self.next_fb += 1;
            }
            DRM_IOCTL_MODE_RMFB => {
                let fb_id = *(arg as *const u32);
                self.released.push(Released::Framebuffer(fd, fb_id));
            }
            DRM_IOCTL_PRIME_HANDLE_TO_FD => {
                let req = &mut *(arg as *mut DrmPrimeHandle);
                if self.reuse_export_fd && self.next_fd > 40 {
                    req.fd = self.next_fd - 1;
                } else {
                    req.fd = self.next_fd;
                    self.exported.push(self.next_fd);
                    self.next_fd += 1;
                }
            }
            DRM_IOCTL_MODE_SETCRTC => {
                let crtc = &*(arg as *const DrmModeCrtc);
                self.set_modes.push(crtc.mode);
            }
            DRM_IOCTL_MODE_GETCRTC => {
                let crtc = &mut *(arg as *mut DrmModeCrtc);
                crtc.mode = self.crtc_mode;
                crtc.mode_valid = 1;
            }
            _ => {}
        }
        Ok(())
    }
}

impl Syscalls for FakeDriver {
    unsafe fn ioctl(&self, fd: RawFd, request: c_ulong, arg: *mut c_void) -> c_int {
        let mut state = self.state();
        state.requests.push(request);
        if let Some(&(_, errno)) = state.failing.iter().find(|(r, _)| *r == request) {
            state.errno = errno;
            return -1;
        }
        match state.handle(fd, request, arg) {
            Ok(()) => 0,
            Err(errno) => {
                state.errno = errno;
                -1
            }
        }
    }

    fn errno(&self) -> i32 {
        self.state().errno
    }

    fn set_errno(&self, errno: i32) {
        self.state().errno = errno;
    }

    fn close(&self, fd: RawFd) -> c_int {
        let mut state = self.state();
        state.closed.push(fd);
        if let Some(pos) = state.exported.iter().position(|&e| e == fd) {
            state.exported.remove(pos);
            state.released.push(Released::Descriptor(fd));
        }
        0
    }

    fn write_stderr(&self, bytes: &[u8]) {
        self.state().stderr.extend_from_slice(bytes);
    }

    fn has_default_disposition(&self, signum: c_int) -> bool {
        let state = self.state();
        !state.custom_handlers.contains(&signum) && !state.installed.contains(&signum)
    }

    fn install_handler(&self, signum: c_int, _handler: SignalHandler) -> tilerot_core::Result<()> {
        self.state().installed.push(signum);
        Ok(())
    }
}
