//! Raw bindings to the DRM/KMS and OMAP GEM uapi.
//!
//! Mirrors `drm.h`, `drm_mode.h` and `omap_drm.h`, the fixed contract
//! between the kernel driver and userspace. Only the structures and
//! request codes the engine touches are declared.

use std::mem::size_of;
use std::os::raw::{c_char, c_ulong};

use nix::sys::ioctl::{NRMASK, NRSHIFT, SIZEMASK, SIZESHIFT, TYPEMASK, TYPESHIFT};

// ── ioctl family ──

/// `DRM_IOCTL_BASE`
pub const DRM_IOCTL_BASE: u8 = b'd';

/// First driver-private command number (`DRM_COMMAND_BASE`)
pub const DRM_COMMAND_BASE: u8 = 0x40;

pub const DRM_PROP_NAME_LEN: usize = 32;
pub const DRM_DISPLAY_MODE_LEN: usize = 32;

// ── Capabilities, flags, object types ──

pub const DRM_CLIENT_CAP_ATOMIC: u64 = 3;

pub const DRM_MODE_OBJECT_PLANE: u32 = 0xeeee_eeee;

pub const DRM_MODE_ATOMIC_NONBLOCK: u32 = 0x0200;

pub const DRM_MODE_ROTATE_0: u64 = 1 << 0;
pub const DRM_MODE_ROTATE_90: u64 = 1 << 1;
pub const DRM_MODE_ROTATE_180: u64 = 1 << 2;
pub const DRM_MODE_ROTATE_270: u64 = 1 << 3;

// ── OMAP buffer-object flags ──

pub const OMAP_BO_SCANOUT: u32 = 0x0000_0001;
pub const OMAP_BO_WC: u32 = 0x0000_0002;
pub const OMAP_BO_TILED_8: u32 = 0x0000_0100;
pub const OMAP_BO_TILED_16: u32 = 0x0000_0200;
pub const OMAP_BO_TILED_32: u32 = 0x0000_0300;

const DRM_OMAP_GEM_NEW: u8 = 0x03;

// ── Structures ──

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmSetClientCap {
    pub capability: u64,
    pub value: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmPrimeHandle {
    pub handle: u32,
    pub flags: u32,
    pub fd: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrmModeModeinfo {
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub type_: u32,
    pub name: [c_char; DRM_DISPLAY_MODE_LEN],
}

impl Default for DrmModeModeinfo {
    fn default() -> Self {
        Self {
            clock: 0,
            hdisplay: 0,
            hsync_start: 0,
            hsync_end: 0,
            htotal: 0,
            hskew: 0,
            vdisplay: 0,
            vsync_start: 0,
            vsync_end: 0,
            vtotal: 0,
            vscan: 0,
            vrefresh: 0,
            flags: 0,
            type_: 0,
            name: [0; DRM_DISPLAY_MODE_LEN],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeCrtc {
    pub set_connectors_ptr: u64,
    pub count_connectors: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub x: u32,
    pub y: u32,
    pub gamma_size: u32,
    pub mode_valid: u32,
    pub mode: DrmModeModeinfo,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrmModeGetProperty {
    pub values_ptr: u64,
    pub enum_blob_ptr: u64,
    pub prop_id: u32,
    pub flags: u32,
    pub name: [c_char; DRM_PROP_NAME_LEN],
    pub count_values: u32,
    pub count_enum_blobs: u32,
}

impl Default for DrmModeGetProperty {
    fn default() -> Self {
        Self {
            values_ptr: 0,
            enum_blob_ptr: 0,
            prop_id: 0,
            flags: 0,
            name: [0; DRM_PROP_NAME_LEN],
            count_values: 0,
            count_enum_blobs: 0,
        }
    }
}

impl DrmModeGetProperty {
    /// Property name up to the first NUL
    pub fn name_bytes(&self) -> &[u8] {
        // Safety: c_char and u8 have the same size and alignment
        let bytes = unsafe { &*(self.name.as_ptr() as *const [u8; DRM_PROP_NAME_LEN]) };
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(DRM_PROP_NAME_LEN);
        &bytes[..end]
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeFbCmd {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub bpp: u32,
    pub depth: u32,
    pub handle: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeCreateDumb {
    pub height: u32,
    pub width: u32,
    pub bpp: u32,
    pub flags: u32,
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeDestroyDumb {
    pub handle: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeGetPlaneRes {
    pub plane_id_ptr: u64,
    pub count_planes: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeObjGetProperties {
    pub props_ptr: u64,
    pub prop_values_ptr: u64,
    pub count_props: u32,
    pub obj_id: u32,
    pub obj_type: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeAtomic {
    pub flags: u32,
    pub count_objs: u32,
    pub objs_ptr: u64,
    pub count_props_ptr: u64,
    pub props_ptr: u64,
    pub prop_values_ptr: u64,
    pub reserved: u64,
    pub user_data: u64,
}

/// Tiled arm of `union omap_gem_size`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OmapTiledSize {
    pub width: u16,
    pub height: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmOmapGemNew {
    pub size: OmapTiledSize,
    pub flags: u32,
    pub handle: u32,
    pub _pad: u32,
}

// ABI sizes the request codes below encode
const _: () = assert!(size_of::<DrmModeModeinfo>() == 68);
const _: () = assert!(size_of::<DrmModeCrtc>() == 104);
const _: () = assert!(size_of::<DrmModeGetProperty>() == 64);
const _: () = assert!(size_of::<DrmModeCreateDumb>() == 32);
const _: () = assert!(size_of::<DrmModeAtomic>() == 56);
const _: () = assert!(size_of::<DrmOmapGemNew>() == 16);

// ── Request codes ──

pub const DRM_IOCTL_SET_CLIENT_CAP: c_ulong =
    nix::request_code_write!(DRM_IOCTL_BASE, 0x0d, size_of::<DrmSetClientCap>()) as c_ulong;
pub const DRM_IOCTL_PRIME_HANDLE_TO_FD: c_ulong =
    nix::request_code_readwrite!(DRM_IOCTL_BASE, 0x2d, size_of::<DrmPrimeHandle>()) as c_ulong;
pub const DRM_IOCTL_MODE_GETCRTC: c_ulong =
    nix::request_code_readwrite!(DRM_IOCTL_BASE, 0xa1, size_of::<DrmModeCrtc>()) as c_ulong;
pub const DRM_IOCTL_MODE_SETCRTC: c_ulong =
    nix::request_code_readwrite!(DRM_IOCTL_BASE, 0xa2, size_of::<DrmModeCrtc>()) as c_ulong;
pub const DRM_IOCTL_MODE_GETPROPERTY: c_ulong =
    nix::request_code_readwrite!(DRM_IOCTL_BASE, 0xaa, size_of::<DrmModeGetProperty>()) as c_ulong;
pub const DRM_IOCTL_MODE_ADDFB: c_ulong =
    nix::request_code_readwrite!(DRM_IOCTL_BASE, 0xae, size_of::<DrmModeFbCmd>()) as c_ulong;
pub const DRM_IOCTL_MODE_RMFB: c_ulong =
    nix::request_code_readwrite!(DRM_IOCTL_BASE, 0xaf, size_of::<u32>()) as c_ulong;
pub const DRM_IOCTL_MODE_CREATE_DUMB: c_ulong =
    nix::request_code_readwrite!(DRM_IOCTL_BASE, 0xb2, size_of::<DrmModeCreateDumb>()) as c_ulong;
pub const DRM_IOCTL_MODE_DESTROY_DUMB: c_ulong =
    nix::request_code_readwrite!(DRM_IOCTL_BASE, 0xb4, size_of::<DrmModeDestroyDumb>()) as c_ulong;
pub const DRM_IOCTL_MODE_GETPLANERESOURCES: c_ulong =
    nix::request_code_readwrite!(DRM_IOCTL_BASE, 0xb5, size_of::<DrmModeGetPlaneRes>()) as c_ulong;
pub const DRM_IOCTL_MODE_OBJ_GETPROPERTIES: c_ulong =
    nix::request_code_readwrite!(DRM_IOCTL_BASE, 0xb9, size_of::<DrmModeObjGetProperties>())
        as c_ulong;
pub const DRM_IOCTL_MODE_ATOMIC: c_ulong =
    nix::request_code_readwrite!(DRM_IOCTL_BASE, 0xbc, size_of::<DrmModeAtomic>()) as c_ulong;
pub const DRM_IOCTL_OMAP_GEM_NEW: c_ulong = nix::request_code_readwrite!(
    DRM_IOCTL_BASE,
    DRM_COMMAND_BASE + DRM_OMAP_GEM_NEW,
    size_of::<DrmOmapGemNew>()
) as c_ulong;

/// Driver-private request the GPU userspace stack issues every frame.
/// Left out of the per-request debug trace.
pub const DRM_IOCTL_FRAME_NOISE: c_ulong = 0x401c_6440;

// ── Request-code fields ──

/// Type byte (`_IOC_TYPE`)
#[inline]
pub const fn ioc_type(request: c_ulong) -> u8 {
    ((request >> TYPESHIFT as c_ulong) & TYPEMASK as c_ulong) as u8
}

/// Command number (`_IOC_NR`)
#[inline]
pub const fn ioc_nr(request: c_ulong) -> u8 {
    ((request >> NRSHIFT as c_ulong) & NRMASK as c_ulong) as u8
}

/// Argument size (`_IOC_SIZE`)
#[inline]
pub const fn ioc_size(request: c_ulong) -> usize {
    ((request >> SIZESHIFT as c_ulong) & SIZEMASK as c_ulong) as usize
}

/// Whether `request` belongs to the DRM family
#[inline]
pub const fn is_drm_request(request: c_ulong) -> bool {
    ioc_type(request) == DRM_IOCTL_BASE
}
