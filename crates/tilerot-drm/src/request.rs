//! Request classification and argument decoding.
//!
//! The intercepted entry point receives `(fd, request, void *arg)`. Only the
//! DRM requests in [`Command`] are ever looked at; for those, the argument
//! block is turned into a typed reference by [`decode`], which checks the
//! pointer and the size encoded in the request code before any cast.

use std::mem::{align_of, size_of};
use std::os::raw::{c_ulong, c_void};

use tilerot_core::DecodeError;

use crate::drm_sys::*;

/// Recognized DRM commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    CreateDumb,
    DestroyDumb,
    AddFb,
    RmFb,
    SetCrtc,
    GetCrtc,
    ObjGetProperties,
    GetProperty,
    PrimeHandleToFd,
    GetPlaneResources,
    SetClientCap,
    Atomic,
}

impl Command {
    /// Every recognized command, in request-code order of the table below
    pub const ALL: [Command; 12] = [
        Command::CreateDumb,
        Command::DestroyDumb,
        Command::AddFb,
        Command::RmFb,
        Command::SetCrtc,
        Command::GetCrtc,
        Command::ObjGetProperties,
        Command::GetProperty,
        Command::PrimeHandleToFd,
        Command::GetPlaneResources,
        Command::SetClientCap,
        Command::Atomic,
    ];

    /// Map a request code to a command, `None` for anything unrecognized
    pub fn classify(request: c_ulong) -> Option<Command> {
        if !is_drm_request(request) {
            return None;
        }
        Command::ALL.into_iter().find(|cmd| cmd.request() == request)
    }

    /// The request code this command is issued with
    pub const fn request(self) -> c_ulong {
        match self {
            Command::CreateDumb => DRM_IOCTL_MODE_CREATE_DUMB,
            Command::DestroyDumb => DRM_IOCTL_MODE_DESTROY_DUMB,
            Command::AddFb => DRM_IOCTL_MODE_ADDFB,
            Command::RmFb => DRM_IOCTL_MODE_RMFB,
            Command::SetCrtc => DRM_IOCTL_MODE_SETCRTC,
            Command::GetCrtc => DRM_IOCTL_MODE_GETCRTC,
            Command::ObjGetProperties => DRM_IOCTL_MODE_OBJ_GETPROPERTIES,
            Command::GetProperty => DRM_IOCTL_MODE_GETPROPERTY,
            Command::PrimeHandleToFd => DRM_IOCTL_PRIME_HANDLE_TO_FD,
            Command::GetPlaneResources => DRM_IOCTL_MODE_GETPLANERESOURCES,
            Command::SetClientCap => DRM_IOCTL_SET_CLIENT_CAP,
            Command::Atomic => DRM_IOCTL_MODE_ATOMIC,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Command::CreateDumb => "create_dumb",
            Command::DestroyDumb => "destroy_dumb",
            Command::AddFb => "addfb",
            Command::RmFb => "rmfb",
            Command::SetCrtc => "setcrtc",
            Command::GetCrtc => "getcrtc",
            Command::ObjGetProperties => "obj_getproperties",
            Command::GetProperty => "getproperty",
            Command::PrimeHandleToFd => "prime_handle_to_fd",
            Command::GetPlaneResources => "getplaneresources",
            Command::SetClientCap => "set_client_cap",
            Command::Atomic => "atomic",
        }
    }
}

/// Typed view of an argument block
#[derive(Debug)]
pub enum DrmArg<'a> {
    CreateDumb(&'a mut DrmModeCreateDumb),
    DestroyDumb(&'a mut DrmModeDestroyDumb),
    AddFb(&'a mut DrmModeFbCmd),
    /// RMFB carries the bare framebuffer id
    RmFb(&'a mut u32),
    SetCrtc(&'a mut DrmModeCrtc),
    GetCrtc(&'a mut DrmModeCrtc),
    ObjGetProperties(&'a mut DrmModeObjGetProperties),
    GetProperty(&'a mut DrmModeGetProperty),
    PrimeHandleToFd(&'a mut DrmPrimeHandle),
    GetPlaneResources(&'a mut DrmModeGetPlaneRes),
    SetClientCap(&'a mut DrmSetClientCap),
    Atomic(&'a mut DrmModeAtomic),
}

/// Reinterpret `arg` as `&mut T` after checking it against `request`
///
/// # Safety
///
/// A non-null, aligned `arg` must point to `size_of::<T>()` bytes the caller
/// may read and write for `'a`, with no other live reference to them.
pub unsafe fn decode_as<'a, T>(request: c_ulong, arg: *mut c_void) -> Result<&'a mut T, DecodeError> {
    let found = ioc_size(request);
    let expected = size_of::<T>();
    if found != expected {
        return Err(DecodeError::SizeMismatch { expected, found });
    }
    if arg.is_null() {
        return Err(DecodeError::Null);
    }
    if (arg as usize) % align_of::<T>() != 0 {
        return Err(DecodeError::Misaligned);
    }
    Ok(&mut *(arg as *mut T))
}

/// Decode the argument block of a recognized command
///
/// # Safety
///
/// Same contract as [`decode_as`] for the structure `cmd` uses. The returned
/// reference must be dropped before `arg` is handed to the driver.
pub unsafe fn decode<'a>(cmd: Command, arg: *mut c_void) -> Result<DrmArg<'a>, DecodeError> {
    let request = cmd.request();
    Ok(match cmd {
        Command::CreateDumb => DrmArg::CreateDumb(decode_as(request, arg)?),
        Command::DestroyDumb => DrmArg::DestroyDumb(decode_as(request, arg)?),
        Command::AddFb => DrmArg::AddFb(decode_as(request, arg)?),
        Command::RmFb => DrmArg::RmFb(decode_as(request, arg)?),
        Command::SetCrtc => DrmArg::SetCrtc(decode_as(request, arg)?),
        Command::GetCrtc => DrmArg::GetCrtc(decode_as(request, arg)?),
        Command::ObjGetProperties => DrmArg::ObjGetProperties(decode_as(request, arg)?),
        Command::GetProperty => DrmArg::GetProperty(decode_as(request, arg)?),
        Command::PrimeHandleToFd => DrmArg::PrimeHandleToFd(decode_as(request, arg)?),
        Command::GetPlaneResources => DrmArg::GetPlaneResources(decode_as(request, arg)?),
        Command::SetClientCap => DrmArg::SetClientCap(decode_as(request, arg)?),
        Command::Atomic => DrmArg::Atomic(decode_as(request, arg)?),
    })
}
