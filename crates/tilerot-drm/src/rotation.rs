//! Plane rotation through the atomic API.
//!
//! Rotation is a per-plane property that is only writable through an
//! atomic commit, so the client capability is raised first. Each plane's
//! property list is searched for the one named `rotation`; planes without
//! it are skipped. Every failure here is the engine's own and is logged,
//! never returned to the application.
//!
//! These functions take the [`Syscalls`] directly rather than an engine,
//! so `tilerot-probe` can run the same discovery against a device it opened
//! itself.

use std::os::unix::io::RawFd;

use tilerot_core::{kdebug, kinfo, kwarn, Result, ShimConfig, Syscalls, TilerError};

use crate::drm_sys::*;
use crate::engine::drm_call;

/// Name of the plane property holding the rotation bitmask
pub const ROTATION_PROPERTY: &[u8] = b"rotation";

/// Rotation committed to every plane
pub const PLANE_ROTATION: u64 = DRM_MODE_ROTATE_270;

/// Outcome of one rotation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub planes: usize,
    pub rotated: usize,
    pub skipped: usize,
}

/// Ask for atomic modesetting on `fd`
pub fn enable_atomic<S: Syscalls + ?Sized>(sys: &S, fd: RawFd) -> Result<()> {
    let mut cap = DrmSetClientCap { capability: DRM_CLIENT_CAP_ATOMIC, value: 1 };
    drm_call(sys, fd, DRM_IOCTL_SET_CLIENT_CAP, &mut cap)
}

/// Ids of the device's planes, at most `max`
pub fn list_planes<S: Syscalls + ?Sized>(sys: &S, fd: RawFd, max: usize) -> Result<Vec<u32>> {
    let mut ids = vec![0u32; max];
    let mut res = DrmModeGetPlaneRes {
        plane_id_ptr: ids.as_mut_ptr() as u64,
        count_planes: max as u32,
    };
    drm_call(sys, fd, DRM_IOCTL_MODE_GETPLANERESOURCES, &mut res)?;

    // A larger count means the kernel did not fill the buffer
    let count = res.count_planes as usize;
    if count > max {
        return Err(TilerError::ListOverflow { reported: res.count_planes, capacity: max });
    }
    ids.truncate(count);
    Ok(ids)
}

/// Property ids attached to `object`, at most `max`
fn object_properties<S: Syscalls + ?Sized>(
    sys: &S,
    fd: RawFd,
    object: u32,
    max: usize,
) -> Result<Vec<u32>> {
    let mut ids = vec![0u32; max];
    let mut values = vec![0u64; max];
    let mut req = DrmModeObjGetProperties {
        props_ptr: ids.as_mut_ptr() as u64,
        prop_values_ptr: values.as_mut_ptr() as u64,
        count_props: max as u32,
        obj_id: object,
        obj_type: DRM_MODE_OBJECT_PLANE,
    };
    drm_call(sys, fd, DRM_IOCTL_MODE_OBJ_GETPROPERTIES, &mut req)?;

    let count = req.count_props as usize;
    if count > max {
        return Err(TilerError::ListOverflow { reported: req.count_props, capacity: max });
    }
    ids.truncate(count);
    Ok(ids)
}

/// Find the rotation property of `plane`
///
/// The first property whose name is exactly `rotation` wins. Fails with
/// [`TilerError::PropertyNotFound`] if the plane has none, or with the
/// driver error if any lookup fails.
pub fn find_rotation_property<S: Syscalls + ?Sized>(
    sys: &S,
    fd: RawFd,
    plane: u32,
    max_props: usize,
) -> Result<u32> {
    for prop_id in object_properties(sys, fd, plane, max_props)? {
        // Zero counts: only the name is wanted, no value or enum buffers
        let mut prop = DrmModeGetProperty { prop_id, ..Default::default() };
        drm_call(sys, fd, DRM_IOCTL_MODE_GETPROPERTY, &mut prop)?;
        if prop.name_bytes() == ROTATION_PROPERTY {
            return Ok(prop_id);
        }
    }
    Err(TilerError::PropertyNotFound { object: plane })
}

/// Set one property on one plane with a non-blocking atomic commit
pub fn commit_rotation<S: Syscalls + ?Sized>(
    sys: &S,
    fd: RawFd,
    plane: u32,
    prop: u32,
    value: u64,
) -> Result<()> {
    let objs = [plane];
    let count_props = [1u32];
    let props = [prop];
    let values = [value];
    let mut req = DrmModeAtomic {
        flags: DRM_MODE_ATOMIC_NONBLOCK,
        count_objs: 1,
        objs_ptr: objs.as_ptr() as u64,
        count_props_ptr: count_props.as_ptr() as u64,
        props_ptr: props.as_ptr() as u64,
        prop_values_ptr: values.as_ptr() as u64,
        reserved: 0,
        user_data: 0,
    };
    drm_call(sys, fd, DRM_IOCTL_MODE_ATOMIC, &mut req)
}

/// Rotate every plane on `fd` that supports it
///
/// Per-plane failures are logged and counted as skipped. Only failing to
/// enumerate the planes at all is returned.
pub fn apply_rotation<S: Syscalls + ?Sized>(
    sys: &S,
    fd: RawFd,
    config: &ShimConfig,
) -> Result<RotationReport> {
    if let Err(e) = enable_atomic(sys, fd) {
        kwarn!("atomic capability not granted on {}: {}", fd, e);
    }

    let planes = list_planes(sys, fd, config.max_planes)?;
    kinfo!("   found {} plane resources", planes.len());

    let mut report = RotationReport { planes: planes.len(), ..Default::default() };
    for plane in planes {
        kdebug!("        setting rotation for plane {}", plane);
        let result = find_rotation_property(sys, fd, plane, config.max_props).and_then(|prop| {
            kdebug!("rotate prop for plane {}: {}", plane, prop);
            commit_rotation(sys, fd, plane, prop, PLANE_ROTATION)
        });
        match result {
            Ok(()) => report.rotated += 1,
            Err(e) => {
                kwarn!("rotate set for plane {} failed: {}", plane, e);
                report.skipped += 1;
            }
        }
    }

    kinfo!(
        "rotation: {} planes, {} rotated, {} skipped",
        report.planes,
        report.rotated,
        report.skipped
    );
    Ok(report)
}
