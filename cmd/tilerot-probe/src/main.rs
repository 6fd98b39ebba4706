//! tilerot probe
//!
//! Reports the planes of a DRM device and the id of each plane's rotation
//! property, using the same discovery the shim runs after every tiled
//! allocation. Nothing is committed.
//!
//! Run: ./target/release/tilerot-probe [DEVICE]   (default /dev/dri/card0)

use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::process::ExitCode;

use tilerot_core::{ShimConfig, Syscalls, TilerError};
use tilerot_drm::rotation::{enable_atomic, find_rotation_property, list_planes};
use tilerot_drm::LibcSyscalls;

const DEFAULT_DEVICE: &str = "/dev/dri/card0";

const LINE: &str = "────────────────────────────────────────────────────────────";

fn open_device(path: &str) -> Result<RawFd, String> {
    let cpath = CString::new(path).map_err(|_| format!("bad device path {:?}", path))?;
    // Safety: `cpath` is a valid NUL-terminated string
    let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR | libc::O_CLOEXEC) };
    if fd < 0 {
        let err = std::io::Error::last_os_error();
        return Err(format!("open {}: {}", path, err));
    }
    Ok(fd)
}

fn probe(sys: &LibcSyscalls, fd: RawFd, config: &ShimConfig) -> Result<(usize, usize), TilerError> {
    if let Err(e) = enable_atomic(sys, fd) {
        println!("  atomic capability refused: {}", e);
    }

    let planes = list_planes(sys, fd, config.max_planes)?;
    println!("  {} planes", planes.len());
    println!("{}", LINE);

    let mut rotatable = 0;
    for plane in &planes {
        match find_rotation_property(sys, fd, *plane, config.max_props) {
            Ok(prop) => {
                rotatable += 1;
                println!("  plane {:<6} rotation property {}", plane, prop);
            }
            Err(e) => println!("  plane {:<6} {}", plane, e),
        }
    }
    Ok((planes.len(), rotatable))
}

fn main() -> ExitCode {
    let device = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_DEVICE.to_string());
    let config = ShimConfig::from_env();
    config.apply_logging();

    println!("{}", LINE);
    println!("  tilerot probe: {}", device);
    println!("{}", LINE);

    let fd = match open_device(&device) {
        Ok(fd) => fd,
        Err(e) => {
            eprintln!("  {}", e);
            return ExitCode::from(1);
        }
    };

    let sys = LibcSyscalls;
    let result = probe(&sys, fd, &config);
    sys.close(fd);

    match result {
        Ok((planes, rotatable)) => {
            println!("{}", LINE);
            println!("  {}/{} planes rotatable", rotatable, planes);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("  plane enumeration failed: {}", e);
            ExitCode::from(1)
        }
    }
}
