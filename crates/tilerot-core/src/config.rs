//! Shim configuration
//!
//! The only runtime input is the `ROTATE_DEBUG` toggle. The remaining
//! fields are fixed by the hardware and default to the values in
//! [`constants`](crate::constants); the setters exist so tests can shrink
//! tables and bounds.

use crate::constants::{
    DEBUG_ENV, MAX_PLANES, MAX_PROPS, SAFETY_NET_FDS, TABLE_CAPACITY, TILER_FIXED_WIDTH,
};
use crate::env::env_get_bool;
use crate::kprint::{self, LogLevel};

/// Configuration for the interception engine
#[derive(Debug, Clone)]
pub struct ShimConfig {
    /// Verbose per-request tracing
    pub debug: bool,

    /// Slots per tracking table
    pub table_capacity: usize,

    /// Width passed to the tiled allocation
    pub fixed_width: u32,

    /// Planes enumerated per allocation
    pub max_planes: usize,

    /// Properties listed per plane
    pub max_props: usize,

    /// Descriptors `0..safety_net_fds` closed at the end of cleanup
    pub safety_net_fds: i32,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            debug: false,
            table_capacity: TABLE_CAPACITY,
            fixed_width: TILER_FIXED_WIDTH,
            max_planes: MAX_PLANES,
            max_props: MAX_PROPS,
            safety_net_fds: SAFETY_NET_FDS,
        }
    }
}

impl ShimConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults plus the `ROTATE_DEBUG` toggle
    pub fn from_env() -> Self {
        Self::default().debug(env_get_bool(DEBUG_ENV, false))
    }

    /// Enable verbose tracing
    pub fn debug(mut self, enable: bool) -> Self {
        self.debug = enable;
        self
    }

    /// Set slots per tracking table
    pub fn table_capacity(mut self, n: usize) -> Self {
        self.table_capacity = n;
        self
    }

    /// Set the plane enumeration bound
    pub fn max_planes(mut self, n: usize) -> Self {
        self.max_planes = n;
        self
    }

    /// Set the per-plane property bound
    pub fn max_props(mut self, n: usize) -> Self {
        self.max_props = n;
        self
    }

    /// Set the safety-net descriptor range
    pub fn safety_net_fds(mut self, n: i32) -> Self {
        self.safety_net_fds = n;
        self
    }

    /// Log level implied by the debug toggle
    pub fn log_level(&self) -> LogLevel {
        if self.debug {
            LogLevel::Debug
        } else {
            LogLevel::Info
        }
    }

    /// Apply the log level to the global logger
    pub fn apply_logging(&self) {
        kprint::set_log_level(self.log_level());
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.table_capacity == 0 {
            return Err("table_capacity must be at least 1");
        }
        if self.fixed_width == 0 || self.fixed_width > u16::MAX as u32 {
            return Err("fixed_width must fit the 16-bit tiled size field");
        }
        if self.max_planes == 0 {
            return Err("max_planes must be at least 1");
        }
        if self.max_props == 0 {
            return Err("max_props must be at least 1");
        }
        if self.safety_net_fds < 0 {
            return Err("safety_net_fds must not be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let cfg = ShimConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(!cfg.debug);
        assert_eq!(cfg.fixed_width, 8192);
        assert_eq!(cfg.table_capacity, 32);
        assert_eq!(cfg.log_level(), LogLevel::Info);
    }

    #[test]
    fn test_builder() {
        let cfg = ShimConfig::new().debug(true).table_capacity(2).max_planes(4);
        assert!(cfg.debug);
        assert_eq!(cfg.table_capacity, 2);
        assert_eq!(cfg.max_planes, 4);
        assert_eq!(cfg.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        assert!(ShimConfig::new().table_capacity(0).validate().is_err());
        assert!(ShimConfig::new().max_props(0).validate().is_err());
        assert!(ShimConfig::new().safety_net_fds(-1).validate().is_err());
    }

    #[test]
    fn test_from_env() {
        std::env::set_var(DEBUG_ENV, "1");
        assert!(ShimConfig::from_env().debug);
        std::env::set_var(DEBUG_ENV, "not-a-flag");
        assert!(!ShimConfig::from_env().debug);
        std::env::remove_var(DEBUG_ENV);
        assert!(!ShimConfig::from_env().debug);
    }
}
