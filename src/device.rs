//! Device context threaded from the registry to the factory.
//!
//! The harness opens the NVMe device node itself and hands the resulting raw
//! descriptor to the registry. The registry never reads from or writes to it;
//! the value is forwarded unchanged to every entity that needs a live device.

use std::fmt;

/// Opaque handle to the device under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceContext {
    fd: Option<i32>,
}

impl DeviceContext {
    /// Wrap a raw descriptor opened by the harness.
    ///
    /// A negative descriptor is logged and kept as-is; entities receive it
    /// unchanged.
    pub fn from_raw_fd(fd: i32) -> Self {
        let ctx = Self { fd: Some(fd) };
        if !ctx.is_valid() {
            tracing::debug!(fd, "Device context created with a bad descriptor");
        }
        ctx
    }

    /// Context for groups that only allocate device-independent entities.
    pub fn none() -> Self {
        Self { fd: None }
    }

    /// The raw descriptor, if one was supplied.
    pub fn raw_fd(&self) -> Option<i32> {
        self.fd
    }

    /// True when any descriptor was supplied, valid or not.
    pub fn is_present(&self) -> bool {
        self.fd.is_some()
    }

    /// True when a non-negative descriptor was supplied.
    pub fn is_valid(&self) -> bool {
        matches!(self.fd, Some(fd) if fd >= 0)
    }
}

impl fmt::Display for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fd {
            Some(fd) => write!(f, "fd={fd}"),
            None => write!(f, "no device"),
        }
    }
}
