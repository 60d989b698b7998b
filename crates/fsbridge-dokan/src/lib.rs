//! # fsbridge Dokan adapter
//!
//! This crate exposes any [`fsbridge_core::Backend`] as a Windows volume
//! through the Dokan user-mode filesystem driver.
//!
//! ## Architecture
//!
//! The adapter is structured to keep raw pointers at the edge:
//!
//! - `ffi.rs`: `#[repr(C)]` mirrors of the Dokan2 ABI
//! - `library.rs`: runtime binding to `dokan2.dll` (Windows only)
//! - `callbacks.rs`: `extern "system"` trampolines, the only code that
//!   decodes driver arguments
//! - `dispatch.rs`: one safe handler per request
//! - `negotiate.rs`: create disposition and access mode translation
//! - `handle.rs`: the open handle table
//! - `session.rs` / `registry.rs`: per-mount state and the process-wide
//!   init/shutdown refcount
//!
//! ## Example
//!
//! ```rust,ignore
//! use fsbridge_core::{MemoryFs, MountOptions};
//! use std::sync::Arc;
//!
//! let store = MemoryFs::builder().file("LICENSE", "MIT").build();
//! let mount = fsbridge_dokan::mount("M:", Arc::new(store), MountOptions::default())?;
//! // ... the volume is live until `mount` is closed or dropped
//! mount.close()?;
//! ```

mod callbacks;
mod dispatch;
mod driver;
mod handle;
#[cfg(windows)]
mod library;
mod negotiate;
mod path;
mod registry;
mod session;
mod stub;
mod time;

#[cfg(test)]
mod testing;

/// Error types specific to mounting
pub mod error;
pub mod ffi;
pub mod status;

pub use driver::{platform_driver, InstanceHandle, MountPointInfo, NativeDriver, UnavailableDriver};
pub use error::{MountError, Result};
pub use registry::MountRegistry;
pub use session::{Mount, SessionState};
pub use status::NtStatus;

use fsbridge_core::{Backend, DriverFlags, MountOptions};
use std::sync::Arc;

/// Mount `backend` at `mount_point` through the process-wide registry.
///
/// `mount_point` may be a drive letter (`"M"`, `"M:"`, `"M:\"`) or an
/// empty NTFS directory. Blocks until the driver reports the volume live.
pub fn mount(mount_point: &str, backend: Arc<dyn Backend>, options: MountOptions) -> Result<Mount> {
    MountRegistry::global().mount(mount_point, backend, options)
}

/// Volumes the driver currently has mounted, from any process
pub fn mount_points() -> Result<Vec<MountPointInfo>> {
    MountRegistry::global().mount_points()
}

/// Set the driver flags used by later mounts in this process
pub fn set_driver_flags(flags: DriverFlags) {
    MountRegistry::global().set_driver_flags(flags)
}
