//! # fsbridge Core Library
//!
//! This crate provides the platform-agnostic half of fsbridge: the capability
//! set a store implements to be mounted, the value types that cross it, the
//! error taxonomy, configuration, and two reference stores.
//!
//! ## Architecture
//!
//! - **Traits** (`backend`): Base backend trait plus optional capabilities
//! - **Types** (`types`): Metadata, directory entries, open flags
//! - **Backends** (`backends`): In-memory and host-directory stores
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust,ignore
//! use fsbridge_core::{Backend, MemoryFs};
//!
//! let store = MemoryFs::builder()
//!     .file("LICENSE", "MIT")
//!     .writable()
//!     .build();
//!
//! assert_eq!(store.stat("LICENSE")?.size, 3);
//! assert!(store.writer().is_some());
//! ```

pub mod backend;
pub mod backends;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use backend::{
    Backend, Capabilities, DirStream, DiskSpaceQuery, FileStream, MakeDir, OpenDir, OpenWriter,
    ReadAt, Remove, Rename, Resize, Truncate, VecDirStream, WriteAt,
};
pub use backends::{DirFs, MemoryFs, StreamCaps};
pub use config::{CapacityMode, Config, DriverFlags, MountOptions};
pub use error::{FsError, Result};
pub use types::{DirEntry, DiskSpace, Metadata, OpenFlags};
