//! Reference backends.
//!
//! - [`MemoryFs`]: an in-memory tree whose optional capabilities can be
//!   switched on and off one by one
//! - [`DirFs`]: a host directory, read-only or writable

mod dir;
mod memory;

pub use dir::DirFs;
pub use memory::{MemoryFile, MemoryFs, MemoryFsBuilder, StreamCaps};

use crate::error::{FsError, Result};

/// Check that a path is a well-formed relative backend path.
///
/// `"."` is the root; anything empty, absolute, or climbing with `..` is
/// rejected.
pub fn validate(path: &str) -> Result<()> {
    if path.is_empty()
        || path.starts_with('/')
        || path.split('/').any(|part| part.is_empty() || part == "..")
    {
        return Err(FsError::invalid_path(path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(validate(".").is_ok());
        assert!(validate("a/b.txt").is_ok());
        assert!(validate("").is_err());
        assert!(validate("a/../b").is_err());
        assert!(validate("a/").is_err());
    }
}
