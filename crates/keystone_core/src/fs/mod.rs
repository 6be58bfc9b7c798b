//! Filesystem abstraction module.
//!
//! This module provides the `FileSystem` trait for abstracting the working
//! directory a project is checked out in, so the local mirror can run against
//! the real disk or an in-memory tree in tests.
//!
//! For async operations, see the `AsyncFileSystem` trait and `SyncToAsyncFs` adapter.

mod async_fs;
mod memory;
mod native;

pub use async_fs::{AsyncFileSystem, BoxFuture, SyncToAsyncFs};
pub use memory::InMemoryFileSystem;
pub use native::RealFileSystem;

use std::io::Result;
use std::path::Path;

/// Abstraction over filesystem operations
/// Send + Sync required for multi-threaded runtimes
pub trait FileSystem: Send + Sync {
    /// Reads the file content
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Writes a file, creating parent directories and replacing any existing content
    fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Deletes a file
    fn delete_file(&self, path: &Path) -> Result<()>;

    /// Checks if a file exists
    fn exists(&self, path: &Path) -> bool;

    /// Rename `from` to `to`, replacing `to` if it exists.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
}
