use std::path::Path;

use crate::error::Result;
use crate::fs::AsyncFileSystem;
use crate::keystone::Keystone;

impl<FS: AsyncFileSystem> Keystone<FS> {
    /// Discard local changes to `files`, or to every changed file when empty.
    pub async fn reset(&self, dir: &Path, files: &[&str], confirmed: bool) -> Result<Vec<String>> {
        self.checked_out(dir).await?;
        let restored = self.mirror(dir).reset(files, confirmed).await?;
        log::info!("Reset {} file(s)", restored.len());
        Ok(restored)
    }

    /// Unified diff of the local changes to `file`.
    pub async fn diff(&self, dir: &Path, file: &str) -> Result<String> {
        self.checked_out(dir).await?;
        self.mirror(dir).diff(file).await
    }
}
