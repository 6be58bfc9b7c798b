use std::path::Path;

use crate::error::Result;
use crate::fs::AsyncFileSystem;
use crate::keystone::Keystone;
use crate::members::Role;

impl<FS: AsyncFileSystem> Keystone<FS> {
    /// Remove `files` from the environment and stop tracking them locally.
    ///
    /// Working copies are kept. Returns the files actually removed.
    pub async fn delete(&self, dir: &Path, files: &[&str]) -> Result<Vec<String>> {
        let config = self.checked_out(dir).await?;
        let (project, env) = (config.project.as_str(), config.env.as_str());

        let members = self.projects().members(project, Some(env)).await?;
        members.assert_has_role(self.identity(), &Role::WRITERS)?;
        let removed = self
            .projects()
            .remove_file_from_environment(project, env, files, &members)
            .await?;

        let mirror = self.mirror(dir);
        for file in &removed {
            mirror.forget(file).await?;
        }
        log::info!("Deleted {} file(s) from {}", removed.len(), env);
        Ok(removed)
    }
}
