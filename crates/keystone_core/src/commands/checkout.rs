use std::path::Path;

use crate::config::ProjectConfig;
use crate::descriptor::EnvContent;
use crate::error::Result;
use crate::fs::AsyncFileSystem;
use crate::keystone::Keystone;

impl<FS: AsyncFileSystem> Keystone<FS> {
    /// Switch `dir` to another environment of its project.
    ///
    /// Tracked files are left alone until the next pull.
    pub async fn checkout(&self, dir: &Path, env: &str) -> Result<ProjectConfig> {
        let mut config = self.checked_out(dir).await?;
        self.projects()
            .assert_environment(&config.project, env)
            .await?;
        self.settle_env(&config.project, env).await?;

        config.env = env.to_string();
        config.save_to(self.fs(), dir).await?;
        log::info!("Checked out {} in {:?}", env, dir);
        Ok(config)
    }

    /// Reconcile the members and the index of `env` so the own hub holds
    /// a current copy of both.
    pub(super) async fn settle_env(&self, project: &str, env: &str) -> Result<EnvContent> {
        let members = self.projects().members(project, Some(env)).await?;
        let (_, index) = self.projects().env(project, env, &members).await?;
        Ok(index)
    }
}
