use std::path::Path;

use crate::config::ProjectConfig;
use crate::error::{KeystoneError, Result};
use crate::fs::AsyncFileSystem;
use crate::keystone::Keystone;
use crate::project::{ProjectsStore, split_project_name};

impl<FS: AsyncFileSystem> Keystone<FS> {
    /// Check `dir` out on a project, on the default environment.
    ///
    /// A plain name creates a new project. A full `<name>/<uuid>` name joins
    /// a project the caller was invited to, fetching it from its creator.
    /// Returns the full project name.
    pub async fn init(&self, dir: &Path, project: &str, overwrite: bool) -> Result<String> {
        if !overwrite && ProjectConfig::exists_in(self.fs(), dir).await {
            return Err(KeystoneError::ConfigFileExists(ProjectConfig::path_in(dir)));
        }

        let env = self.session().config().default_env.clone();
        let full_name = if project.contains('/') {
            self.join_project(project, &env).await?
        } else {
            self.projects().create_project(project).await?
        };

        ProjectConfig::new(&full_name, env)
            .save_to(self.fs(), dir)
            .await?;
        log::info!("Initialized {:?} on project {}", dir, full_name);
        Ok(full_name)
    }

    async fn join_project(&self, project: &str, env: &str) -> Result<String> {
        split_project_name(project)?;
        let store = ProjectsStore::load(self.session()).await?;
        let record = store
            .find_by_uuid(project)
            .ok_or_else(|| KeystoneError::FailedToFetch {
                project: project.to_string(),
                origin: "unknown".to_string(),
            })?;

        self.projects()
            .project(&record.name)
            .await
            .map_err(|e| match e {
                KeystoneError::DescriptorNotFound { .. } => KeystoneError::FailedToFetch {
                    project: record.name.clone(),
                    origin: record.created_by.clone(),
                },
                other => other,
            })?;
        self.settle_env(&record.name, env).await?;
        log::info!("Joined {} hosted by {}", record.name, record.created_by);
        Ok(record.name.clone())
    }
}
