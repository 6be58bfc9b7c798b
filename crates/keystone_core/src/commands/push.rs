use std::io;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::descriptor::checksum;
use crate::error::{KeystoneError, Result};
use crate::fs::AsyncFileSystem;
use crate::keystone::Keystone;
use crate::members::Role;
use crate::mirror::ChangeStatus;
use crate::reconcile::{PublishReport, ReconcileAction};

/// A file written by [`Keystone::push`].
#[derive(Debug, Clone, Serialize)]
pub struct FilePush {
    pub file: String,
    pub version: u64,
    pub action: ReconcileAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishReport>,
}

/// Result of a push.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PushReport {
    pub pushed: Vec<FilePush>,
    /// Files whose content already matches the environment's index
    pub unchanged: Vec<String>,
    /// Files removed from the environment
    pub deleted: Vec<String>,
}

impl<FS: AsyncFileSystem> Keystone<FS> {
    /// Publish the working copies of `files` to the environment's members.
    ///
    /// Fails with [`KeystoneError::PullBeforeYouPush`] when another member
    /// holds a newer environment or a newer version of one of the files.
    pub async fn push(&self, dir: &Path, files: &[&str]) -> Result<PushReport> {
        let config = self.checked_out(dir).await?;
        let (project, env) = (config.project.as_str(), config.env.as_str());
        let projects = self.projects();

        let members = projects.members(project, Some(env)).await?;
        members.assert_has_role(self.identity(), &Role::WRITERS)?;
        let index = projects
            .current_env(project, env, &members)
            .await?
            .env_content()?;

        let mirror = self.mirror(dir);
        let mut report = PushReport::default();
        for file in files {
            let path = mirror.working_path(file)?;
            let text = mirror
                .read_working(file)
                .await?
                .ok_or_else(|| KeystoneError::FileRead {
                    path,
                    source: io::Error::from(io::ErrorKind::NotFound),
                })?;
            let content = Value::String(text.clone());
            let sum = checksum(&content);
            if index.file(file).is_some_and(|entry| entry.checksum == sum) {
                log::debug!("{} is unchanged", file);
                report.unchanged.push(file.to_string());
                continue;
            }

            let outcome = projects
                .write_file(project, env, file, content, &members)
                .await?;
            mirror
                .record(file, &text, outcome.descriptor.version)
                .await?;
            projects
                .add_file_to_environment(project, env, file, &outcome.descriptor.checksum, &members)
                .await?;
            log::info!("Pushed {} (v{})", file, outcome.descriptor.version);
            report.pushed.push(FilePush {
                file: file.to_string(),
                version: outcome.descriptor.version,
                action: outcome.action,
                publish: outcome.publish,
            });
        }
        Ok(report)
    }

    /// Push every modified tracked file and delete every removed one.
    pub async fn push_modified(&self, dir: &Path) -> Result<PushReport> {
        let changes = self.mirror(dir).changed_files().await?;
        let modified: Vec<&str> = changes
            .iter()
            .filter(|c| c.status == ChangeStatus::Modified)
            .map(|c| c.path.as_str())
            .collect();
        let deleted: Vec<&str> = changes
            .iter()
            .filter(|c| c.status == ChangeStatus::Deleted)
            .map(|c| c.path.as_str())
            .collect();

        let mut report = if modified.is_empty() {
            PushReport::default()
        } else {
            self.push(dir, &modified).await?
        };
        if !deleted.is_empty() {
            report.deleted = self.delete(dir, &deleted).await?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::commands::testing::*;
    use crate::error::KeystoneError;
    use crate::fs::AsyncFileSystem;
    use crate::members::Role;
    use crate::mirror::ChangeStatus;
    use crate::reconcile::ReconcileAction;
    use crate::storage::MemoryNetwork;

    #[tokio::test]
    async fn test_push_new_file() {
        let network = MemoryNetwork::new();
        let alice = keystone(&network, "alice");
        let project = alice.init(&work_dir(), "app", false).await.unwrap();

        edit(&alice, ".env", "A=1\n").await;
        let report = alice.push(&work_dir(), &[".env"]).await.unwrap();
        assert_eq!(report.pushed.len(), 1);
        assert_eq!(report.pushed[0].version, 1);
        assert_eq!(report.pushed[0].action, ReconcileAction::Created);

        let env = alice.projects().own_env(&project, "default").await.unwrap();
        let index = env.env_content().unwrap();
        assert_eq!(
            index.file(".env").unwrap().checksum,
            crate::descriptor::checksum(&json!("A=1\n"))
        );
        let status = alice.status(&work_dir()).await.unwrap();
        assert_eq!(status[0].status, ChangeStatus::Ok);

        // Same content again
        let report = alice.push(&work_dir(), &[".env"]).await.unwrap();
        assert!(report.pushed.is_empty());
        assert_eq!(report.unchanged, vec![".env"]);
    }

    #[tokio::test]
    async fn test_push_missing_file() {
        let network = MemoryNetwork::new();
        let alice = keystone(&network, "alice");
        alice.init(&work_dir(), "app", false).await.unwrap();

        assert!(matches!(
            alice.push(&work_dir(), &["nope.txt"]).await,
            Err(KeystoneError::FileRead { .. })
        ));
    }

    #[tokio::test]
    async fn test_reader_cannot_push() {
        let network = MemoryNetwork::new();
        let alice = keystone(&network, "alice");
        let bob = keystone(&network, "bob");
        let project = alice.init(&work_dir(), "app", false).await.unwrap();
        join(&alice, &bob, &project, Role::Reader).await;

        edit(&bob, ".env", "A=1\n").await;
        assert!(matches!(
            bob.push(&work_dir(), &[".env"]).await,
            Err(KeystoneError::NeedToBeAdminOrContributor)
        ));
    }

    #[tokio::test]
    async fn test_stale_environment_must_pull() {
        let network = MemoryNetwork::new();
        let alice = keystone(&network, "alice");
        let bob = keystone(&network, "bob");
        let project = alice.init(&work_dir(), "app", false).await.unwrap();
        join(&alice, &bob, &project, Role::Contributor).await;

        edit(&alice, ".env", "A=1\n").await;
        alice.push(&work_dir(), &[".env"]).await.unwrap();

        edit(&bob, "other.txt", "x\n").await;
        assert!(matches!(
            bob.push(&work_dir(), &["other.txt"]).await,
            Err(KeystoneError::PullBeforeYouPush { .. })
        ));

        bob.pull(&work_dir(), false).await.unwrap();
        let report = bob.push(&work_dir(), &["other.txt"]).await.unwrap();
        assert_eq!(report.pushed.len(), 1);
    }

    #[tokio::test]
    async fn test_push_modified_files() {
        let network = MemoryNetwork::new();
        let alice = keystone(&network, "alice");
        let project = alice.init(&work_dir(), "app", false).await.unwrap();

        edit(&alice, ".env", "A=1\n").await;
        edit(&alice, "old.txt", "x\n").await;
        alice.push(&work_dir(), &[".env", "old.txt"]).await.unwrap();

        edit(&alice, ".env", "A=2\n").await;
        alice
            .fs()
            .delete_file(&work_dir().join("old.txt"))
            .await
            .unwrap();

        let report = alice.push_modified(&work_dir()).await.unwrap();
        assert_eq!(report.pushed.len(), 1);
        assert_eq!(report.pushed[0].version, 2);
        assert_eq!(report.deleted, vec!["old.txt"]);

        let index = alice
            .projects()
            .own_env(&project, "default")
            .await
            .unwrap()
            .env_content()
            .unwrap();
        assert!(index.file("old.txt").is_none());
        assert!(alice.status(&work_dir()).await.unwrap().iter().all(|c| !c.is_changed()));
    }
}
