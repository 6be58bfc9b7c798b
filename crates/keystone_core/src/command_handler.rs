//! Command execution handler.
//!
//! This module contains the implementation of the `execute()` method for
//! `Keystone`. Each command maps onto one method and one response shape.

use crate::command::{Command, Response};
use crate::error::Result;
use crate::fs::AsyncFileSystem;
use crate::keystone::Keystone;

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

impl<FS: AsyncFileSystem> Keystone<FS> {
    /// Execute a command and return the response.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let cmd = Command::Status { dir: "/work/app".into() };
    /// if let Response::Changes(changes) = keystone.execute(cmd).await? {
    ///     for change in changes {
    ///         println!("{} {:?}", change.path, change.status);
    ///     }
    /// }
    /// ```
    pub async fn execute(&self, command: Command) -> Result<Response> {
        log::debug!("Executing {:?}", command);
        match command {
            // === Working directory ===
            Command::Init {
                dir,
                project,
                overwrite,
            } => Ok(Response::String(self.init(&dir, &project, overwrite).await?)),

            Command::Push { dir, files } => {
                let report = if files.is_empty() {
                    self.push_modified(&dir).await?
                } else {
                    self.push(&dir, &as_strs(&files)).await?
                };
                Ok(Response::Push(report))
            }

            Command::Pull { dir, force } => Ok(Response::Pull(self.pull(&dir, force).await?)),

            Command::Delete { dir, files } => Ok(Response::Files(
                self.delete(&dir, &as_strs(&files)).await?,
            )),

            Command::Checkout { dir, env } => {
                Ok(Response::Config(self.checkout(&dir, &env).await?))
            }

            Command::Status { dir } => Ok(Response::Changes(self.status(&dir).await?)),

            Command::Reset {
                dir,
                files,
                confirmed,
            } => Ok(Response::Files(
                self.reset(&dir, &as_strs(&files), confirmed).await?,
            )),

            Command::Diff { dir, file } => Ok(Response::String(self.diff(&dir, &file).await?)),

            // === Projects ===
            Command::ListProjects => Ok(Response::Projects(self.list_projects().await?)),

            Command::RegisterProject {
                project,
                created_by,
            } => Ok(Response::Bool(
                self.register_project(&project, &created_by).await?,
            )),

            Command::CreateEnvironment { project, env } => {
                self.create_environment(&project, &env).await?;
                Ok(Response::Ok)
            }

            Command::RemoveEnvironment { project, env } => Ok(Response::Publish(
                self.remove_environment(&project, &env).await?,
            )),

            Command::DeleteProject { project } => {
                Ok(Response::Count(self.delete_project(&project).await?))
            }

            // === Members ===
            Command::GetMembers { project, env } => Ok(Response::Members(
                self.members(&project, env.as_deref()).await?,
            )),

            Command::AddMember {
                project,
                env,
                member,
                role,
            } => Ok(Response::Members(
                self.add_member(&project, env.as_deref(), member, role)
                    .await?,
            )),

            Command::RemoveMember {
                project,
                env,
                identity,
            } => Ok(Response::Members(
                self.remove_member(&project, env.as_deref(), &identity)
                    .await?,
            )),

            Command::SetMemberRole {
                project,
                env,
                identity,
                role,
            } => Ok(Response::Bool(
                self.set_member_role(&project, env.as_deref(), &identity, role)
                    .await?,
            )),

            Command::Invite {
                project,
                emails,
                role,
            } => Ok(Response::Invite(
                self.invite(&project, &as_strs(&emails), role).await?,
            )),

            Command::ListInvitations => Ok(Response::Invitations(self.invitations().await?)),

            Command::Share {
                project,
                env,
                public_key,
            } => Ok(Response::Share(
                self.share(&project, &env, &public_key).await?,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::command::{Command, Response};
    use crate::commands::testing::*;
    use crate::error::KeystoneError;
    use crate::storage::MemoryNetwork;

    #[tokio::test]
    async fn test_execute_round() {
        let network = MemoryNetwork::new();
        let alice = keystone(&network, "alice");
        let dir = work_dir();

        let Response::String(project) = alice
            .execute(Command::Init {
                dir: dir.clone(),
                project: "app".to_string(),
                overwrite: false,
            })
            .await
            .unwrap()
        else {
            panic!("expected the project name");
        };
        assert!(project.starts_with("app/"));

        edit(&alice, ".env", "A=1\n").await;
        let response = alice
            .execute(Command::Push {
                dir: dir.clone(),
                files: vec![".env".to_string()],
            })
            .await
            .unwrap();
        assert!(matches!(response, Response::Push(report) if report.pushed.len() == 1));

        edit(&alice, ".env", "A=2\n").await;
        let response = alice
            .execute(Command::Push {
                dir: dir.clone(),
                files: Vec::new(),
            })
            .await
            .unwrap();
        assert!(matches!(response, Response::Push(report) if report.pushed[0].version == 2));

        let response = alice
            .execute(Command::Status { dir: dir.clone() })
            .await
            .unwrap();
        assert!(matches!(response, Response::Changes(changes) if changes.len() == 1));

        let response = alice.execute(Command::ListProjects).await.unwrap();
        assert!(matches!(response, Response::Projects(projects) if projects[0].name == project));
    }

    #[tokio::test]
    async fn test_execute_surfaces_errors() {
        let network = MemoryNetwork::new();
        let alice = keystone(&network, "alice");

        let err = alice
            .execute(Command::Pull {
                dir: PathBuf::from("/nowhere"),
                force: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, KeystoneError::ConfigNotInitialized(_)));
        assert_eq!(err.to_serializable().kind, "ConfigNotInitialized");
    }
}
