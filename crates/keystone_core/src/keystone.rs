//! Unified Keystone API (async-first).
//!
//! The `Keystone<FS>` struct ties a member's session (own hub, identity
//! service, engine configuration) to the filesystem holding their working
//! directories. Working-directory commands live in [`crate::commands`];
//! project and membership operations are reached through [`Keystone::projects`].
//!
//! # Example
//!
//! ```ignore
//! use keystone_core::keystone::Keystone;
//! use keystone_core::fs::{RealFileSystem, SyncToAsyncFs};
//!
//! let keystone = Keystone::new(SyncToAsyncFs::new(RealFileSystem), session, resolver);
//! let project = keystone.init(Path::new("/work/app"), "app", false).await?;
//! keystone.push(Path::new("/work/app"), &[".env"]).await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::config::ProjectConfig;
use crate::conflict::ConflictResolver;
use crate::error::Result;
use crate::fs::AsyncFileSystem;
use crate::members::{Member, Members, Role};
use crate::mirror::{LocalChange, Mirror};
use crate::project::{ProjectRecord, Projects, ProjectsStore};
use crate::reconcile::{PublishReport, Reconciler};
use crate::session::Session;

/// The main Keystone instance of one member.
pub struct Keystone<FS: AsyncFileSystem> {
    fs: FS,
    projects: Projects,
}

impl<FS: AsyncFileSystem> Keystone<FS> {
    /// Create a Keystone instance over `fs`, acting as the member of `session`.
    pub fn new(fs: FS, session: Arc<Session>, conflicts: Arc<dyn ConflictResolver>) -> Self {
        let reconciler = Arc::new(Reconciler::new(session, conflicts));
        Self {
            fs,
            projects: Projects::new(reconciler),
        }
    }

    /// Get a reference to the underlying filesystem.
    pub fn fs(&self) -> &FS {
        &self.fs
    }

    pub fn session(&self) -> &Session {
        self.projects.reconciler().session()
    }

    /// Identity of the calling member.
    pub fn identity(&self) -> &str {
        self.session().identity()
    }

    /// Project, environment and membership operations.
    pub fn projects(&self) -> &Projects {
        &self.projects
    }

    /// Local mirror of the working directory `dir`.
    pub fn mirror(&self, dir: &Path) -> Mirror<'_, FS> {
        Mirror::new(&self.fs, dir, &self.session().config().hidden_folder)
    }

    /// Project and environment `dir` is checked out on.
    pub async fn checked_out(&self, dir: &Path) -> Result<ProjectConfig> {
        ProjectConfig::load_from(&self.fs, dir).await
    }

    // -------------------- Projects --------------------

    /// Projects known to the caller.
    pub async fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        self.projects.list().await
    }

    /// Record a project the caller was invited to, hosted by `created_by`.
    ///
    /// Returns `false` when it was already known.
    pub async fn register_project(&self, project: &str, created_by: &str) -> Result<bool> {
        crate::project::split_project_name(project)?;
        let mut store = ProjectsStore::load(self.session()).await?;
        let added = store.register(ProjectRecord {
            name: project.to_string(),
            created_by: created_by.to_string(),
        });
        if added {
            store.save(self.session()).await?;
        }
        Ok(added)
    }

    pub async fn create_environment(&self, project: &str, env: &str) -> Result<()> {
        self.projects.create_environment(project, env).await
    }

    pub async fn remove_environment(&self, project: &str, env: &str) -> Result<PublishReport> {
        self.projects.remove_environment(project, env).await
    }

    pub async fn delete_project(&self, project: &str) -> Result<usize> {
        self.projects.delete_project(project).await
    }

    // -------------------- Members --------------------

    pub async fn members(&self, project: &str, env: Option<&str>) -> Result<Members> {
        self.projects.members(project, env).await
    }

    pub async fn add_member(
        &self,
        project: &str,
        env: Option<&str>,
        member: Member,
        role: Role,
    ) -> Result<Members> {
        self.projects.add_member(project, env, member, role).await
    }

    pub async fn remove_member(
        &self,
        project: &str,
        env: Option<&str>,
        identity: &str,
    ) -> Result<Members> {
        self.projects.remove_member(project, env, identity).await
    }

    pub async fn set_member_role(
        &self,
        project: &str,
        env: Option<&str>,
        identity: &str,
        role: Role,
    ) -> Result<bool> {
        self.projects
            .set_member_role(project, env, identity, role)
            .await
    }

    // -------------------- Working directory --------------------

    /// Status of every tracked file of `dir`.
    pub async fn status(&self, dir: &Path) -> Result<Vec<LocalChange>> {
        self.checked_out(dir).await?;
        self.mirror(dir).detect_local_changes().await
    }
}
