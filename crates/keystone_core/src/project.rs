//! Projects, environments and their members.
//!
//! A project is identified by its full name `<name>/<uuid>`. It owns a
//! `project` descriptor listing its environments and a `members` descriptor.
//! Each environment owns an `env` descriptor (its file index), its own
//! `members` descriptor and one `file` descriptor per tracked file.
//!
//! The projects a member knows about are recorded in `projects.json`, a
//! private document of their own hub.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::descriptor::{Descriptor, EnvContent, ProjectContent};
use crate::error::{KeystoneError, Result};
use crate::members::{Member, Members, Role};
use crate::path::{self, DescriptorType, PathRequest};
use crate::reconcile::{
    PublishReport, ReconcileOutcome, ReconcileRequest, Reconciler, Target, fan,
};
use crate::session::Session;

/// Private document of the own hub listing known projects
pub const PROJECTS_STORE: &str = "projects.json";

/// Entry of the projects store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    /// Full project name, `<name>/<uuid>`
    pub name: String,
    /// Identity of the member whose hub is the origin of the project
    pub created_by: String,
}

/// Projects known to the calling member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectsStore {
    projects: Vec<ProjectRecord>,
}

impl ProjectsStore {
    /// Load the store from the own hub; a missing store is empty.
    pub async fn load(session: &Session) -> Result<Self> {
        Ok(session
            .read_own_json::<Self>(PROJECTS_STORE)
            .await?
            .unwrap_or_default())
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        session.write_own_json(PROJECTS_STORE, self).await
    }

    pub fn projects(&self) -> &[ProjectRecord] {
        &self.projects
    }

    /// Record a project. Returns `false` when it was already known.
    pub fn register(&mut self, record: ProjectRecord) -> bool {
        if self.projects.iter().any(|p| p.name == record.name) {
            return false;
        }
        self.projects.push(record);
        true
    }

    /// Forget a project by full name. Returns `true` when it was known.
    pub fn forget(&mut self, full_name: &str) -> bool {
        let before = self.projects.len();
        self.projects.retain(|p| p.name != full_name);
        self.projects.len() != before
    }

    /// Projects whose short name is `name`.
    pub fn find_by_name(&self, name: &str) -> Vec<&ProjectRecord> {
        let prefix = format!("{name}/");
        self.projects
            .iter()
            .filter(|p| p.name.starts_with(&prefix))
            .collect()
    }

    /// The project carrying the uuid of `full_name`, if the name is valid.
    pub fn find_by_uuid(&self, full_name: &str) -> Option<&ProjectRecord> {
        let (_, uuid) = split_project_name(full_name).ok()?;
        self.projects.iter().find(|p| {
            split_project_name(&p.name).is_ok_and(|(_, other)| other == uuid)
        })
    }
}

/// Split a full project name into its short name and uuid.
pub fn split_project_name(full_name: &str) -> Result<(&str, Uuid)> {
    let invalid = || KeystoneError::InvalidProjectName(full_name.to_string());
    let (name, uuid) = full_name.split_once('/').ok_or_else(invalid)?;
    if name.is_empty() {
        return Err(invalid());
    }
    let uuid = Uuid::parse_str(uuid).map_err(|_| invalid())?;
    if uuid.get_version_num() != 4 {
        return Err(invalid());
    }
    Ok((name, uuid))
}

/// A fresh full name for a project called `name`.
pub fn new_project_name(name: &str) -> String {
    format!("{name}/{}", Uuid::new_v4())
}

/// Project and environment operations of one member.
pub struct Projects {
    reconciler: Arc<Reconciler>,
}

impl Projects {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    fn session(&self) -> &Session {
        self.reconciler.session()
    }

    fn me(&self) -> &str {
        self.session().identity()
    }

    pub fn project_target(&self, project: &str) -> Result<Target> {
        Target::new(project, PathRequest::project(project, self.me()))
    }

    pub fn env_target(&self, project: &str, env: &str) -> Result<Target> {
        Target::new(env, PathRequest::env(project, env, self.me()))
    }

    pub fn members_target(&self, project: &str, env: Option<&str>) -> Result<Target> {
        Target::new("members", PathRequest::members(project, env, self.me()))
    }

    pub fn file_target(&self, project: &str, env: &str, file: &str) -> Result<Target> {
        Target::new(file, PathRequest::file(project, env, file, self.me()))
    }

    /// Projects known to the caller.
    pub async fn list(&self) -> Result<Vec<ProjectRecord>> {
        Ok(ProjectsStore::load(self.session()).await?.projects)
    }

    /// Latest members of a project, or of one of its environments.
    ///
    /// Without an own copy, the copy held by the project's creator is used to
    /// bootstrap the membership.
    pub async fn members(&self, project: &str, env: Option<&str>) -> Result<Members> {
        let target = self.members_target(project, env)?;
        match self.session().read_own(&target.path).await? {
            Some(own) => {
                let known: Members = own.content_as()?;
                let outcome = self
                    .reconciler
                    .reconcile(ReconcileRequest::read(target, &known))
                    .await?;
                outcome.descriptor.content_as()
            }
            None => {
                let origin = self.origin_of(project).await?;
                let bootstrap = Members::with_admin(Member::new(&origin));
                let outcome = self
                    .reconciler
                    .reconcile(ReconcileRequest::read(target.clone(), &bootstrap))
                    .await
                    .map_err(|e| match e {
                        KeystoneError::DescriptorNotFound { .. } => KeystoneError::FailedToFetch {
                            project: project.to_string(),
                            origin: origin.clone(),
                        },
                        other => other,
                    })?;
                let members: Members = outcome.descriptor.content_as()?;
                // Hand the copies to everyone now that the members are known
                self.reconciler
                    .reconcile(ReconcileRequest::read(target, &members).force_publish())
                    .await?;
                Ok(members)
            }
        }
    }

    async fn origin_of(&self, project: &str) -> Result<String> {
        let store = ProjectsStore::load(self.session()).await?;
        store
            .find_by_uuid(project)
            .map(|record| record.created_by.clone())
            .ok_or_else(|| KeystoneError::FailedToFetch {
                project: project.to_string(),
                origin: "unknown".to_string(),
            })
    }

    /// Latest project descriptor.
    pub async fn project(&self, project: &str) -> Result<(Descriptor, ProjectContent)> {
        let members = self.members(project, None).await?;
        self.project_with(project, &members).await
    }

    async fn project_with(
        &self,
        project: &str,
        members: &Members,
    ) -> Result<(Descriptor, ProjectContent)> {
        let outcome = self
            .reconciler
            .reconcile(ReconcileRequest::read(self.project_target(project)?, members))
            .await?;
        let content = outcome.descriptor.project_content()?;
        Ok((outcome.descriptor, content))
    }

    /// Latest env descriptor, reconciled across the environment's members.
    pub async fn env(
        &self,
        project: &str,
        env: &str,
        members: &Members,
    ) -> Result<(ReconcileOutcome, EnvContent)> {
        let outcome = self
            .reconciler
            .reconcile(ReconcileRequest::read(self.env_target(project, env)?, members))
            .await?;
        let content = outcome.descriptor.env_content()?;
        Ok((outcome, content))
    }

    /// The env descriptor of the own hub, without contacting other members.
    pub async fn own_env(&self, project: &str, env: &str) -> Result<Descriptor> {
        let target = self.env_target(project, env)?;
        self.session()
            .read_own(&target.path)
            .await?
            .ok_or(KeystoneError::DescriptorNotFound { path: target.path })
    }

    /// The own env descriptor, provided no other member holds a newer one.
    ///
    /// Nothing is published: a stale caller must pull first.
    pub async fn current_env(&self, project: &str, env: &str, members: &Members) -> Result<Descriptor> {
        let own = self.own_env(project, env).await?;
        let remote = fan::fan_in(
            self.session(),
            &own.path,
            &members.readable(DescriptorType::Env),
        )
        .await?;
        if remote.iter().any(|c| c.descriptor.version > own.version) {
            return Err(KeystoneError::PullBeforeYouPush { path: own.path });
        }
        Ok(own)
    }

    /// Create a project named `name` with its default environment.
    ///
    /// Returns the full project name.
    pub async fn create_project(&self, name: &str) -> Result<String> {
        let mut store = ProjectsStore::load(self.session()).await?;
        if !store.find_by_name(name).is_empty() {
            return Err(KeystoneError::ProjectNameExists(name.to_string()));
        }

        let project = new_project_name(name);
        let default_env = self.session().config().default_env.clone();
        let members = Members::with_admin(self.session().me());

        self.write_members(&project, None, &members).await?;
        let content = ProjectContent {
            name: project.clone(),
            created_by: self.me().to_string(),
            environments: vec![default_env.clone()],
        };
        self.reconciler
            .reconcile(ReconcileRequest::write(
                self.project_target(&project)?,
                &members,
                serde_json::to_value(&content)?,
            ))
            .await?;
        self.init_environment(&project, &default_env).await?;

        store.register(ProjectRecord {
            name: project.clone(),
            created_by: self.me().to_string(),
        });
        store.save(self.session()).await?;

        log::info!("Created project {}", project);
        Ok(project)
    }

    /// Add an environment to a project. Admins only.
    pub async fn create_environment(&self, project: &str, env: &str) -> Result<()> {
        let members = self.members(project, None).await?;
        members.assert_has_role(self.me(), &[Role::Admin])?;

        let (_, mut content) = self.project_with(project, &members).await?;
        if content.has_environment(env) {
            return Err(KeystoneError::EnvironmentExists {
                project: project.to_string(),
                env: env.to_string(),
            });
        }

        self.init_environment(project, env).await?;
        content.environments.push(env.to_string());
        self.reconciler
            .reconcile(ReconcileRequest::write(
                self.project_target(project)?,
                &members,
                serde_json::to_value(&content)?,
            ))
            .await?;
        log::info!("Created environment {} in {}", env, project);
        Ok(())
    }

    /// Members descriptor and empty file index of a new environment.
    async fn init_environment(&self, project: &str, env: &str) -> Result<()> {
        let members = Members::with_admin(self.session().me());
        self.write_members(project, Some(env), &members).await?;
        self.reconciler
            .reconcile(ReconcileRequest::write(
                self.env_target(project, env)?,
                &members,
                serde_json::to_value(EnvContent::new(env))?,
            ))
            .await?;
        Ok(())
    }

    /// Remove an environment and every descriptor it owns. Admins only.
    ///
    /// Deletions are best effort; failures are listed in the report.
    pub async fn remove_environment(&self, project: &str, env: &str) -> Result<PublishReport> {
        let members = self.members(project, None).await?;
        members.assert_has_role(self.me(), &[Role::Admin])?;

        let (_, mut content) = self.project_with(project, &members).await?;
        if !content.has_environment(env) {
            return Err(self.unknown_environment(project, env));
        }

        let env_members = match self.members(project, Some(env)).await {
            Ok(env_members) => env_members,
            Err(e) => {
                log::warn!("Cannot fetch members of {}/{}: {}", project, env, e);
                Members::default()
            }
        };
        let recipients = env_members.all();

        let mut report = PublishReport::default();
        match self.own_env(project, env).await.and_then(|d| d.env_content()) {
            Ok(index) => {
                for file in &index.files {
                    let target = self.file_target(project, env, &file.name)?;
                    let removed = self.reconciler.unpublish(&target.path, &recipients).await;
                    report.results.extend(removed.results);
                }
            }
            Err(e) => log::warn!("Cannot read the file index of {}/{}: {}", project, env, e),
        }
        for target in [
            self.env_target(project, env)?,
            self.members_target(project, Some(env))?,
        ] {
            let removed = self.reconciler.unpublish(&target.path, &recipients).await;
            report.results.extend(removed.results);
        }

        content.environments.retain(|e| e != env);
        self.reconciler
            .reconcile(ReconcileRequest::write(
                self.project_target(project)?,
                &members,
                serde_json::to_value(&content)?,
            ))
            .await?;

        log::info!(
            "Removed environment {} from {} ({} failed deletion(s))",
            env,
            project,
            report.failed().count()
        );
        Ok(report)
    }

    /// Fail unless `env` is one of the project's environments.
    pub async fn assert_environment(&self, project: &str, env: &str) -> Result<()> {
        let (_, content) = self.project(project).await?;
        if content.has_environment(env) {
            Ok(())
        } else {
            Err(self.unknown_environment(project, env))
        }
    }

    fn unknown_environment(&self, project: &str, env: &str) -> KeystoneError {
        KeystoneError::UnknownEnvironment {
            project: project.to_string(),
            env: env.to_string(),
        }
    }

    /// Latest version of a tracked file.
    pub async fn read_file(
        &self,
        project: &str,
        env: &str,
        file: &str,
        members: &Members,
    ) -> Result<ReconcileOutcome> {
        self.reconciler
            .reconcile(ReconcileRequest::read(
                self.file_target(project, env, file)?,
                members,
            ))
            .await
    }

    /// Write a new version of a tracked file.
    pub async fn write_file(
        &self,
        project: &str,
        env: &str,
        file: &str,
        content: Value,
        members: &Members,
    ) -> Result<ReconcileOutcome> {
        path::check_file_name(file, &self.session().config().hidden_folder)?;
        self.reconciler
            .reconcile(ReconcileRequest::write(
                self.file_target(project, env, file)?,
                members,
                content,
            ))
            .await
    }

    /// Record `file` with `checksum` in the environment's index.
    pub async fn add_file_to_environment(
        &self,
        project: &str,
        env: &str,
        file: &str,
        checksum: &str,
        members: &Members,
    ) -> Result<ReconcileOutcome> {
        path::check_file_name(file, &self.session().config().hidden_folder)?;
        let mut index = self.own_env(project, env).await?.env_content()?;
        index.upsert_file(file, checksum);
        self.reconciler
            .reconcile(ReconcileRequest::write(
                self.env_target(project, env)?,
                members,
                serde_json::to_value(&index)?,
            ))
            .await
    }

    /// Drop `files` from the environment's index and delete their
    /// descriptors for every member.
    ///
    /// Returns the names actually removed; fails with
    /// [`KeystoneError::NoFileToDelete`] when none of them was indexed.
    pub async fn remove_file_from_environment(
        &self,
        project: &str,
        env: &str,
        files: &[&str],
        members: &Members,
    ) -> Result<Vec<String>> {
        let mut index = self.own_env(project, env).await?.env_content()?;
        let removed: Vec<String> = files
            .iter()
            .filter(|name| index.remove_file(name))
            .map(|name| name.to_string())
            .collect();
        if removed.is_empty() {
            return Err(KeystoneError::NoFileToDelete);
        }

        self.reconciler
            .reconcile(ReconcileRequest::write(
                self.env_target(project, env)?,
                members,
                serde_json::to_value(&index)?,
            ))
            .await?;

        let recipients = members.all();
        for name in &removed {
            let target = self.file_target(project, env, name)?;
            let report = self.reconciler.unpublish(&target.path, &recipients).await;
            for failure in report.failed() {
                log::warn!("Copy {} was not deleted", failure.path);
            }
        }
        Ok(removed)
    }

    /// Add a member to a project or an environment. Admins only.
    ///
    /// The scope's descriptors are published again so the new member
    /// receives their copies.
    pub async fn add_member(
        &self,
        project: &str,
        env: Option<&str>,
        member: Member,
        role: Role,
    ) -> Result<Members> {
        let mut members = self.members(project, env).await?;
        members.assert_has_role(self.me(), &[Role::Admin])?;

        let identity = member.identity.clone();
        members.add(member, role)?;
        self.write_members(project, env, &members).await?;
        self.republish_scope(project, env, &members).await?;

        log::info!(
            "Added {} as {} of {}",
            identity,
            role,
            scope_name(project, env)
        );
        Ok(members)
    }

    /// Remove a member from a project or an environment. Admins only.
    ///
    /// Removing an identity that is not a member is a no-op.
    pub async fn remove_member(
        &self,
        project: &str,
        env: Option<&str>,
        identity: &str,
    ) -> Result<Members> {
        let mut members = self.members(project, env).await?;
        members.assert_has_role(self.me(), &[Role::Admin])?;

        if members.remove(identity).is_none() {
            return Ok(members);
        }
        self.warn_without_admin(project, env, &members);
        self.write_members(project, env, &members).await?;

        // Drop the copies that were meant for the removed member
        for target in self.scope_targets(project, env).await? {
            let copy = path::with_owner(&target.path, identity);
            if let Err(e) = self.session().delete_own(&copy).await {
                log::warn!("Cannot delete {}: {}", copy, e);
            }
        }

        log::info!("Removed {} from {}", identity, scope_name(project, env));
        Ok(members)
    }

    /// Move a member to another role. Admins only.
    ///
    /// Returns `false` when nothing changed.
    pub async fn set_member_role(
        &self,
        project: &str,
        env: Option<&str>,
        identity: &str,
        role: Role,
    ) -> Result<bool> {
        let mut members = self.members(project, env).await?;
        members.assert_has_role(self.me(), &[Role::Admin])?;

        if !members.set_role(identity, role) {
            return Ok(false);
        }
        self.warn_without_admin(project, env, &members);
        self.write_members(project, env, &members).await?;
        Ok(true)
    }

    /// Forget a project and delete every descriptor of it from the own hub.
    /// Admins only.
    ///
    /// Returns the number of deleted paths.
    pub async fn delete_project(&self, project: &str) -> Result<usize> {
        split_project_name(project)?;
        let members = self.members(project, None).await?;
        members.assert_has_role(self.me(), &[Role::Admin])?;

        let scoped = format!("{project}/");
        let members_scope = format!("{project}-members/");
        let paths: Vec<String> = self
            .session()
            .hub()
            .list()
            .await?
            .into_iter()
            .filter(|p| p.starts_with(&scoped) || p.starts_with(&members_scope))
            .collect();

        let mut deleted = 0;
        for path in &paths {
            match self.session().delete_own(path).await {
                Ok(()) => deleted += 1,
                Err(e) => log::warn!("Cannot delete {}: {}", path, e),
            }
        }

        let mut store = ProjectsStore::load(self.session()).await?;
        if store.forget(project) {
            store.save(self.session()).await?;
        }
        log::info!("Deleted project {} ({} path(s))", project, deleted);
        Ok(deleted)
    }

    async fn write_members(
        &self,
        project: &str,
        env: Option<&str>,
        members: &Members,
    ) -> Result<ReconcileOutcome> {
        self.reconciler
            .reconcile(ReconcileRequest::write(
                self.members_target(project, env)?,
                members,
                serde_json::to_value(members)?,
            ))
            .await
    }

    /// Descriptors whose copies follow the membership of a scope.
    async fn scope_targets(&self, project: &str, env: Option<&str>) -> Result<Vec<Target>> {
        let mut targets = vec![self.members_target(project, env)?];
        match env {
            None => targets.push(self.project_target(project)?),
            Some(env) => {
                targets.push(self.env_target(project, env)?);
                if let Ok(index) = self.own_env(project, env).await.and_then(|d| d.env_content()) {
                    for file in &index.files {
                        targets.push(self.file_target(project, env, &file.name)?);
                    }
                }
            }
        }
        Ok(targets)
    }

    async fn republish_scope(
        &self,
        project: &str,
        env: Option<&str>,
        members: &Members,
    ) -> Result<()> {
        // The members descriptor was just written with the new membership
        for target in self.scope_targets(project, env).await?.into_iter().skip(1) {
            let path = target.path.clone();
            match self
                .reconciler
                .reconcile(ReconcileRequest::read(target, members).force_publish())
                .await
            {
                Ok(_) => {}
                Err(KeystoneError::DescriptorNotFound { .. }) => {
                    log::debug!("Nothing to republish at {}", path);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn warn_without_admin(&self, project: &str, env: Option<&str>, members: &Members) {
        if !members.has_admin() {
            log::warn!("{} has no admin left", scope_name(project, env));
        }
    }
}

fn scope_name(project: &str, env: Option<&str>) -> String {
    match env {
        Some(env) => format!("{project}/{env}"),
        None => project.to_string(),
    }
}
