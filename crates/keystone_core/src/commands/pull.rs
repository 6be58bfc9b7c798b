use std::path::Path;

use serde::Serialize;

use crate::descriptor::compute_content_hash;
use crate::descriptor::patch::render;
use crate::error::{KeystoneError, Result};
use crate::fs::AsyncFileSystem;
use crate::keystone::Keystone;
use crate::members::Role;
use crate::merge::merge_lines_marked;
use crate::mirror::ChangeStatus;
use crate::path::check_file_name;

/// Result of a pull.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    /// Version of the environment's index after reconciliation
    pub env_version: u64,
    /// Files written from the latest version
    pub updated: Vec<String>,
    /// Locally modified files merged cleanly with the latest version
    pub merged: Vec<String>,
    /// Locally modified files left with conflict markers
    pub conflicted: Vec<String>,
    /// Files no longer indexed, dropped from the working directory
    pub removed: Vec<String>,
    /// Files whose index checksum was corrected
    pub corrected: Vec<String>,
    /// Indexed files no member could provide
    pub missing: Vec<String>,
    /// Indexed names pointing outside the working directory, left alone
    pub rejected: Vec<String>,
}

impl<FS: AsyncFileSystem> Keystone<FS> {
    /// Bring the working directory up to date with the environment.
    ///
    /// Refuses to run over modified or deleted tracked files unless `force`
    /// is set. When forced, modified files are merged line by line with the
    /// latest version, leaving conflict markers where both sides changed,
    /// and deleted files are restored.
    pub async fn pull(&self, dir: &Path, force: bool) -> Result<PullReport> {
        let config = self.checked_out(dir).await?;
        let (project, env) = (config.project.as_str(), config.env.as_str());
        let mirror = self.mirror(dir);

        let changes = mirror.changed_files().await?;
        if !changes.is_empty() && !force {
            return Err(KeystoneError::PullWhileFilesModified(changes));
        }

        let projects = self.projects();
        let members = projects.members(project, Some(env)).await?;
        let (env_outcome, index) = projects.env(project, env, &members).await?;
        let manifest = mirror.manifest().await?;
        let hidden_folder = &self.session().config().hidden_folder;
        let mut report = PullReport {
            env_version: env_outcome.descriptor.version,
            ..Default::default()
        };
        let mut corrections = Vec::new();

        for entry in &index.files {
            let name = entry.name.as_str();
            if let Err(e) = check_file_name(name, hidden_folder) {
                log::warn!("Ignoring index entry of {}: {}", env, e);
                report.rejected.push(name.to_string());
                continue;
            }
            let outcome = match projects.read_file(project, env, name, &members).await {
                Ok(outcome) => outcome,
                Err(KeystoneError::DescriptorNotFound { path }) => {
                    log::warn!("No member holds {} ({})", name, path);
                    report.missing.push(name.to_string());
                    continue;
                }
                Err(e) => return Err(e),
            };
            let descriptor = &outcome.descriptor;
            if descriptor.checksum != entry.checksum {
                corrections.push((name, descriptor.checksum.clone()));
            }
            let remote = match descriptor.text() {
                Some(text) => text.to_string(),
                None => render(&descriptor.content).0,
            };

            let status = changes
                .iter()
                .find(|change| change.path == name)
                .map(|change| change.status);
            match status {
                Some(ChangeStatus::Modified) => {
                    let base = mirror.read_cached(name).await?.unwrap_or_default();
                    if base == remote {
                        continue;
                    }
                    let local = mirror.read_working(name).await?.unwrap_or_default();
                    let merged = merge_lines_marked(
                        &base,
                        &local,
                        &remote,
                        "local",
                        &format!("{} (v{})", descriptor.author, descriptor.version),
                    );
                    mirror.write_working(name, &merged.text).await?;
                    mirror.record(name, &remote, descriptor.version).await?;
                    if merged.conflicts > 0 {
                        log::warn!("{} has {} conflicting region(s)", name, merged.conflicts);
                        report.conflicted.push(name.to_string());
                    } else {
                        report.merged.push(name.to_string());
                    }
                }
                Some(ChangeStatus::Deleted) => {
                    mirror.write_synced(name, &remote, descriptor.version).await?;
                    report.updated.push(name.to_string());
                }
                _ => {
                    let hash = compute_content_hash(remote.as_bytes());
                    let current = manifest.get_file(name).is_some_and(|tracked| {
                        tracked.version == descriptor.version && tracked.content_hash == hash
                    });
                    if !current {
                        mirror.write_synced(name, &remote, descriptor.version).await?;
                        report.updated.push(name.to_string());
                    }
                }
            }
        }

        if !corrections.is_empty() {
            if members.has_role(self.identity(), &Role::WRITERS) {
                for (name, checksum) in corrections {
                    projects
                        .add_file_to_environment(project, env, name, &checksum, &members)
                        .await?;
                    report.corrected.push(name.to_string());
                }
            } else {
                log::debug!("Leaving {} stale index entries to writers", corrections.len());
            }
        }

        for path in manifest.files.keys() {
            if index.file(path).is_some() {
                continue;
            }
            let modified = changes
                .iter()
                .any(|c| &c.path == path && c.status == ChangeStatus::Modified);
            if modified {
                mirror.forget(path).await?;
            } else {
                mirror.drop_file(path).await?;
            }
            report.removed.push(path.clone());
        }

        log::info!(
            "Pulled {} v{}: {} updated, {} merged, {} conflicted, {} removed",
            env,
            report.env_version,
            report.updated.len(),
            report.merged.len(),
            report.conflicted.len(),
            report.removed.len()
        );
        Ok(report)
    }
}
