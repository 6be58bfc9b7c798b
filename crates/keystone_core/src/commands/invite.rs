use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fs::AsyncFileSystem;
use crate::keystone::Keystone;
use crate::members::Role;
use crate::project::split_project_name;

/// Invitations issued by the caller, kept in their own hub.
pub const INVITATIONS_STORE: &str = "invitations.json";

/// A pending invitation to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub email: String,
    pub role: Role,
    pub project: String,
    pub invited_by: String,
}

/// Result of [`Keystone::invite`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteReport {
    pub invited: Vec<String>,
    pub already_invited: Vec<String>,
    /// Addresses that do not look like emails
    pub invalid: Vec<String>,
}

fn looks_like_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !address.chars().any(char::is_whitespace)
}

impl<FS: AsyncFileSystem> Keystone<FS> {
    /// Invite `emails` to `project` under `role`. Admins only.
    pub async fn invite(&self, project: &str, emails: &[&str], role: Role) -> Result<InviteReport> {
        split_project_name(project)?;
        let members = self.members(project, None).await?;
        members.assert_has_role(self.identity(), &[Role::Admin])?;

        let mut invitations = self.invitations().await?;
        let mut report = InviteReport::default();
        for email in emails {
            let email = email.trim();
            if !looks_like_email(email) {
                report.invalid.push(email.to_string());
            } else if invitations
                .iter()
                .any(|i| i.project == project && i.email.eq_ignore_ascii_case(email))
            {
                report.already_invited.push(email.to_string());
            } else {
                invitations.push(Invitation {
                    email: email.to_string(),
                    role,
                    project: project.to_string(),
                    invited_by: self.identity().to_string(),
                });
                report.invited.push(email.to_string());
            }
        }

        if !report.invited.is_empty() {
            self.session()
                .write_own_json(INVITATIONS_STORE, &invitations)
                .await?;
            log::info!("Invited {} to {}", report.invited.join(", "), project);
        }
        Ok(report)
    }

    /// Invitations issued by the caller.
    pub async fn invitations(&self) -> Result<Vec<Invitation>> {
        Ok(self
            .session()
            .read_own_json(INVITATIONS_STORE)
            .await?
            .unwrap_or_default())
    }
}
