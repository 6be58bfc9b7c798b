//! Command pattern API for unified command execution.
//!
//! Front ends (CLI, editor plugins, IPC bridges) build a [`Command`], hand it
//! to [`Keystone::execute`](crate::keystone::Keystone::execute) and render
//! the [`Response`].
//!
//! # Usage
//!
//! ```ignore
//! use keystone_core::{Command, Response};
//!
//! let cmd = Command::Pull { dir: "/work/app".into(), force: false };
//! if let Response::Pull(report) = keystone.execute(cmd).await? {
//!     println!("{} file(s) updated", report.updated.len());
//! }
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::commands::{Invitation, InviteReport, PullReport, PushReport, ShareLink};
use crate::config::ProjectConfig;
use crate::members::{Member, Members, Role};
use crate::mirror::LocalChange;
use crate::project::ProjectRecord;
use crate::reconcile::PublishReport;

// ============================================================================
// Command Types
// ============================================================================

/// All commands that can be executed against a Keystone instance.
///
/// Commands are serializable for cross-runtime usage (IPC, scripting).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Command {
    // === Working directory ===
    /// Check a directory out on a new or joined project.
    Init {
        dir: PathBuf,
        /// Plain name to create, `<name>/<uuid>` to join
        project: String,
        #[serde(default)]
        overwrite: bool,
    },

    /// Push files; with none, every modified or deleted tracked file.
    Push {
        dir: PathBuf,
        #[serde(default)]
        files: Vec<String>,
    },

    Pull {
        dir: PathBuf,
        #[serde(default)]
        force: bool,
    },

    /// Remove files from the environment.
    Delete { dir: PathBuf, files: Vec<String> },

    Checkout { dir: PathBuf, env: String },

    /// Status of every tracked file.
    Status { dir: PathBuf },

    /// Discard local changes.
    Reset {
        dir: PathBuf,
        #[serde(default)]
        files: Vec<String>,
        #[serde(default)]
        confirmed: bool,
    },

    Diff { dir: PathBuf, file: String },

    // === Projects ===
    ListProjects,

    /// Record a project the caller was invited to.
    RegisterProject { project: String, created_by: String },

    CreateEnvironment { project: String, env: String },

    RemoveEnvironment { project: String, env: String },

    DeleteProject { project: String },

    // === Members ===
    GetMembers {
        project: String,
        #[serde(default)]
        env: Option<String>,
    },

    AddMember {
        project: String,
        #[serde(default)]
        env: Option<String>,
        member: Member,
        role: Role,
    },

    RemoveMember {
        project: String,
        #[serde(default)]
        env: Option<String>,
        identity: String,
    },

    SetMemberRole {
        project: String,
        #[serde(default)]
        env: Option<String>,
        identity: String,
        role: Role,
    },

    Invite {
        project: String,
        emails: Vec<String>,
        role: Role,
    },

    ListInvitations,

    /// Grant read access to an environment to a key pair.
    Share {
        project: String,
        env: String,
        public_key: String,
    },
}

// ============================================================================
// Response Types
// ============================================================================

/// Responses from command execution.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum Response {
    /// Command completed successfully with no data.
    Ok,

    String(String),

    Bool(bool),

    Count(usize),

    /// File names affected by the command.
    Files(Vec<String>),

    Config(ProjectConfig),

    Changes(Vec<LocalChange>),

    Push(PushReport),

    Pull(PullReport),

    Projects(Vec<ProjectRecord>),

    Members(Members),

    Publish(PublishReport),

    Invite(InviteReport),

    Invitations(Vec<Invitation>),

    Share(ShareLink),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_wire_format() {
        let cmd: Command = serde_json::from_value(json!({
            "type": "Push",
            "params": {"dir": "/work/app", "files": [".env"]}
        }))
        .unwrap();
        match cmd {
            Command::Push { dir, files } => {
                assert_eq!(dir, PathBuf::from("/work/app"));
                assert_eq!(files, vec![".env"]);
            }
            other => panic!("Wrong command type: {other:?}"),
        }

        let cmd: Command = serde_json::from_value(json!({
            "type": "Pull",
            "params": {"dir": "/work/app"}
        }))
        .unwrap();
        assert!(matches!(cmd, Command::Pull { force: false, .. }));

        let cmd: Command = serde_json::from_value(json!({"type": "ListProjects"})).unwrap();
        assert!(matches!(cmd, Command::ListProjects));
    }

    #[test]
    fn test_member_command_roles() {
        let cmd = Command::AddMember {
            project: "app/5f0c3a1e-0000-4000-8000-000000000000".to_string(),
            env: None,
            member: Member::new("bob"),
            role: Role::Contributor,
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["params"]["role"], "contributor");
        assert_eq!(json["params"]["member"]["identity"], "bob");
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Files(vec![".env".to_string()]);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json, json!({"type": "Files", "data": [".env"]}));

        let json = serde_json::to_value(Response::Ok).unwrap();
        assert_eq!(json, json!({"type": "Ok"}));
    }
}
