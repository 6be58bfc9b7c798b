//! Storage keys for descriptors.
//!
//! Every descriptor lives at a path derived from its type, project,
//! environment, file name and the identity of the member the copy is meant
//! for. The last path segment is always `<identity>.json`, so the copy meant
//! for another member is a sibling path.
//!
//! ```text
//! project  -> <project>/<owner>.json
//! env      -> <project>/<env>/<owner>.json
//! file     -> <project>/<env>/<filename>/<owner>.json
//! members  -> <project>-members/<owner>.json
//!             <project>/<env>-members/<owner>.json
//! ```

use std::fmt;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::config::CONFIG_FILE_NAME;
use crate::error::{KeystoneError, Result};

/// The kind of document a descriptor wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorType {
    /// Project descriptor (environment list)
    Project,
    /// Environment descriptor (file index)
    Env,
    /// Role-partitioned member list of a project or an environment
    Members,
    /// A tracked file
    File,
}

impl DescriptorType {
    /// Whether a write that does not change the content is tolerated.
    ///
    /// Project and env descriptors are rewritten as a side effect of unrelated
    /// operations, so an unchanged write is not an error for them.
    pub fn tolerates_noop_write(self) -> bool {
        matches!(self, DescriptorType::Project | DescriptorType::Env)
    }

    /// Whether the content is made of keyed lists that can be merged structurally.
    pub fn is_list_shaped(self) -> bool {
        matches!(self, DescriptorType::Env | DescriptorType::Members)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DescriptorType::Project => "project",
            DescriptorType::Env => "env",
            DescriptorType::Members => "members",
            DescriptorType::File => "file",
        }
    }
}

impl fmt::Display for DescriptorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of the path resolver.
#[derive(Debug, Clone, Copy)]
pub struct PathRequest<'a> {
    pub kind: DescriptorType,
    pub project: &'a str,
    pub env: Option<&'a str>,
    pub filename: Option<&'a str>,
    pub owner: &'a str,
}

impl<'a> PathRequest<'a> {
    pub fn project(project: &'a str, owner: &'a str) -> Self {
        Self {
            kind: DescriptorType::Project,
            project,
            env: None,
            filename: None,
            owner,
        }
    }

    pub fn env(project: &'a str, env: &'a str, owner: &'a str) -> Self {
        Self {
            kind: DescriptorType::Env,
            project,
            env: Some(env),
            filename: None,
            owner,
        }
    }

    pub fn members(project: &'a str, env: Option<&'a str>, owner: &'a str) -> Self {
        Self {
            kind: DescriptorType::Members,
            project,
            env,
            filename: None,
            owner,
        }
    }

    pub fn file(project: &'a str, env: &'a str, filename: &'a str, owner: &'a str) -> Self {
        Self {
            kind: DescriptorType::File,
            project,
            env: Some(env),
            filename: Some(filename),
            owner,
        }
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(KeystoneError::MissingParameter(name)),
    }
}

/// Derive the storage key of a descriptor copy.
pub fn resolve(request: PathRequest<'_>) -> Result<String> {
    let project = required(Some(request.project), "project")?;
    let owner = required(Some(request.owner), "owner")?;

    let path = match request.kind {
        DescriptorType::Project => format!("{project}/{owner}.json"),
        DescriptorType::Env => {
            let env = required(request.env, "env")?;
            format!("{project}/{env}/{owner}.json")
        }
        DescriptorType::File => {
            let env = required(request.env, "env")?;
            let filename = required(request.filename, "filename")?;
            format!("{project}/{env}/{filename}/{owner}.json")
        }
        DescriptorType::Members => match request.env.filter(|e| !e.is_empty()) {
            Some(env) => format!("{project}/{env}-members/{owner}.json"),
            None => format!("{project}-members/{owner}.json"),
        },
    };

    Ok(path)
}

/// Check that a tracked file name stays inside a working directory.
///
/// Names are relative paths made of plain components. They may not point
/// into the hidden folder nor at the project config file.
pub fn check_file_name(name: &str, hidden_folder: &str) -> Result<()> {
    let invalid = || KeystoneError::InvalidFileName(name.to_string());
    if name.is_empty() || name.contains('\\') {
        return Err(invalid());
    }
    let mut components = Path::new(name).components();
    let first = match components.next() {
        Some(Component::Normal(first)) => first,
        _ => return Err(invalid()),
    };
    if first == hidden_folder || first == CONFIG_FILE_NAME {
        return Err(invalid());
    }
    if components.any(|c| !matches!(c, Component::Normal(_))) {
        return Err(invalid());
    }
    Ok(())
}

/// Replace the owner segment of a path, yielding the copy meant for `owner`.
pub fn with_owner(path: &str, owner: &str) -> String {
    match path.rfind('/') {
        Some(idx) => format!("{}/{owner}.json", &path[..idx]),
        None => format!("{owner}.json"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_layout() {
        assert_eq!(
            resolve(PathRequest::project("app/123", "alice")).unwrap(),
            "app/123/alice.json"
        );
        assert_eq!(
            resolve(PathRequest::env("app/123", "default", "alice")).unwrap(),
            "app/123/default/alice.json"
        );
        assert_eq!(
            resolve(PathRequest::file("app/123", "default", ".env", "alice")).unwrap(),
            "app/123/default/.env/alice.json"
        );
        assert_eq!(
            resolve(PathRequest::members("app/123", None, "alice")).unwrap(),
            "app/123-members/alice.json"
        );
        assert_eq!(
            resolve(PathRequest::members("app/123", Some("prod"), "alice")).unwrap(),
            "app/123/prod-members/alice.json"
        );
    }

    #[test]
    fn test_check_file_name() {
        for name in [".env", "config/app.yml", "a/./b", "secrets/.keystone"] {
            assert!(check_file_name(name, ".keystone").is_ok(), "{name}");
        }
        for name in [
            "",
            "../escape.txt",
            "config/../../escape.txt",
            "/etc/passwd",
            "./.env",
            ".keystone/cache/.env",
            ".ksconfig",
            "..\\escape.txt",
        ] {
            assert!(
                matches!(
                    check_file_name(name, ".keystone"),
                    Err(KeystoneError::InvalidFileName(_))
                ),
                "{name}"
            );
        }
    }

    #[test]
    fn test_missing_parameters() {
        let err = resolve(PathRequest::project("", "alice")).unwrap_err();
        assert!(matches!(err, KeystoneError::MissingParameter("project")));

        let mut request = PathRequest::env("app/123", "default", "alice");
        request.env = None;
        assert!(matches!(
            resolve(request).unwrap_err(),
            KeystoneError::MissingParameter("env")
        ));

        let mut request = PathRequest::file("app/123", "default", "x", "alice");
        request.filename = None;
        assert!(matches!(
            resolve(request).unwrap_err(),
            KeystoneError::MissingParameter("filename")
        ));
    }

    #[test]
    fn test_owner_swap_yields_sibling() {
        let mine = resolve(PathRequest::file("app/123", "default", "config/.env", "alice")).unwrap();
        let theirs = with_owner(&mine, "bob");
        assert_eq!(theirs, "app/123/default/config/.env/bob.json");
        assert_eq!(
            theirs,
            resolve(PathRequest::file("app/123", "default", "config/.env", "bob")).unwrap()
        );
    }
}
