use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::fs::AsyncFileSystem;
use crate::keystone::Keystone;
use crate::members::{Member, Role, SHARED_MEMBER_PREFIX};

/// Read access to one environment granted to the holder of a key pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    pub project: String,
    pub env: String,
    /// Generated member identity the copies are addressed to
    pub identity: String,
    /// Member whose hub serves the copies
    pub owner: String,
}

impl<FS: AsyncFileSystem> Keystone<FS> {
    /// Share `env` read-only with whoever holds the private half of
    /// `public_key`. Admins only.
    pub async fn share(&self, project: &str, env: &str, public_key: &str) -> Result<ShareLink> {
        self.projects().assert_environment(project, env).await?;

        let identity = format!("{SHARED_MEMBER_PREFIX}-{}", Uuid::new_v4());
        let member = Member::new(&identity).with_public_key(public_key);
        self.projects()
            .add_member(project, Some(env), member, Role::Reader)
            .await?;
        log::info!("Shared {} of {} as {}", env, project, identity);

        Ok(ShareLink {
            project: project.to_string(),
            env: env.to_string(),
            identity,
            owner: self.identity().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::testing::*;
    use crate::error::KeystoneError;
    use crate::members::Role;
    use crate::storage::{MemoryNetwork, PublicKey};

    #[tokio::test]
    async fn test_share_environment() {
        let network = MemoryNetwork::new();
        let alice = keystone(&network, "alice");
        let project = alice.init(&work_dir(), "app", false).await.unwrap();

        let link = alice.share(&project, "default", "pk-link").await.unwrap();
        assert!(link.identity.starts_with("{{shared}}-"));
        assert_eq!(link.owner, "alice");
        let members = alice.members(&project, Some("default")).await.unwrap();
        assert_eq!(members.role_of(&link.identity), Some(Role::Reader));

        // Later pushes reach the link, encrypted for its key
        edit(&alice, ".env", "A=1\n").await;
        alice.push(&work_dir(), &[".env"]).await.unwrap();
        let copy = format!("{project}/default/.env/{}.json", link.identity);
        assert_eq!(
            network.recipient_of("alice", &copy),
            Some(PublicKey("pk-link".to_string()))
        );

        assert!(matches!(
            alice.share(&project, "prod", "pk-link").await,
            Err(KeystoneError::UnknownEnvironment { .. })
        ));
    }
}
