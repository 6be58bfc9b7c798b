//! The calling member's view of the network.
//!
//! A [`Session`] bundles the member's own hub, the identity service, the
//! read-through cache of own-hub descriptors and the engine configuration.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::EngineConfig;
use crate::descriptor::Descriptor;
use crate::error::Result;
use crate::members::Member;
use crate::storage::{DescriptorCache, Hub, IdentityResolver, PublicKey};

pub struct Session {
    hub: Arc<dyn Hub>,
    resolver: Arc<dyn IdentityResolver>,
    cache: DescriptorCache,
    config: EngineConfig,
}

impl Session {
    pub fn new(
        hub: Arc<dyn Hub>,
        resolver: Arc<dyn IdentityResolver>,
        config: EngineConfig,
    ) -> Self {
        Self {
            hub,
            resolver,
            cache: DescriptorCache::new(),
            config,
        }
    }

    /// Identity of the calling member.
    pub fn identity(&self) -> &str {
        self.hub.identity()
    }

    /// Member record of the caller, carrying their public key.
    pub fn me(&self) -> Member {
        Member::new(self.identity()).with_public_key(self.hub.public_key().as_str())
    }

    pub fn hub(&self) -> &dyn Hub {
        self.hub.as_ref()
    }

    pub fn resolver(&self) -> &dyn IdentityResolver {
        self.resolver.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &DescriptorCache {
        &self.cache
    }

    /// Read the own copy of a descriptor, through the cache.
    pub async fn read_own(&self, path: &str) -> Result<Option<Descriptor>> {
        if let Some(descriptor) = self.cache.get(self.identity(), path) {
            return Ok(Some(descriptor));
        }
        let Some(descriptor) = self.read_own_json::<Descriptor>(path).await? else {
            return Ok(None);
        };
        self.cache.insert(self.identity(), descriptor.clone());
        Ok(Some(descriptor))
    }

    /// Write the own copy of a descriptor, encrypted for the caller.
    pub async fn write_own(&self, descriptor: &Descriptor) -> Result<()> {
        self.write_own_json(&descriptor.path, descriptor).await?;
        self.cache.insert(self.identity(), descriptor.clone());
        Ok(())
    }

    /// Write a copy of `descriptor` meant for another member.
    pub async fn write_for(&self, descriptor: &Descriptor, key: &PublicKey) -> Result<()> {
        let bytes = serde_json::to_vec(descriptor)?;
        self.hub.put(&descriptor.path, &bytes, Some(key)).await?;
        Ok(())
    }

    /// Delete a path from the own hub.
    pub async fn delete_own(&self, path: &str) -> Result<()> {
        self.hub.delete(path).await?;
        self.cache.invalidate(self.identity(), path);
        Ok(())
    }

    /// Read a private JSON document from the own hub.
    pub async fn read_own_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.hub.get(path, true).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write a private JSON document into the own hub.
    pub async fn write_own_json<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.hub
            .put(path, &bytes, Some(self.hub.public_key()))
            .await?;
        Ok(())
    }

    /// Read another member's copy from their hub.
    pub async fn read_from(&self, owner: &str, path: &str) -> Result<Option<Descriptor>> {
        if owner == self.identity() {
            return self.read_own(path).await;
        }
        let location = self.resolver.resolve_storage_location(owner).await?;
        match self.hub.get_from(&location, path, true).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Public key of a member: the one recorded with the member first, the
    /// identity service otherwise.
    pub async fn public_key_of(&self, member: &Member) -> Result<Option<PublicKey>> {
        if let Some(key) = &member.public_key {
            return Ok(Some(PublicKey(key.clone())));
        }
        if member.identity == self.identity() {
            return Ok(Some(self.hub.public_key().clone()));
        }
        Ok(self.resolver.resolve_public_key(&member.identity).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathRequest;
    use crate::storage::MemoryNetwork;
    use serde_json::json;

    #[tokio::test]
    async fn test_own_reads_go_through_cache() {
        let network = MemoryNetwork::new();
        let hub = Arc::new(network.join("alice").unwrap());
        let session = Session::new(hub, network.resolver(), EngineConfig::default());

        let d = Descriptor::create(
            "default",
            PathRequest::env("app/1", "default", "alice"),
            json!({"name": "default", "files": []}),
            "alice",
        )
        .unwrap();
        session.write_own(&d).await.unwrap();
        assert_eq!(session.cache().len(), 1);
        assert_eq!(session.read_own(&d.path).await.unwrap(), Some(d.clone()));
        assert_eq!(session.read_from("alice", &d.path).await.unwrap(), Some(d.clone()));

        session.delete_own(&d.path).await.unwrap();
        assert!(session.cache().is_empty());
        assert_eq!(session.read_own(&d.path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_public_key_prefers_member_record() {
        let network = MemoryNetwork::new();
        let hub = Arc::new(network.join("alice").unwrap());
        network.join("bob").unwrap();
        let session = Session::new(hub, network.resolver(), EngineConfig::default());

        let recorded = Member::new("bob").with_public_key("pk-recorded");
        assert_eq!(
            session.public_key_of(&recorded).await.unwrap(),
            Some(PublicKey::from("pk-recorded"))
        );
        assert_eq!(
            session.public_key_of(&Member::new("bob")).await.unwrap(),
            Some(PublicKey::from("pk-bob"))
        );
        assert_eq!(session.public_key_of(&Member::new("nobody")).await.unwrap(), None);
        assert_eq!(session.me().public_key.as_deref(), Some("pk-alice"));
    }
}
