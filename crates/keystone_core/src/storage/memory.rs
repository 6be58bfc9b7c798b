//! In-memory hubs and identity service.
//!
//! A [`MemoryNetwork`] holds one blob store per member. Encryption is
//! simulated: a blob written for a public key can only be read back by the
//! hub owning that key.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use url::Url;

use super::{BoxFuture, Hub, IdentityResolver, PublicKey, StorageError, StorageResult};

#[derive(Debug, Clone)]
struct Blob {
    bytes: Vec<u8>,
    recipient: Option<PublicKey>,
}

#[derive(Debug, Default)]
struct NetworkState {
    /// identity -> path -> blob
    stores: HashMap<String, HashMap<String, Blob>>,
    /// location -> identity
    locations: HashMap<String, String>,
    offline: HashSet<String>,
}

fn memory_location(identity: &str) -> StorageResult<Url> {
    Url::parse(&format!("memory://hub/{identity}/"))
        .map_err(|e| StorageError::Backend(format!("invalid identity '{identity}': {e}")))
}

/// Identity service backed by a fixed table.
#[derive(Debug, Default)]
pub struct StaticIdentityResolver {
    entries: RwLock<HashMap<String, (Url, Option<PublicKey>)>>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, identity: &str, location: Url, key: Option<PublicKey>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(identity.to_string(), (location, key));
    }

    fn lookup(&self, identity: &str) -> Option<(Url, Option<PublicKey>)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(identity).cloned()
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn resolve_storage_location<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, StorageResult<Url>> {
        Box::pin(async move {
            self.lookup(identity)
                .map(|(location, _)| location)
                .ok_or_else(|| StorageError::Unreachable {
                    identity: identity.to_string(),
                    message: "unknown identity".to_string(),
                })
        })
    }

    fn resolve_public_key<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, StorageResult<Option<PublicKey>>> {
        Box::pin(async move { Ok(self.lookup(identity).and_then(|(_, key)| key)) })
    }
}

/// A set of in-memory hubs sharing one identity service.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<RwLock<NetworkState>>,
    resolver: Arc<StaticIdentityResolver>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `identity` and return the hub it owns.
    pub fn join(&self, identity: &str) -> StorageResult<MemoryHub> {
        let location = memory_location(identity)?;
        let key = PublicKey(format!("pk-{identity}"));
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.stores.entry(identity.to_string()).or_default();
            state
                .locations
                .insert(location.to_string(), identity.to_string());
        }
        self.resolver
            .register(identity, location, Some(key.clone()));

        Ok(MemoryHub {
            identity: identity.to_string(),
            key,
            network: self.clone(),
        })
    }

    pub fn resolver(&self) -> Arc<StaticIdentityResolver> {
        Arc::clone(&self.resolver)
    }

    /// Make a member's hub unreachable, or reachable again.
    pub fn set_offline(&self, identity: &str, offline: bool) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if offline {
            state.offline.insert(identity.to_string());
        } else {
            state.offline.remove(identity);
        }
    }

    /// Paths stored in a member's hub, sorted.
    pub fn paths_of(&self, identity: &str) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut paths: Vec<String> = state
            .stores
            .get(identity)
            .map(|store| store.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    /// Key a blob in a member's hub was encrypted for.
    pub fn recipient_of(&self, identity: &str, path: &str) -> Option<PublicKey> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.stores.get(identity)?.get(path)?.recipient.clone()
    }

    fn check_online(state: &NetworkState, identity: &str) -> StorageResult<()> {
        if state.offline.contains(identity) {
            return Err(StorageError::Unreachable {
                identity: identity.to_string(),
                message: "hub is offline".to_string(),
            });
        }
        Ok(())
    }

    fn read(
        &self,
        owner: &str,
        reader_key: &PublicKey,
        path: &str,
        decrypt: bool,
    ) -> StorageResult<Option<Vec<u8>>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Self::check_online(&state, owner)?;
        let Some(blob) = state.stores.get(owner).and_then(|store| store.get(path)) else {
            return Ok(None);
        };
        match (&blob.recipient, decrypt) {
            (None, false) => Ok(Some(blob.bytes.clone())),
            (Some(recipient), true) if recipient == reader_key => Ok(Some(blob.bytes.clone())),
            (Some(_), true) => Err(StorageError::Decrypt {
                path: path.to_string(),
                message: "encrypted for another key".to_string(),
            }),
            (Some(_), false) => Err(StorageError::Decrypt {
                path: path.to_string(),
                message: "blob is encrypted".to_string(),
            }),
            (None, true) => Err(StorageError::Decrypt {
                path: path.to_string(),
                message: "blob is not encrypted".to_string(),
            }),
        }
    }
}

/// A member's hub inside a [`MemoryNetwork`].
#[derive(Debug, Clone)]
pub struct MemoryHub {
    identity: String,
    key: PublicKey,
    network: MemoryNetwork,
}

impl Hub for MemoryHub {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn public_key(&self) -> &PublicKey {
        &self.key
    }

    fn put<'a>(
        &'a self,
        path: &'a str,
        bytes: &'a [u8],
        encrypt_for: Option<&'a PublicKey>,
    ) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            let mut state = self
                .network
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            MemoryNetwork::check_online(&state, &self.identity)?;
            state.stores.entry(self.identity.clone()).or_default().insert(
                path.to_string(),
                Blob {
                    bytes: bytes.to_vec(),
                    recipient: encrypt_for.cloned(),
                },
            );
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        path: &'a str,
        decrypt: bool,
    ) -> BoxFuture<'a, StorageResult<Option<Vec<u8>>>> {
        Box::pin(async move { self.network.read(&self.identity, &self.key, path, decrypt) })
    }

    fn get_from<'a>(
        &'a self,
        location: &'a Url,
        path: &'a str,
        decrypt: bool,
    ) -> BoxFuture<'a, StorageResult<Option<Vec<u8>>>> {
        Box::pin(async move {
            let owner = {
                let state = self
                    .network
                    .state
                    .read()
                    .unwrap_or_else(PoisonError::into_inner);
                state.locations.get(location.as_str()).cloned()
            };
            let owner = owner.ok_or_else(|| StorageError::Unreachable {
                identity: location.to_string(),
                message: "no hub at this location".to_string(),
            })?;
            self.network.read(&owner, &self.key, path, decrypt)
        })
    }

    fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            let mut state = self
                .network
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            MemoryNetwork::check_online(&state, &self.identity)?;
            if let Some(store) = state.stores.get_mut(&self.identity) {
                store.remove(path);
            }
            Ok(())
        })
    }

    fn list<'a>(&'a self) -> BoxFuture<'a, StorageResult<Vec<String>>> {
        Box::pin(async move { Ok(self.network.paths_of(&self.identity)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copies_are_readable_by_recipient_only() {
        let network = MemoryNetwork::new();
        let alice = network.join("alice").unwrap();
        let bob = network.join("bob").unwrap();
        let carol = network.join("carol").unwrap();
        let resolver = network.resolver();

        let bob_key = resolver.resolve_public_key("bob").await.unwrap().unwrap();
        alice.put("doc/bob.json", b"secret", Some(&bob_key)).await.unwrap();
        assert_eq!(network.recipient_of("alice", "doc/bob.json"), Some(bob_key));

        let alice_location = resolver.resolve_storage_location("alice").await.unwrap();
        let read = bob.get_from(&alice_location, "doc/bob.json", true).await.unwrap();
        assert_eq!(read.as_deref(), Some(&b"secret"[..]));

        let err = carol
            .get_from(&alice_location, "doc/bob.json", true)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Decrypt { .. }));

        let missing = bob.get_from(&alice_location, "doc/none.json", true).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_offline_hub_is_unreachable() {
        let network = MemoryNetwork::new();
        let alice = network.join("alice").unwrap();
        let bob = network.join("bob").unwrap();
        let alice_location = network
            .resolver()
            .resolve_storage_location("alice")
            .await
            .unwrap();

        network.set_offline("alice", true);
        let err = bob.get_from(&alice_location, "x", true).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(alice.put("x", b"1", None).await.is_err());

        network.set_offline("alice", false);
        alice.put("x", b"1", None).await.unwrap();
        assert_eq!(alice.list().await.unwrap(), vec!["x".to_string()]);
        alice.delete("x").await.unwrap();
        assert!(alice.get("x", false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_static_resolver_unknown_identity() {
        let resolver = StaticIdentityResolver::new();
        resolver.register("alice", memory_location("alice").unwrap(), None);
        assert!(resolver.resolve_public_key("alice").await.unwrap().is_none());
        assert!(resolver.resolve_public_key("bob").await.unwrap().is_none());
        assert!(matches!(
            resolver.resolve_storage_location("bob").await,
            Err(StorageError::Unreachable { .. })
        ));
    }
}
