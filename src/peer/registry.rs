//! Peer registry
//!
//! The only code path that changes either the client store or the live peer
//! table. Creation and deletion run one at a time under the registry lock so
//! address allocation cannot race and the two sides never drift by more than
//! a single failed operation.

use std::collections::{BTreeMap, BTreeSet};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::allocator::AddressPool;
use super::render::{parse, render, ArtifactParams};
use super::store::ClientStore;
use super::validate_name;
use crate::config::WolfGateConfig;
use crate::error::{Error, Result};
use crate::wg::{detect_endpoint, KeypairProvider, TunnelController};

/// Server-side values written into every client configuration
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub interface: String,
    pub listen_port: u16,
    /// Fixed endpoint; discovered from host interfaces when `None`
    pub endpoint: Option<String>,
    pub dns: Vec<String>,
    pub persistent_keepalive: u16,
}

impl ServerSettings {
    pub fn from_config(config: &WolfGateConfig) -> Self {
        Self {
            interface: config.wireguard.interface.clone(),
            listen_port: config.wireguard.listen_port,
            endpoint: config.wireguard.endpoint.clone(),
            dns: config.network.dns.clone(),
            persistent_keepalive: config.network.persistent_keepalive,
        }
    }

    fn endpoint(&self) -> Result<String> {
        match &self.endpoint {
            Some(endpoint) => Ok(endpoint.clone()),
            None => detect_endpoint(&self.interface).map(|ip| ip.to_string()),
        }
    }
}

/// Result of a successful creation
#[derive(Debug, Clone)]
pub struct ProvisionedPeer {
    pub name: String,
    pub ipv4: Ipv4Addr,
    pub ipv6: Ipv6Addr,
    pub public_key: String,
    /// Rendered client configuration, exactly as persisted
    pub config: String,
}

/// Result of comparing the client store with the live peer table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Clients that had a file but no live peer and were registered again
    pub restored: Vec<String>,
    /// Live public keys without a client file. Reported, never removed.
    pub orphaned: Vec<String>,
    /// Clients whose file could not be matched against the live table
    pub unverified: Vec<String>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.restored.is_empty() && self.orphaned.is_empty() && self.unverified.is_empty()
    }
}

/// Client name to allocated octet, rebuilt from the store at startup
type PeerIndex = BTreeMap<String, u8>;

/// Keeps the client store and the live interface consistent
pub struct PeerRegistry {
    store: ClientStore,
    keys: Arc<dyn KeypairProvider>,
    tunnel: Arc<dyn TunnelController>,
    pool: AddressPool,
    settings: ServerSettings,
    index: Mutex<PeerIndex>,
}

impl PeerRegistry {
    /// Build the registry and index the existing clients.
    ///
    /// An unreadable store yields an empty index, so the next allocation is
    /// the first usable address. Provisioning stays available at the risk of
    /// reusing an address that an unreadable client already holds.
    pub fn open(
        store: ClientStore,
        keys: Arc<dyn KeypairProvider>,
        tunnel: Arc<dyn TunnelController>,
        pool: AddressPool,
        settings: ServerSettings,
    ) -> Self {
        let index = match store.scan() {
            Ok(clients) => build_index(&pool, clients),
            Err(e) => {
                warn!(
                    "Client store unreadable, allocating from {}: {}",
                    pool.describe(),
                    e
                );
                PeerIndex::new()
            }
        };
        info!("Indexed {} existing clients in {:?}", index.len(), store.dir());

        Self {
            store,
            keys,
            tunnel,
            pool,
            settings,
            index: Mutex::new(index),
        }
    }

    pub fn store(&self) -> &ClientStore {
        &self.store
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Client names, sorted. Reads the directory, not the index.
    pub fn list(&self) -> Result<Vec<String>> {
        self.store.list()
    }

    /// Stored configuration for `name`
    pub fn read(&self, name: &str) -> Result<String> {
        validate_name(name).map_err(|_| Error::NotFound(name.to_string()))?;
        self.store.read(name)
    }

    /// Octets currently held by indexed clients
    pub async fn allocated(&self) -> BTreeMap<String, u8> {
        self.index.lock().await.clone()
    }

    /// Bring the live peer table back in line with the client store.
    ///
    /// Clients missing from the interface (after an interface restart, say)
    /// are registered again with the addresses in their file. Live peers with
    /// no client file, such as one left by a crash between the live add and
    /// the write, are logged and returned but left in place, since the server
    /// configuration may declare peers of its own.
    pub async fn reconcile(&self) -> Result<Reconciliation> {
        let _index = self.index.lock().await;
        let live: BTreeSet<String> = self.tunnel.peers().await?.into_iter().collect();

        let mut report = Reconciliation::default();
        let mut known = BTreeSet::new();

        for (name, text) in self.store.scan()? {
            let parsed = parse(&text);
            let Some(private_key) = parsed.private_key else {
                warn!("Client {} has no PrivateKey, cannot match it to a live peer", name);
                report.unverified.push(name);
                continue;
            };
            let public_key = match self.keys.public_key(&private_key).await {
                Ok(key) => key,
                Err(e) => {
                    warn!("Cannot derive the public key of client {}: {}", name, e);
                    report.unverified.push(name);
                    continue;
                }
            };

            if !live.contains(&public_key) {
                if parsed.addresses.is_empty() {
                    warn!("Client {} is not live and has no Address to restore", name);
                    report.unverified.push(name);
                } else {
                    match self.tunnel.add_peer(&public_key, &parsed.addresses).await {
                        Ok(()) => {
                            warn!("Client {} had no live peer, registered it again", name);
                            report.restored.push(name);
                        }
                        Err(e) => {
                            error!("Failed to restore live peer for client {}: {}", name, e);
                            report.unverified.push(name);
                        }
                    }
                }
            }
            known.insert(public_key);
        }

        report.orphaned = live.difference(&known).cloned().collect();
        for key in &report.orphaned {
            warn!("Live peer {} has no client file", key);
        }

        Ok(report)
    }

    /// Provision a new client: allocate, generate keys, register with the
    /// interface, then persist. A failed persist removes the live entry again.
    pub async fn create(&self, name: &str) -> Result<ProvisionedPeer> {
        validate_name(name)?;
        if self.store.is_reserved(name) {
            return Err(Error::ValidationFailed(format!(
                "name {} is reserved for the server interface",
                name
            )));
        }

        let mut index = self.index.lock().await;
        if index.contains_key(name) || self.store.exists(name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }

        let allocation = self.pool.allocate(index.values().copied())?;
        let keys = self.keys.generate().await?;
        let server_public_key = self.tunnel.public_key().await?;
        let endpoint = self.settings.endpoint()?;

        let config = render(&ArtifactParams {
            private_key: &keys.private_key,
            ipv4: allocation.ipv4,
            ipv6: allocation.ipv6,
            dns: &self.settings.dns,
            server_public_key: &server_public_key,
            endpoint: &endpoint,
            listen_port: self.settings.listen_port,
            persistent_keepalive: self.settings.persistent_keepalive,
        });

        self.tunnel
            .add_peer(&keys.public_key, &allocation.allowed_ips())
            .await?;

        if let Err(e) = self.store.write(name, &config) {
            error!("Failed to persist client {}: {}", name, e);
            if let Err(rollback) = self.tunnel.remove_peer(&keys.public_key).await {
                error!(
                    "Rollback failed, peer {} is live without a client file: {}",
                    keys.public_key, rollback
                );
            }
            return Err(e);
        }

        index.insert(name.to_string(), allocation.octet);
        info!("Created client {} at {}", name, allocation.ipv4);

        Ok(ProvisionedPeer {
            name: name.to_string(),
            ipv4: allocation.ipv4,
            ipv6: allocation.ipv6,
            public_key: keys.public_key,
            config,
        })
    }

    /// Revoke a client: remove its key from the interface, then its file.
    ///
    /// The client's public key is derived from the stored private key; the
    /// `PublicKey` line in the file is the server's key.
    pub async fn delete(&self, name: &str) -> Result<()> {
        validate_name(name).map_err(|_| Error::NotFound(name.to_string()))?;

        let mut index = self.index.lock().await;
        let config = self.store.read(name)?;
        let parsed = parse(&config);

        let private_key = parsed.private_key.ok_or_else(|| Error::ParseFailed {
            name: name.to_string(),
            reason: "missing PrivateKey".to_string(),
        })?;
        let public_key = self.keys.public_key(&private_key).await?;

        self.tunnel.remove_peer(&public_key).await?;

        if let Err(e) = self.store.delete(name) {
            error!("Failed to delete client file {}: {}", name, e);
            if let Err(rollback) = self.tunnel.add_peer(&public_key, &parsed.addresses).await {
                error!(
                    "Rollback failed, client {} has a file but no live peer: {}",
                    name, rollback
                );
            }
            return Err(e);
        }

        index.remove(name);
        info!("Deleted client {}", name);
        Ok(())
    }
}

fn build_index(pool: &AddressPool, clients: Vec<(String, String)>) -> PeerIndex {
    let mut index = PeerIndex::new();
    for (name, text) in clients {
        match pool.octet_of(&parse(&text).addresses) {
            Some(octet) => {
                index.insert(name, octet);
            }
            None => warn!("Client {} has no address in {}", name, pool.describe()),
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wg::{MemoryKeypairProvider, MemoryTunnel};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        path: std::path::PathBuf,
        keys: Arc<MemoryKeypairProvider>,
        tunnel: Arc<MemoryTunnel>,
        registry: Arc<PeerRegistry>,
    }

    fn settings() -> ServerSettings {
        ServerSettings {
            interface: "wg0".to_string(),
            listen_port: 51820,
            endpoint: Some("203.0.113.7".to_string()),
            dns: vec!["1.1.1.1".to_string(), "1.0.0.1".to_string()],
            persistent_keepalive: 25,
        }
    }

    fn pool() -> AddressPool {
        AddressPool::new(Ipv4Addr::new(10, 66, 66, 0), "fd42:42:42::").unwrap()
    }

    fn open_at(
        path: &std::path::Path,
        keys: Arc<MemoryKeypairProvider>,
        tunnel: Arc<MemoryTunnel>,
    ) -> PeerRegistry {
        let store = ClientStore::open(path).unwrap().with_reserved("wg0");
        PeerRegistry::open(store, keys, tunnel, pool(), settings())
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wireguard");
        let keys = Arc::new(MemoryKeypairProvider::new());
        let tunnel = Arc::new(MemoryTunnel::default());
        let registry = Arc::new(open_at(&path, keys.clone(), tunnel.clone()));
        Fixture {
            _dir: dir,
            path,
            keys,
            tunnel,
            registry,
        }
    }

    #[tokio::test]
    async fn test_create_registers_and_persists() {
        let f = fixture();
        let peer = f.registry.create("alice").await.unwrap();

        assert_eq!(peer.ipv4, Ipv4Addr::new(10, 66, 66, 2));
        assert_eq!(peer.ipv6.to_string(), "fd42:42:42::2");
        assert_eq!(f.registry.read("alice").unwrap(), peer.config);
        assert_eq!(
            f.tunnel.allowed_ips(&peer.public_key).unwrap(),
            vec!["10.66.66.2/32", "fd42:42:42::2/128"]
        );
        assert!(peer.config.contains("PublicKey = memory-server-public\n"));
        assert!(peer.config.contains("Endpoint = 203.0.113.7:51820\n"));
        // The private key lives only in the persisted text
        assert!(peer.config.contains("PrivateKey = memory-private-0001\n"));
    }

    #[tokio::test]
    async fn test_sequential_addresses() {
        let f = fixture();
        let alice = f.registry.create("alice").await.unwrap();
        let bob = f.registry.create("bob").await.unwrap();
        assert_eq!(alice.ipv4.octets()[3], 2);
        assert_eq!(bob.ipv4.octets()[3], 3);
        assert_eq!(f.registry.list().unwrap(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_concurrent_creates_get_distinct_addresses() {
        let f = fixture();
        let mut handles = Vec::new();
        for i in 0..20 {
            let registry = f.registry.clone();
            handles.push(tokio::spawn(async move {
                registry.create(&format!("client-{}", i)).await
            }));
        }

        let mut addresses = HashSet::new();
        for handle in handles {
            let peer = handle.await.unwrap().unwrap();
            assert!(addresses.insert(peer.ipv4));
        }
        assert_eq!(addresses.len(), 20);
        assert_eq!(f.tunnel.peer_count(), 20);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let f = fixture();
        f.registry.create("alice").await.unwrap();
        let err = f.registry.create("alice").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(f.tunnel.peer_count(), 1);
    }

    #[tokio::test]
    async fn test_reserved_and_invalid_names_rejected() {
        let f = fixture();
        assert!(matches!(
            f.registry.create("wg0").await,
            Err(Error::ValidationFailed(_))
        ));
        assert!(matches!(
            f.registry.create("../evil").await,
            Err(Error::ValidationFailed(_))
        ));
        assert_eq!(f.tunnel.mutations(), 0);
    }

    #[tokio::test]
    async fn test_keygen_failure_leaves_nothing() {
        let f = fixture();
        f.keys.set_failing(true);
        let err = f.registry.create("alice").await.unwrap_err();
        assert!(matches!(err, Error::ExternalCapabilityFailed { .. }));
        assert!(f.registry.list().unwrap().is_empty());
        assert_eq!(f.tunnel.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_tunnel_failure_aborts_before_store() {
        let f = fixture();
        f.tunnel.set_fail_add(true);
        assert!(f.registry.create("alice").await.is_err());
        assert!(!f.registry.store().exists("alice"));

        // The failed attempt did not consume an address
        f.tunnel.set_fail_add(false);
        let peer = f.registry.create("alice").await.unwrap();
        assert_eq!(peer.ipv4.octets()[3], 2);
    }

    #[tokio::test]
    async fn test_persist_failure_rolls_back_live_peer() {
        let f = fixture();
        // Replace the directory with a plain file so the write fails
        std::fs::remove_dir_all(&f.path).unwrap();
        std::fs::write(&f.path, "not a directory").unwrap();

        let err = f.registry.create("alice").await.unwrap_err();
        assert!(matches!(err, Error::StoreFailed { .. }));
        assert_eq!(f.tunnel.peer_count(), 0);
        assert_eq!(f.tunnel.mutations(), 2);
    }

    #[tokio::test]
    async fn test_delete_removes_file_and_live_peer() {
        let f = fixture();
        let alice = f.registry.create("alice").await.unwrap();
        f.registry.create("bob").await.unwrap();

        f.registry.delete("alice").await.unwrap();
        assert_eq!(f.registry.list().unwrap(), vec!["bob"]);
        assert!(f.tunnel.allowed_ips(&alice.public_key).is_none());
        assert_eq!(f.tunnel.peer_count(), 1);
        assert!(!f.registry.allocated().await.contains_key("alice"));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found_without_live_mutation() {
        let f = fixture();
        f.registry.create("alice").await.unwrap();
        let before = f.tunnel.mutations();

        let err = f.registry.delete("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(f.tunnel.mutations(), before);
    }

    #[tokio::test]
    async fn test_delete_without_private_key_fails() {
        let f = fixture();
        f.registry
            .store()
            .write(
                "broken",
                "[Interface]\nAddress = 10.66.66.9/32\n\n[Peer]\nPublicKey = memory-server-public\n",
            )
            .unwrap();

        let err = f.registry.delete("broken").await.unwrap_err();
        assert!(matches!(err, Error::ParseFailed { .. }));
        assert!(f.registry.store().exists("broken"));
        assert_eq!(f.tunnel.mutations(), 0);
    }

    #[tokio::test]
    async fn test_delete_tunnel_failure_keeps_file() {
        let f = fixture();
        f.registry.create("alice").await.unwrap();
        f.tunnel.set_fail_remove(true);

        assert!(f.registry.delete("alice").await.is_err());
        assert!(f.registry.store().exists("alice"));
        assert_eq!(f.tunnel.peer_count(), 1);
    }

    #[tokio::test]
    async fn test_reopen_rebuilds_index() {
        let f = fixture();
        f.registry.create("alice").await.unwrap();
        f.registry.create("bob").await.unwrap();

        let reopened = open_at(&f.path, f.keys.clone(), f.tunnel.clone());
        let allocated = reopened.allocated().await;
        assert_eq!(allocated.get("alice"), Some(&2));
        assert_eq!(allocated.get("bob"), Some(&3));

        let carol = reopened.create("carol").await.unwrap();
        assert_eq!(carol.ipv4.octets()[3], 4);
    }

    #[tokio::test]
    async fn test_unreadable_store_falls_back_to_first_address() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wireguard");
        let store = ClientStore::open(&path).unwrap();
        store.write("bob", "[Interface]\nAddress = 10.66.66.2/32\n").unwrap();

        // Make the directory unlistable while the registry indexes it
        std::fs::rename(&path, dir.path().join("moved")).unwrap();
        let registry = PeerRegistry::open(
            store,
            Arc::new(MemoryKeypairProvider::new()),
            Arc::new(MemoryTunnel::default()),
            pool(),
            settings(),
        );
        assert!(registry.allocated().await.is_empty());

        // Once the directory is back, the stale index hands out .2 again
        std::fs::rename(dir.path().join("moved"), &path).unwrap();
        let alice = registry.create("alice").await.unwrap();
        assert_eq!(alice.ipv4, Ipv4Addr::new(10, 66, 66, 2));
    }

    #[tokio::test]
    async fn test_reconcile_restores_peers_after_interface_restart() {
        let f = fixture();
        let alice = f.registry.create("alice").await.unwrap();
        f.registry.create("bob").await.unwrap();

        // A restarted interface comes back with an empty peer table
        let fresh = Arc::new(MemoryTunnel::default());
        let reopened = open_at(&f.path, f.keys.clone(), fresh.clone());
        assert_eq!(fresh.peer_count(), 0);

        let report = reopened.reconcile().await.unwrap();
        assert_eq!(report.restored, vec!["alice", "bob"]);
        assert!(report.orphaned.is_empty());
        assert_eq!(fresh.peer_count(), 2);
        assert_eq!(
            fresh.allowed_ips(&alice.public_key).unwrap(),
            vec!["10.66.66.2/32", "fd42:42:42::2/128"]
        );

        // A second pass finds nothing to do
        assert!(reopened.reconcile().await.unwrap().is_clean());
        assert_eq!(fresh.mutations(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_reports_live_peers_without_file() {
        let f = fixture();
        let alice = f.registry.create("alice").await.unwrap();
        // Live add succeeded but the file never made it to disk
        f.registry.store().delete("alice").unwrap();
        f.tunnel.insert_live("stray", &["10.66.66.40/32".to_string()]);

        let report = f.registry.reconcile().await.unwrap();
        let mut expected = vec![alice.public_key.clone(), "stray".to_string()];
        expected.sort();
        assert_eq!(report.orphaned, expected);
        assert!(report.restored.is_empty());
        // Reported only
        assert_eq!(f.tunnel.peer_count(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_flags_unmatchable_clients() {
        let f = fixture();
        f.registry
            .store()
            .write("broken", "[Interface]\nAddress = 10.66.66.9/32\n")
            .unwrap();

        let report = f.registry.reconcile().await.unwrap();
        assert_eq!(report.unverified, vec!["broken"]);
        assert_eq!(f.tunnel.mutations(), 0);
    }

    /// Swaps the client file for a directory once the live peer is gone, so
    /// the following file removal fails
    struct DirSwappingTunnel {
        inner: MemoryTunnel,
        file: std::path::PathBuf,
    }

    #[async_trait]
    impl TunnelController for DirSwappingTunnel {
        async fn public_key(&self) -> Result<String> {
            self.inner.public_key().await
        }

        async fn peers(&self) -> Result<Vec<String>> {
            self.inner.peers().await
        }

        async fn add_peer(&self, public_key: &str, allowed_ips: &[String]) -> Result<()> {
            self.inner.add_peer(public_key, allowed_ips).await
        }

        async fn remove_peer(&self, public_key: &str) -> Result<()> {
            self.inner.remove_peer(public_key).await?;
            std::fs::remove_file(&self.file).unwrap();
            std::fs::create_dir(&self.file).unwrap();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_delete_file_failure_restores_live_peer() {
        let dir = tempdir().unwrap();
        let store = ClientStore::open(dir.path()).unwrap().with_reserved("wg0");
        let tunnel = Arc::new(DirSwappingTunnel {
            inner: MemoryTunnel::default(),
            file: store.path_for("alice"),
        });
        let registry = PeerRegistry::open(
            store,
            Arc::new(MemoryKeypairProvider::new()),
            tunnel.clone(),
            pool(),
            settings(),
        );
        let alice = registry.create("alice").await.unwrap();

        let err = registry.delete("alice").await.unwrap_err();
        assert!(matches!(err, Error::StoreFailed { .. }));
        assert_eq!(
            tunnel.inner.allowed_ips(&alice.public_key).unwrap(),
            vec!["10.66.66.2/32", "fd42:42:42::2/128"]
        );
        assert!(registry.allocated().await.contains_key("alice"));
    }
}
