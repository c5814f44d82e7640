//! In-memory test doubles for the `wg` adapters

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::keys::{Keypair, KeypairProvider};
use super::tunnel::TunnelController;
use crate::error::{Error, Result};

const PRIVATE_PREFIX: &str = "memory-private-";
const PUBLIC_PREFIX: &str = "memory-public-";

/// Deterministic keypair source: the n-th keypair is `memory-private-n` /
/// `memory-public-n`
#[derive(Debug, Default)]
pub struct MemoryKeypairProvider {
    counter: AtomicU64,
    fail: AtomicBool,
}

impl MemoryKeypairProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `generate` fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeypairProvider for MemoryKeypairProvider {
    async fn generate(&self) -> Result<Keypair> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::external("wg genkey", "keypair generation disabled"));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let private_key = format!("{}{:04}", PRIVATE_PREFIX, n);
        let public_key = self.public_key(&private_key).await?;
        Ok(Keypair {
            private_key,
            public_key,
        })
    }

    async fn public_key(&self, private_key: &str) -> Result<String> {
        private_key
            .strip_prefix(PRIVATE_PREFIX)
            .map(|suffix| format!("{}{}", PUBLIC_PREFIX, suffix))
            .ok_or_else(|| Error::external("wg pubkey", "invalid private key"))
    }
}

#[derive(Debug, Default)]
struct TunnelState {
    peers: HashMap<String, Vec<String>>,
    mutations: usize,
}

/// Peer table held in memory
#[derive(Debug)]
pub struct MemoryTunnel {
    public_key: String,
    state: Mutex<TunnelState>,
    fail_add: AtomicBool,
    fail_remove: AtomicBool,
}

impl Default for MemoryTunnel {
    fn default() -> Self {
        Self::new("memory-server-public")
    }
}

impl MemoryTunnel {
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            state: Mutex::new(TunnelState::default()),
            fail_add: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
        }
    }

    /// Make `add_peer` fail
    pub fn set_fail_add(&self, fail: bool) {
        self.fail_add.store(fail, Ordering::SeqCst);
    }

    /// Make `remove_peer` fail
    pub fn set_fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    /// Allowed IPs registered for `public_key`
    pub fn allowed_ips(&self, public_key: &str) -> Option<Vec<String>> {
        self.lock().peers.get(public_key).cloned()
    }

    /// Number of registered peers
    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }

    /// Register a live peer directly, bypassing the mutation counter
    pub fn insert_live(&self, public_key: &str, allowed_ips: &[String]) {
        self.lock()
            .peers
            .insert(public_key.to_string(), allowed_ips.to_vec());
    }

    /// Number of successful add/remove calls so far
    pub fn mutations(&self) -> usize {
        self.lock().mutations
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TunnelState> {
        // Holders never panic while the guard is live
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TunnelController for MemoryTunnel {
    async fn public_key(&self) -> Result<String> {
        Ok(self.public_key.clone())
    }

    async fn peers(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.lock().peers.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn add_peer(&self, public_key: &str, allowed_ips: &[String]) -> Result<()> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(Error::external("wg set", "interface not running"));
        }
        let mut state = self.lock();
        state.peers.insert(public_key.to_string(), allowed_ips.to_vec());
        state.mutations += 1;
        Ok(())
    }

    async fn remove_peer(&self, public_key: &str) -> Result<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Error::external("wg set", "interface not running"));
        }
        let mut state = self.lock();
        state.peers.remove(public_key);
        state.mutations += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keypairs_are_linked_and_distinct() {
        let provider = MemoryKeypairProvider::new();
        let a = provider.generate().await.unwrap();
        let b = provider.generate().await.unwrap();
        assert_ne!(a.private_key, b.private_key);
        assert_eq!(provider.public_key(&a.private_key).await.unwrap(), a.public_key);
        assert!(provider.public_key("garbage").await.is_err());
    }

    #[tokio::test]
    async fn test_tunnel_add_remove() {
        let tunnel = MemoryTunnel::default();
        tunnel.add_peer("k1", &["10.66.66.2/32".to_string()]).await.unwrap();
        assert_eq!(tunnel.allowed_ips("k1").unwrap(), vec!["10.66.66.2/32"]);
        assert_eq!(tunnel.peers().await.unwrap(), vec!["k1"]);
        tunnel.remove_peer("k1").await.unwrap();
        assert_eq!(tunnel.peer_count(), 0);
        assert_eq!(tunnel.mutations(), 2);
    }
}
