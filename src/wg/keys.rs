//! Keypair generation

use async_trait::async_trait;

use super::command::WgCommand;
use crate::error::{Error, Result};

/// A client keypair as produced by `wg genkey` / `wg pubkey`
#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    pub private_key: String,
    pub public_key: String,
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Source of client keypairs
#[async_trait]
pub trait KeypairProvider: Send + Sync {
    /// Generate a fresh keypair
    async fn generate(&self) -> Result<Keypair>;

    /// Derive the public key belonging to `private_key`
    async fn public_key(&self, private_key: &str) -> Result<String>;
}

/// Keypair provider backed by the `wg` binary
#[derive(Debug, Clone)]
pub struct WgKeypairProvider {
    wg: WgCommand,
}

impl WgKeypairProvider {
    pub fn new(wg: WgCommand) -> Self {
        Self { wg }
    }
}

#[async_trait]
impl KeypairProvider for WgKeypairProvider {
    async fn generate(&self) -> Result<Keypair> {
        let private_key = self.wg.run(&["genkey"], None).await?;
        if private_key.is_empty() {
            return Err(Error::external("wg genkey", "empty private key"));
        }
        let public_key = self.public_key(&private_key).await?;
        Ok(Keypair {
            private_key,
            public_key,
        })
    }

    async fn public_key(&self, private_key: &str) -> Result<String> {
        let public_key = self.wg.run(&["pubkey"], Some(private_key)).await?;
        if public_key.is_empty() {
            return Err(Error::external("wg pubkey", "empty public key"));
        }
        Ok(public_key)
    }
}
