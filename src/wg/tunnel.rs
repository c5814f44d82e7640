//! Live peer table control

use async_trait::async_trait;

use super::command::WgCommand;
use crate::error::Result;

/// Control over the running interface's peer table
#[async_trait]
pub trait TunnelController: Send + Sync {
    /// Public key of the interface itself
    async fn public_key(&self) -> Result<String>;

    /// Public keys of every peer currently on the interface
    async fn peers(&self) -> Result<Vec<String>>;

    /// Authorize `public_key` for exactly `allowed_ips`
    async fn add_peer(&self, public_key: &str, allowed_ips: &[String]) -> Result<()>;

    /// Remove `public_key` from the peer table
    async fn remove_peer(&self, public_key: &str) -> Result<()>;
}

/// Tunnel controller backed by `wg show` / `wg set`
#[derive(Debug, Clone)]
pub struct WgTunnelController {
    wg: WgCommand,
    interface: String,
}

impl WgTunnelController {
    pub fn new(wg: WgCommand, interface: impl Into<String>) -> Self {
        Self {
            wg,
            interface: interface.into(),
        }
    }

    /// Interface name this controller manages
    pub fn interface(&self) -> &str {
        &self.interface
    }
}

#[async_trait]
impl TunnelController for WgTunnelController {
    async fn public_key(&self) -> Result<String> {
        self.wg
            .run(&["show", &self.interface, "public-key"], None)
            .await
    }

    async fn peers(&self) -> Result<Vec<String>> {
        let out = self.wg.run(&["show", &self.interface, "peers"], None).await?;
        Ok(parse_peer_list(&out))
    }

    async fn add_peer(&self, public_key: &str, allowed_ips: &[String]) -> Result<()> {
        let allowed = allowed_ips.join(",");
        self.wg
            .run(
                &["set", &self.interface, "peer", public_key, "allowed-ips", &allowed],
                None,
            )
            .await?;
        tracing::debug!("Added peer {} to {} ({})", public_key, self.interface, allowed);
        Ok(())
    }

    async fn remove_peer(&self, public_key: &str) -> Result<()> {
        self.wg
            .run(&["set", &self.interface, "peer", public_key, "remove"], None)
            .await?;
        tracing::debug!("Removed peer {} from {}", public_key, self.interface);
        Ok(())
    }
}

/// One key per line, as printed by `wg show <if> peers`
fn parse_peer_list(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
