//! WolfGate - WireGuard Peer Provisioning Service
//!
//! A small authenticated HTTP service that provisions, lists, exports and
//! revokes WireGuard clients on a single host interface.
//!
//! # Architecture
//!
//! Every mutation goes through the [`peer::PeerRegistry`], which owns the
//! address index and keeps the on-disk client store and the live interface
//! peer table in agreement. The `wg` tool is reached through two narrow
//! traits so the registry can be tested without root.
//!
//! # Features
//!
//! - Dual-stack address allocation from a /24 and /64 pool
//! - Atomic client configuration files, one per client
//! - Rollback of the live peer when persisting fails
//! - Bearer token authentication on every route
//! - Configuration export as JSON, plain text or PNG QR code

pub mod api;
pub mod config;
pub mod error;
pub mod peer;
pub mod wg;

pub use config::WolfGateConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::HttpServer;
    pub use crate::config::WolfGateConfig;
    pub use crate::error::{Error, Result};
    pub use crate::peer::{AddressPool, ClientStore, PeerRegistry, ServerSettings};
    pub use crate::wg::{KeypairProvider, TunnelController};
}
