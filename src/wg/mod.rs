//! WireGuard Module
//!
//! Narrow async interfaces over the `wg` tool: keypair generation and
//! live peer table control. Production adapters shell out to `wg` with a
//! bounded timeout; memory adapters back the tests.

mod command;
mod host;
mod keys;
mod memory;
mod tunnel;

pub use command::WgCommand;
pub use host::detect_endpoint;
pub use keys::{Keypair, KeypairProvider, WgKeypairProvider};
pub use memory::{MemoryKeypairProvider, MemoryTunnel};
pub use tunnel::{TunnelController, WgTunnelController};
