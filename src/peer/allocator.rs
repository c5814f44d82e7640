//! Client address allocation
//!
//! Clients get `<ipv4_prefix>.N` and `<ipv6_prefix>N` where N is a single
//! octet shared by both families. The server owns `.1`.

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::config::WolfGateConfig;
use crate::error::{Error, Result};

/// Octet reserved for the server's own tunnel address
pub const SERVER_OCTET: u8 = 1;
/// First octet handed out to clients
pub const FIRST_CLIENT_OCTET: u8 = 2;
/// Last octet handed out to clients
pub const LAST_CLIENT_OCTET: u8 = 254;

/// Addresses assigned to one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub octet: u8,
    pub ipv4: Ipv4Addr,
    pub ipv6: Ipv6Addr,
}

impl Allocation {
    /// Ranges the tunnel should accept from this client: its own two hosts
    pub fn allowed_ips(&self) -> Vec<String> {
        vec![format!("{}/32", self.ipv4), format!("{}/128", self.ipv6)]
    }
}

/// The /24 (and matching IPv6 range) clients are allocated from
#[derive(Debug, Clone)]
pub struct AddressPool {
    ipv4_base: Ipv4Addr,
    ipv6_prefix: String,
}

impl AddressPool {
    /// Create a pool from an IPv4 network address and an IPv6 prefix ending in `::`
    pub fn new(ipv4_base: Ipv4Addr, ipv6_prefix: impl Into<String>) -> Result<Self> {
        let ipv6_prefix = ipv6_prefix.into();
        if !ipv6_prefix.ends_with("::") {
            return Err(Error::Config(format!(
                "IPv6 prefix must end with '::': {}",
                ipv6_prefix
            )));
        }
        let octets = ipv4_base.octets();
        let pool = Self {
            ipv4_base: Ipv4Addr::new(octets[0], octets[1], octets[2], 0),
            ipv6_prefix,
        };
        // Reject prefixes that cannot form an address
        pool.ipv6_for(LAST_CLIENT_OCTET)?;
        Ok(pool)
    }

    pub fn from_config(config: &WolfGateConfig) -> Result<Self> {
        Self::new(config.ipv4_base()?, config.network.ipv6_prefix.clone())
    }

    /// Human-readable pool range
    pub fn describe(&self) -> String {
        format!("{}/24", self.ipv4_base)
    }

    /// Addresses for a given octet
    pub fn allocation(&self, octet: u8) -> Result<Allocation> {
        let o = self.ipv4_base.octets();
        Ok(Allocation {
            octet,
            ipv4: Ipv4Addr::new(o[0], o[1], o[2], octet),
            ipv6: self.ipv6_for(octet)?,
        })
    }

    /// The first usable client allocation
    pub fn first(&self) -> Result<Allocation> {
        self.allocation(FIRST_CLIENT_OCTET)
    }

    /// Pick the next allocation given the octets already in use.
    ///
    /// Returns one past the highest octet in use. Once that would leave the
    /// pool, the lowest free octet is reused instead.
    pub fn allocate<I>(&self, used: I) -> Result<Allocation>
    where
        I: IntoIterator<Item = u8>,
    {
        let used: BTreeSet<u8> = used
            .into_iter()
            .filter(|o| (FIRST_CLIENT_OCTET..=LAST_CLIENT_OCTET).contains(o))
            .collect();

        let next = match used.iter().next_back() {
            None => Some(FIRST_CLIENT_OCTET),
            Some(&max) if max < LAST_CLIENT_OCTET => Some(max + 1),
            Some(_) => (FIRST_CLIENT_OCTET..=LAST_CLIENT_OCTET).find(|o| !used.contains(o)),
        };

        match next {
            Some(octet) => self.allocation(octet),
            None => Err(Error::PoolExhausted(self.describe())),
        }
    }

    /// Client octet of the first in-pool IPv4 entry of an `Address` list.
    /// Malformed and foreign entries are skipped.
    pub fn octet_of<S: AsRef<str>>(&self, addresses: &[S]) -> Option<u8> {
        addresses.iter().find_map(|entry| {
            let host = entry.as_ref().trim().split('/').next()?;
            let ip: Ipv4Addr = host.parse().ok()?;
            let [a, b, c, d] = ip.octets();
            let base = self.ipv4_base.octets();
            ([a, b, c] == base[..3] && d != SERVER_OCTET && d != 0 && d != 255).then_some(d)
        })
    }

    fn ipv6_for(&self, octet: u8) -> Result<Ipv6Addr> {
        // The octet is written in decimal after the prefix, as existing
        // client files do.
        format!("{}{}", self.ipv6_prefix, octet).parse().map_err(|_| {
            Error::Config(format!("IPv6 prefix is invalid: {}", self.ipv6_prefix))
        })
    }
}
