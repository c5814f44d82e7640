//! Client configuration rendering and parsing
//!
//! The rendered text is the only record of a client, so `parse` has to
//! recover everything other operations need from it.

use std::fmt::Write as _;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Inputs for a client configuration
#[derive(Debug, Clone)]
pub struct ArtifactParams<'a> {
    pub private_key: &'a str,
    pub ipv4: Ipv4Addr,
    pub ipv6: Ipv6Addr,
    pub dns: &'a [String],
    pub server_public_key: &'a str,
    pub endpoint: &'a str,
    pub listen_port: u16,
    pub persistent_keepalive: u16,
}

/// Render a client configuration. Output is byte-stable for equal inputs.
pub fn render(params: &ArtifactParams<'_>) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = writeln!(out, "[Interface]");
    let _ = writeln!(out, "PrivateKey = {}", params.private_key.trim());
    let _ = writeln!(out, "Address = {}/32,{}/128", params.ipv4, params.ipv6);
    let _ = writeln!(out, "DNS = {}", params.dns.join(", "));
    let _ = writeln!(out);
    let _ = writeln!(out, "[Peer]");
    let _ = writeln!(out, "PublicKey = {}", params.server_public_key.trim());
    let _ = writeln!(out, "Endpoint = {}", format_endpoint(params.endpoint, params.listen_port));
    let _ = writeln!(out, "AllowedIPs = 0.0.0.0/0, ::/0");
    let _ = writeln!(out, "PersistentKeepalive = {}", params.persistent_keepalive);
    out
}

fn format_endpoint(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Fields recovered from a rendered configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArtifact {
    pub private_key: Option<String>,
    pub addresses: Vec<String>,
    pub dns: Vec<String>,
    pub server_public_key: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Interface,
    Peer,
}

/// Extract the known fields. Unknown keys and sections are ignored, so a
/// hand-edited file still parses as long as its markers are intact.
pub fn parse(text: &str) -> ParsedArtifact {
    let mut parsed = ParsedArtifact::default();
    let mut section = Section::None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            section = match line {
                "[Interface]" => Section::Interface,
                "[Peer]" => Section::Peer,
                _ => Section::None,
            };
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if value.is_empty() {
            continue;
        }

        match (section, key) {
            (Section::Interface, "PrivateKey") => parsed.private_key = Some(value.to_string()),
            (Section::Interface, "Address") => parsed.addresses = split_list(value),
            (Section::Interface, "DNS") => parsed.dns = split_list(value),
            (Section::Peer, "PublicKey") => parsed.server_public_key = Some(value.to_string()),
            (Section::Peer, "Endpoint") => parsed.endpoint = Some(value.to_string()),
            _ => {}
        }
    }

    parsed
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
