//! Uploader identity resolution
//!
//! Derives a normalized client network address from proxy headers or the
//! transport peer, then maps it to a logical uploader through a static
//! address table loaded once at process start.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Which signal produced the resolved client address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AddressSource {
    #[serde(rename = "x-forwarded-for")]
    ForwardedFor,
    #[serde(rename = "x-real-ip")]
    RealIp,
    #[serde(rename = "client.host")]
    PeerAddress,
    #[serde(rename = "unknown")]
    Unknown,
}

impl AddressSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressSource::ForwardedFor => "x-forwarded-for",
            AddressSource::RealIp => "x-real-ip",
            AddressSource::PeerAddress => "client.host",
            AddressSource::Unknown => "unknown",
        }
    }
}

/// One record of the static address-to-user table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityEntry {
    pub ip: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub uid: Option<i64>,
    /// Operator-defined fields carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Static mapping from normalized IP to identity entry.
///
/// Built once at startup and injected read-only into request handling.
#[derive(Clone, Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<String, IdentityEntry>,
}

impl IdentityMap {
    /// Build the table from raw JSON entries. Non-object entries and entries
    /// whose address does not normalize are skipped, not fatal.
    pub fn from_entries(entries: &[serde_json::Value]) -> Self {
        let mut mapping = HashMap::new();
        for value in entries {
            let Ok(entry) = serde_json::from_value::<IdentityEntry>(value.clone()) else {
                continue;
            };
            let Some(ip) = normalize_ip(Some(&entry.ip)) else {
                continue;
            };
            mapping.insert(ip, entry);
        }
        IdentityMap { entries: mapping }
    }

    pub fn lookup(&self, address: &str) -> Option<&IdentityEntry> {
        self.entries.get(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The resolved requester: normalized address, which signal produced it, and
/// the identity table entry for that address when one exists.
#[derive(Clone, Debug, Serialize)]
pub struct RequesterIdentity {
    pub client_ip: Option<String>,
    pub ip_source: &'static str,
    pub user: Option<IdentityEntry>,
}

impl RequesterIdentity {
    /// Resolve the requester from network-layer signals and the static table.
    pub fn resolve(
        forwarded_for: Option<&str>,
        real_ip: Option<&str>,
        peer_addr: Option<&str>,
        table: &IdentityMap,
    ) -> Self {
        let (client_ip, source) = resolve_client_address(forwarded_for, real_ip, peer_addr);
        let user = client_ip
            .as_deref()
            .and_then(|ip| table.lookup(ip))
            .cloned();
        RequesterIdentity {
            client_ip,
            ip_source: source.as_str(),
            user,
        }
    }

    /// Identity for callers with no network context (local ingestion, tests).
    pub fn anonymous() -> Self {
        RequesterIdentity {
            client_ip: None,
            ip_source: AddressSource::Unknown.as_str(),
            user: None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.user
            .as_ref()
            .map(|entry| entry.user.as_str())
            .filter(|user| !user.is_empty())
    }

    pub fn uid(&self) -> Option<i64> {
        self.user.as_ref().and_then(|entry| entry.uid)
    }
}

/// Normalize a raw address token to its canonical textual form.
///
/// Strips quoting, whitespace, an IPv6 `::ffff:` prefix, and a `%zone`
/// suffix; for an ambiguous `host:port` shape also tries dropping the
/// trailing port. IPv4-mapped IPv6 addresses collapse to plain IPv4.
/// Returns `None` when nothing parses.
pub fn normalize_ip(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    let mut value = raw.trim().trim_matches('"').to_string();
    if value.is_empty() || value.eq_ignore_ascii_case("unknown") {
        return None;
    }

    if let Some(rest) = value.strip_prefix("::ffff:") {
        value = rest.to_string();
    }
    if let Some((head, _zone)) = value.split_once('%') {
        value = head.to_string();
    }

    let mut candidates = vec![value.clone()];
    if value.matches(':').count() == 1 && value.contains('.') {
        if let Some((host, _port)) = value.rsplit_once(':') {
            candidates.push(host.to_string());
        }
    }

    for candidate in candidates {
        if let Ok(parsed) = candidate.parse::<IpAddr>() {
            if let IpAddr::V6(v6) = parsed {
                if let Some(v4) = v6.to_ipv4_mapped() {
                    return Some(v4.to_string());
                }
            }
            return Some(parsed.to_string());
        }
    }
    None
}

/// Resolve the client address from proxy headers and the transport peer.
///
/// Order: first valid entry of the comma-separated forwarded-for header,
/// then the real-ip header, then the raw peer address.
pub fn resolve_client_address(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    peer_addr: Option<&str>,
) -> (Option<String>, AddressSource) {
    if let Some(header) = forwarded_for {
        for part in header.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some(normalized) = normalize_ip(Some(part)) {
                return (Some(normalized), AddressSource::ForwardedFor);
            }
        }
    }

    if let Some(normalized) = normalize_ip(real_ip) {
        return (Some(normalized), AddressSource::RealIp);
    }

    if let Some(normalized) = normalize_ip(peer_addr) {
        return (Some(normalized), AddressSource::PeerAddress);
    }

    (None, AddressSource::Unknown)
}
