//! Compiled-in fallback node set, available when no subscription has been
//! fetched or the fetch fails.

use chrono::Utc;

use vn_core::types::{Node, NodeSource, Protocol, Transport};

/// Shared account id for the builtin endpoints.
const BUILTIN_UUID: &str = "39a279a5-55bb-3a27-ad9b-6ec81ff5779a";

const BUILTIN_TABLE: &[(&str, &str, u16, &str)] = &[
    ("VIP-Hong Kong 01", "andromedae.weltknoten.xyz", 30001, "Hong Kong"),
    ("VIP-Hong Kong 02", "monocerotis.weltknoten.xyz", 30002, "Hong Kong"),
    ("VIP-Hong Kong 03", "orionis.weltknoten.xyz", 30003, "Hong Kong"),
    ("VIP-Japan 01", "phoenicis.weltknoten.xyz", 30005, "Japan"),
    ("VIP-Japan 02", "scorpii.weltknoten.xyz", 30006, "Japan"),
    ("VIP-Korea", "andromedae.weltknoten.xyz", 30024, "Korea"),
    ("VIP-Singapore 01", "andromedae.weltknoten.xyz", 30007, "Singapore"),
    ("VIP-Singapore 02", "monocerotis.weltknoten.xyz", 30008, "Singapore"),
    ("VIP-Taiwan 01", "orionis.weltknoten.xyz", 30009, "Taiwan"),
    ("VIP-United States 01", "phoenicis.weltknoten.xyz", 30011, "USA"),
    ("VIP-United States 02", "scorpii.weltknoten.xyz", 30012, "USA"),
    ("VIP-Germany", "scorpii.weltknoten.xyz", 30017, "Germany"),
];

pub fn builtin_nodes() -> Vec<Node> {
    BUILTIN_TABLE
        .iter()
        .map(|&(name, server, port, region)| Node {
            id: Node::derive_id("vmess", server, port),
            name: name.to_string(),
            region: region.to_string(),
            server: server.to_string(),
            port,
            protocol: Protocol::Vmess {
                uuid: BUILTIN_UUID.to_string(),
                alter_id: 0,
                security: "auto".to_string(),
                transport: Transport {
                    tls: true,
                    ..Default::default()
                },
            },
            source: NodeSource::Builtin,
            added_at: Utc::now(),
        })
        .collect()
}
