//! Core data model: nodes, probe results, active configuration.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a node came from. Builtin nodes survive subscription refreshes,
/// subscription nodes are replaced wholesale on the next successful refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeSource {
    Builtin,
    Subscription,
}

/// Stream-layer options shared by both protocols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transport {
    /// tcp, ws, grpc, ...
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default)]
    pub tls: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,
}

fn default_network() -> String {
    "tcp".to_string()
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            network: default_network(),
            tls: false,
            sni: None,
            host: None,
            path: None,
            alpn: Vec::new(),
        }
    }
}

/// Endpoint protocol with its credential fields. Tagged so exhaustive
/// handling is enforced wherever an outbound is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Protocol {
    Vmess {
        uuid: String,
        #[serde(default)]
        alter_id: u32,
        #[serde(default = "default_security")]
        security: String,
        #[serde(default)]
        transport: Transport,
    },
    Vless {
        uuid: String,
        #[serde(default)]
        flow: String,
        #[serde(default)]
        transport: Transport,
    },
}

fn default_security() -> String {
    "auto".to_string()
}

impl Protocol {
    pub fn tag(&self) -> &'static str {
        match self {
            Protocol::Vmess { .. } => "vmess",
            Protocol::Vless { .. } => "vless",
        }
    }

    pub fn transport(&self) -> &Transport {
        match self {
            Protocol::Vmess { transport, .. } => transport,
            Protocol::Vless { transport, .. } => transport,
        }
    }
}

/// A candidate outbound endpoint. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub region: String,
    pub server: String,
    pub port: u16,
    pub protocol: Protocol,
    pub source: NodeSource,
    pub added_at: DateTime<Utc>,
}

impl Node {
    /// Content-derived identifier, stable across subscription refreshes for
    /// an unchanged endpoint.
    pub fn derive_id(proto_tag: &str, server: &str, port: u16) -> String {
        format!("{}-{}-{}", proto_tag, server.to_ascii_lowercase(), port)
    }

    /// Build the engine outbound object for this node.
    pub fn outbound(&self) -> serde_json::Value {
        let settings = match &self.protocol {
            Protocol::Vmess {
                uuid,
                alter_id,
                security,
                ..
            } => serde_json::json!({
                "vnext": [{
                    "address": self.server,
                    "port": self.port,
                    "users": [{
                        "id": uuid,
                        "alterId": alter_id,
                        "security": security,
                    }]
                }]
            }),
            Protocol::Vless { uuid, flow, .. } => serde_json::json!({
                "vnext": [{
                    "address": self.server,
                    "port": self.port,
                    "users": [{
                        "id": uuid,
                        "encryption": "none",
                        "flow": flow,
                    }]
                }]
            }),
        };

        let t = self.protocol.transport();
        let mut stream = serde_json::json!({ "network": t.network });
        if t.tls {
            stream["security"] = serde_json::json!("tls");
            stream["tlsSettings"] = serde_json::json!({
                "serverName": t.sni.as_deref().unwrap_or(&self.server),
                "allowInsecure": false,
            });
        }
        if t.network == "ws" {
            stream["wsSettings"] = serde_json::json!({
                "path": t.path.as_deref().unwrap_or("/"),
                "headers": { "Host": t.host.as_deref().unwrap_or(&self.server) },
            });
        }

        serde_json::json!({
            "tag": "proxy",
            "protocol": self.protocol.tag(),
            "settings": settings,
            "streamSettings": stream,
        })
    }
}

/// Protocol of the static second hop in chained mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainProtocol {
    Socks,
    Http,
}

/// Static second-hop endpoint used in chained mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticProxy {
    pub server: String,
    pub port: u16,
    pub protocol: ChainProtocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl StaticProxy {
    /// Engine outbound object for the second hop.
    pub fn outbound(&self) -> serde_json::Value {
        let mut server = serde_json::json!({
            "address": self.server,
            "port": self.port,
        });
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            server["users"] = serde_json::json!([{ "user": user, "pass": pass }]);
        }
        let proto = match self.protocol {
            ChainProtocol::Socks => "socks",
            ChainProtocol::Http => "http",
        };
        serde_json::json!({
            "tag": "chain",
            "protocol": proto,
            "settings": { "servers": [server] },
        })
    }
}

/// Single-hop vs two-hop outbound topology.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    #[default]
    Direct,
    Chained,
}

/// Local listener ports exposed by the engine config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenPorts {
    pub socks: u16,
    pub http: u16,
}

impl Default for ListenPorts {
    fn default() -> Self {
        Self {
            socks: 10808,
            http: 10809,
        }
    }
}

/// The one authoritative record of what is currently applied. Mutated only
/// by the config writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveConfig {
    pub current_node_id: String,
    pub mode: ProxyMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_proxy: Option<StaticProxy>,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_ref: Option<String>,
    pub applied_at: DateTime<Utc>,
}

/// Result of probing one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success { latency_ms: u64 },
    Failure { reason: String },
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }

    pub fn latency_ms(&self) -> Option<u64> {
        match self {
            ProbeOutcome::Success { latency_ms } => Some(*latency_ms),
            ProbeOutcome::Failure { .. } => None,
        }
    }
}

/// Ephemeral: held for the duration of a batch plus the most recent batch
/// for status display. Never persisted.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub node_id: String,
    pub outcome: ProbeOutcome,
    pub measured_at: Instant,
}

/// Cached view of the last subscription refresh. Keeps the raw payload so
/// the subscription-origin node set can be rebuilt after a restart without
/// refetching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub url: String,
    pub raw_payload: String,
    pub fetched_at: DateTime<Utc>,
    pub parsed_node_ids: Vec<String>,
    /// Entries dropped because mandatory endpoint fields were absent
    /// (account-metadata banners) or the link failed to parse.
    pub dropped_entries: usize,
}
