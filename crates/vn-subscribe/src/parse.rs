//! Normalization of subscription payloads into `Node` records.
//!
//! A payload is either base64 (standard or URL-safe, padding optional) over
//! a newline-separated link list, or the link list itself. Each line parses
//! as a `vmess://` or `vless://` URI; entries that lack any mandatory
//! endpoint field (host, port, user id) are account-metadata banners and are
//! dropped and counted, never matched by display-name heuristics.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use tracing::{debug, warn};

use vn_core::types::{Node, NodeSource, Protocol, Transport};

use crate::model::SubsError;
use crate::region::infer_region;

#[derive(Debug)]
pub struct ParseReport {
    pub nodes: Vec<Node>,
    /// Banner/malformed/duplicate entries skipped.
    pub dropped: usize,
}

/// Parse a raw payload. Valid entries are kept across per-entry failures;
/// zero valid entries is an error, not a partial result.
pub fn parse_payload(raw: &str) -> Result<ParseReport, SubsError> {
    let text = decode_payload(raw);

    let mut nodes: Vec<Node> = Vec::new();
    let mut dropped = 0usize;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed = if line.starts_with("vmess://") {
            parse_vmess(line)
        } else if line.starts_with("vless://") {
            parse_vless(line)
        } else {
            debug!(prefix = %line.chars().take(16).collect::<String>(), "unsupported link scheme");
            None
        };
        match parsed {
            Some(node) => {
                // Node ids are content-derived; a feed listing the same
                // endpoint twice keeps the first occurrence.
                if nodes.iter().any(|n| n.id == node.id) {
                    dropped += 1;
                } else {
                    nodes.push(node);
                }
            }
            None => dropped += 1,
        }
    }

    if nodes.is_empty() {
        return Err(SubsError::NoValidNodes { dropped });
    }
    if dropped > 0 {
        warn!(kept = nodes.len(), dropped, "subscription contained unusable entries");
    }
    Ok(ParseReport { nodes, dropped })
}

/// Base64-decode the payload if it is base64; otherwise treat it as a raw
/// link list. Link URIs contain characters outside the base64 alphabet, so
/// a successful decode is unambiguous.
fn decode_payload(raw: &str) -> String {
    match b64_decode(raw.trim()) {
        Some(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| raw.trim().to_string()),
        None => raw.trim().to_string(),
    }
}

/// Lenient base64: accepts URL-safe alphabet, embedded whitespace, and
/// missing padding.
fn b64_decode(input: &str) -> Option<Vec<u8>> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_end_matches('=');
    let mut padded = trimmed.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    STANDARD.decode(padded).ok()
}

/// `vmess://<base64 json>` with fields ps/add/port/id/aid/scy/net/tls/sni/host/path.
fn parse_vmess(link: &str) -> Option<Node> {
    let body = link.strip_prefix("vmess://")?;
    let decoded = b64_decode(body)?;
    let v: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    let obj = v.as_object()?;

    // Mandatory endpoint fields; their absence marks a metadata banner.
    let server = non_empty(obj.get("add")?.as_str()?)?;
    let port = port_field(obj.get("port")?)?;
    let uuid = non_empty(obj.get("id")?.as_str()?)?;

    let name = obj
        .get("ps")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{server}:{port}"));

    let alter_id = obj
        .get("aid")
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(0) as u32;
    let security = obj
        .get("scy")
        .and_then(|v| v.as_str())
        .unwrap_or("auto")
        .to_string();

    let tls_field = obj.get("tls").and_then(|v| v.as_str()).unwrap_or("");
    let transport = Transport {
        network: obj
            .get("net")
            .and_then(|v| v.as_str())
            .unwrap_or("tcp")
            .to_string(),
        tls: matches!(tls_field, "tls" | "xtls"),
        sni: str_field(obj, "sni"),
        host: str_field(obj, "host"),
        path: str_field(obj, "path"),
        alpn: obj
            .get("alpn")
            .and_then(|v| v.as_str())
            .map(|s| s.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
    };

    Some(Node {
        id: Node::derive_id("vmess", &server, port),
        region: infer_region(&name),
        name,
        server,
        port,
        protocol: Protocol::Vmess {
            uuid,
            alter_id,
            security,
            transport,
        },
        source: NodeSource::Subscription,
        added_at: Utc::now(),
    })
}

/// `vless://uuid@host:port?type=..&security=..&sni=..#name`.
fn parse_vless(link: &str) -> Option<Node> {
    let body = link.strip_prefix("vless://")?;

    let (main, name_raw) = match body.rfind('#') {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };
    let (addr_part, query) = main.split_once('?').unwrap_or((main, ""));
    let (uuid, server_port) = addr_part.split_once('@')?;
    let (server, port_str) = split_host_port(server_port)?;

    let uuid = non_empty(uuid)?;
    let server = non_empty(server)?;
    let port: u16 = port_str.parse().ok().filter(|p| *p > 0)?;

    let name = name_raw
        .and_then(|n| urlencoding::decode(n).ok())
        .map(|n| n.into_owned())
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("{server}:{port}"));

    let mut flow = String::new();
    let mut transport = Transport::default();
    for param in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = param.split_once('=').unwrap_or((param, ""));
        let value = urlencoding::decode(value)
            .map(|v| v.into_owned())
            .unwrap_or_default();
        match key {
            "type" => transport.network = value,
            "security" => transport.tls = value == "tls" || value == "xtls",
            "sni" => transport.sni = Some(value),
            "host" => transport.host = Some(value),
            "path" => transport.path = Some(value),
            "flow" => flow = value,
            "alpn" => transport.alpn = value.split(',').map(str::to_string).collect(),
            _ => {}
        }
    }

    Some(Node {
        id: Node::derive_id("vless", &server, port),
        region: infer_region(&name),
        name,
        server,
        port,
        protocol: Protocol::Vless {
            uuid,
            flow,
            transport,
        },
        source: NodeSource::Subscription,
        added_at: Utc::now(),
    })
}

/// Split `host:port`, unwrapping bracketed IPv6 literals (`[::1]:443`).
fn split_host_port(input: &str) -> Option<(&str, &str)> {
    if let Some(rest) = input.strip_prefix('[') {
        let (host, rest) = rest.split_once(']')?;
        Some((host, rest.strip_prefix(':')?))
    } else {
        input.rsplit_once(':')
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn str_field(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn port_field(v: &serde_json::Value) -> Option<u16> {
    let port = match v {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }?;
    (port > 0).then_some(port)
}
