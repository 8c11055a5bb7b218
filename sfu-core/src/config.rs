//! Typed configuration boundary (spec.md §6). The key/value map itself is
//! supplied by an external loader (file, environment, CLI); this struct is
//! our side of that boundary, so the rest of the core never matches on
//! strings.

use std::collections::HashMap;
use std::net::IpAddr;

use sfu_shared::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_ip: IpAddr,
    pub announced_ip: IpAddr,
    pub udp_port: u16,
    pub worker_thread_count: usize,
    pub cert_file: String,
    pub key_file: String,
    pub memory_pool_enabled: bool,
    pub memory_pool_max_list_length: usize,
}

impl Config {
    /// Parses a `Config` out of the key/value map spec.md §6 names. Unknown
    /// keys are ignored; a missing required key fails construction
    /// (spec.md §7's Config/Setup error kind).
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let bind_ip = required(map, "bind_ip")?.parse().map_err(|_| Error::ErrConfigInvalidValue {
            key: "bind_ip",
            reason: "not a valid IP address".into(),
        })?;
        let announced_ip = required(map, "announced_ip")?.parse().map_err(|_| Error::ErrConfigInvalidValue {
            key: "announced_ip",
            reason: "not a valid IP address".into(),
        })?;
        let udp_port = required(map, "udp_port")?.parse().map_err(|_| Error::ErrConfigInvalidValue {
            key: "udp_port",
            reason: "not a valid port number".into(),
        })?;
        let worker_thread_count = match map.get("worker_thread_count") {
            Some(v) => v.parse().map_err(|_| Error::ErrConfigInvalidValue {
                key: "worker_thread_count",
                reason: "not a positive integer".into(),
            })?,
            None => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
        };
        let cert_file = required(map, "cert_file")?.to_string();
        let key_file = required(map, "key_file")?.to_string();
        let memory_pool_enabled = match map.get("memory_pool_enabled") {
            Some(v) => v.parse().map_err(|_| Error::ErrConfigInvalidValue {
                key: "memory_pool_enabled",
                reason: "not a boolean".into(),
            })?,
            None => true,
        };
        let memory_pool_max_list_length = match map.get("memory_pool_max_list_length") {
            Some(v) => v.parse().map_err(|_| Error::ErrConfigInvalidValue {
                key: "memory_pool_max_list_length",
                reason: "not a positive integer".into(),
            })?,
            None => 256,
        };

        Ok(Config {
            bind_ip,
            announced_ip,
            udp_port,
            worker_thread_count,
            cert_file,
            key_file,
            memory_pool_enabled,
            memory_pool_max_list_length,
        })
    }
}

fn required<'a>(map: &'a HashMap<String, String>, key: &'static str) -> Result<&'a str> {
    map.get(key).map(|s| s.as_str()).ok_or(Error::ErrConfigMissingKey(key))
}
