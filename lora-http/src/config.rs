//! Load config from file and environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use lora_core::Recipient;
use serde::Deserialize;
use tracing::warn;

use crate::adapter::AdapterOptions;

/// Daemon configuration. File: ~/.config/loranet/config.toml or /etc/loranet/config.toml.
/// Env overrides: LORANET_LISTEN_ADDR, LORANET_CLIENT_TIMEOUT_MS, LORANET_RESPONSE_TIMEOUT_MS,
/// LORANET_READ_TIMEOUT_MS, LORANET_BROADCAST (comma separated URLs).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP listen address (default 0.0.0.0:3000).
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Bound on each outbound recipient call, in ms (default 5000).
    #[serde(default = "default_client_timeout_ms")]
    pub client_timeout_ms: u64,
    /// Bound a handler waits for the consumer, in ms (default 1000).
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Bound on receiving a whole request from a client, in ms (default 10000).
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Recipient URLs packets are broadcast to (POST). Empty disables forwarding.
    #[serde(default)]
    pub broadcast: Vec<String>,
    /// Serve /status/ to loopback callers only (default true).
    #[serde(default = "default_status_loopback_only")]
    pub status_loopback_only: bool,
    /// Fallback log filter when RUST_LOG is unset (default "info").
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}
fn default_client_timeout_ms() -> u64 {
    5000
}
fn default_response_timeout_ms() -> u64 {
    1000
}
fn default_read_timeout_ms() -> u64 {
    10_000
}
fn default_status_loopback_only() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            client_timeout_ms: default_client_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            broadcast: Vec::new(),
            status_loopback_only: default_status_loopback_only(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions {
            client_timeout: Duration::from_millis(self.client_timeout_ms),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            broadcast: self
                .broadcast
                .iter()
                .map(|url| Recipient::new(url.clone(), "POST"))
                .collect(),
        }
    }

    fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(s) = var("LORANET_LISTEN_ADDR") {
            if let Ok(a) = s.parse() {
                self.listen_addr = a;
            }
        }
        if let Some(s) = var("LORANET_CLIENT_TIMEOUT_MS") {
            if let Ok(ms) = s.parse() {
                self.client_timeout_ms = ms;
            }
        }
        if let Some(s) = var("LORANET_RESPONSE_TIMEOUT_MS") {
            if let Ok(ms) = s.parse() {
                self.response_timeout_ms = ms;
            }
        }
        if let Some(s) = var("LORANET_READ_TIMEOUT_MS") {
            if let Ok(ms) = s.parse() {
                self.read_timeout_ms = ms;
            }
        }
        if let Some(s) = var("LORANET_BROADCAST") {
            self.broadcast = s
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from)
                .collect();
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    c.apply_env(|k| std::env::var(k).ok());
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/loranet/config.toml"));
    }
    out.push(PathBuf::from("/etc/loranet/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p) {
                Ok(s) => match toml::from_str::<Config>(&s) {
                    Ok(c) => return Some(c),
                    Err(e) => warn!("{}: {}", p.display(), e),
                },
                Err(e) => warn!("{}: {}", p.display(), e),
            }
            break;
        }
    }
    None
}
