//! Configuration loaded with Figment
//!
//! Precedence (highest to lowest):
//! 1. Environment variables (prefix `OPSPLANE_`)
//! 2. `./config.toml`
//! 3. XDG config dir: `~/.config/opsplane/config.toml`
//! 4. `/etc/opsplane/config.toml`
//! 5. Defaults below

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    pub nats: Option<NatsConfig>,
}

/// HTTP + gRPC listener configuration (spec §6 "Environment")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    #[serde(default = "default_shutdown_drain_secs")]
    pub shutdown_drain_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_cors_mode")]
    pub cors_mode: String,
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            rpc_port: default_rpc_port(),
            shutdown_drain_secs: default_shutdown_drain_secs(),
            log_level: default_log_level(),
            environment: default_environment(),
            cors_mode: default_cors_mode(),
            body_limit_mb: default_body_limit_mb(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }
}

/// Agent Manager + Stream Mux configuration (spec §4.2)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_downstream_queue_depth")]
    pub downstream_queue_depth: usize,
    #[serde(default = "default_missed_ticks_offline")]
    pub missed_ticks_offline: u32,
    #[serde(default = "default_archive_interval_secs")]
    pub archive_interval_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            downstream_queue_depth: default_downstream_queue_depth(),
            missed_ticks_offline: default_missed_ticks_offline(),
            archive_interval_secs: default_archive_interval_secs(),
        }
    }
}

impl AgentConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn offline_after(&self) -> Duration {
        self.tick_interval() * self.missed_ticks_offline
    }

    pub fn archive_interval(&self) -> Duration {
        Duration::from_secs(self.archive_interval_secs)
    }
}

/// Audit Pipeline configuration (spec §4.1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_audit_workers")]
    pub workers: usize,
    #[serde(default = "default_audit_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_audit_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_audit_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
    #[serde(default = "default_audit_object_cap_bytes")]
    pub object_cap_bytes: usize,
    #[serde(default = "default_audit_field_cap_bytes")]
    pub field_cap_bytes: usize,
    /// `host:port` of a syslog collector to mirror persisted events to, best
    /// effort. Unset disables syslog export entirely.
    #[serde(default)]
    pub syslog_address: Option<String>,
    #[serde(default)]
    pub otlp_export: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_audit_channel_capacity(),
            workers: default_audit_workers(),
            batch_size: default_audit_batch_size(),
            flush_interval_ms: default_audit_flush_interval_ms(),
            enqueue_timeout_ms: default_audit_enqueue_timeout_ms(),
            object_cap_bytes: default_audit_object_cap_bytes(),
            field_cap_bytes: default_audit_field_cap_bytes(),
            syslog_address: None,
            otlp_export: false,
        }
    }
}

impl AuditConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}

/// Probe Scheduler configuration (spec §4.5)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_late_result_multiplier")]
    pub late_result_multiplier: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            late_result_multiplier: default_late_result_multiplier(),
        }
    }
}

/// Task Scheduler configuration (spec §4.6)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
    #[serde(default = "default_lease_renew_secs")]
    pub lease_renew_secs: u64,
    #[serde(default = "default_trigger_queue_depth")]
    pub trigger_queue_depth: usize,
    #[serde(default = "default_retry_backoff_cap_secs")]
    pub retry_backoff_cap_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: default_lease_ttl_secs(),
            lease_renew_secs: default_lease_renew_secs(),
            trigger_queue_depth: default_trigger_queue_depth(),
            retry_backoff_cap_secs: default_retry_backoff_cap_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn lease_renew(&self) -> Duration {
        Duration::from_secs(self.lease_renew_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// If true, a connection failure at startup is logged and the pool is
    /// left unset rather than aborting the boot sequence.
    #[serde(default)]
    pub optional: bool,
    /// If true, the pool is established in the background instead of
    /// blocking `AppState::bootstrap`.
    #[serde(default)]
    pub lazy_init: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub lazy_init: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_nats_max_reconnects")]
    pub max_reconnects: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub lazy_init: bool,
}

fn default_min_connections() -> u32 {
    1
}
fn default_nats_max_reconnects() -> usize {
    60
}

fn default_http_port() -> u16 {
    12306
}
fn default_rpc_port() -> u16 {
    12307
}
fn default_shutdown_drain_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_environment() -> String {
    "development".to_string()
}
fn default_cors_mode() -> String {
    "restrictive".to_string()
}
fn default_body_limit_mb() -> u64 {
    10
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_tick_interval_secs() -> u64 {
    15
}
fn default_downstream_queue_depth() -> usize {
    256
}
fn default_missed_ticks_offline() -> u32 {
    2
}
fn default_archive_interval_secs() -> u64 {
    60
}
fn default_audit_channel_capacity() -> usize {
    1000
}
fn default_audit_workers() -> usize {
    2
}
fn default_audit_batch_size() -> usize {
    50
}
fn default_audit_flush_interval_ms() -> u64 {
    5_000
}
fn default_audit_enqueue_timeout_ms() -> u64 {
    100
}
fn default_audit_object_cap_bytes() -> usize {
    64 * 1024
}
fn default_audit_field_cap_bytes() -> usize {
    16 * 1024
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_late_result_multiplier() -> u32 {
    2
}
fn default_lease_ttl_secs() -> u64 {
    10
}
fn default_lease_renew_secs() -> u64 {
    3
}
fn default_trigger_queue_depth() -> usize {
    16
}
fn default_retry_backoff_cap_secs() -> u64 {
    300
}
fn default_max_connections() -> u32 {
    10
}
fn default_connection_timeout() -> u64 {
    30
}
fn default_redis_max_connections() -> usize {
    10
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_delay() -> u64 {
    1
}

impl Config {
    /// Load configuration from all sources for the given service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("loading configuration from {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("OPSPLANE_").split("__"));

        Ok(figment.extract()?)
    }

    pub fn load() -> Result<Self> {
        Self::load_for_service("opsplane")
    }

    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Ok(base) = xdg::BaseDirectories::with_prefix(service_name) {
            if let Some(p) = base.find_config_file("config.toml") {
                paths.push(p);
            }
        }

        paths.push(PathBuf::from(format!("/etc/{}/config.toml", service_name)));
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_ports() {
        let cfg = Config::default();
        assert_eq!(cfg.server.http_port, 12306);
        assert_eq!(cfg.server.rpc_port, 12307);
        assert_eq!(cfg.audit.channel_capacity, 1000);
        assert_eq!(cfg.audit.batch_size, 50);
        assert_eq!(cfg.audit.enqueue_timeout_ms, 100);
    }
}
