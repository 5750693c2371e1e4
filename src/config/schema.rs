use crate::errors::{UniboxError, UniboxResult};
use crate::providers::Provider;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub instagram: ProviderSettings,
    #[serde(default)]
    pub facebook: ProviderSettings,
}

impl ProvidersConfig {
    pub fn get(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::Instagram => &self.instagram,
            Provider::Facebook => &self.facebook,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub enabled: bool,
    #[serde(default, rename = "accessToken")]
    pub access_token: String,
    /// Token echoed back during the webhook subscription handshake.
    #[serde(default, rename = "verifyToken")]
    pub verify_token: String,
    /// App secret for webhook signature validation. Empty disables the check.
    #[serde(default, rename = "appSecret")]
    pub app_secret: String,
    /// Override for the provider API base URL (tests, proxies).
    #[serde(default, rename = "apiBaseUrl")]
    pub api_base_url: Option<String>,
    #[serde(
        default = "default_relay_drain_interval_ms",
        rename = "relayDrainIntervalMs"
    )]
    pub relay_drain_interval_ms: u64,
    #[serde(
        default = "default_sync_poll_interval_secs",
        rename = "syncPollIntervalSecs"
    )]
    pub sync_poll_interval_secs: u64,
    #[serde(default = "default_sync_page_size", rename = "syncPageSize")]
    pub sync_page_size: usize,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            access_token: String::new(),
            verify_token: String::new(),
            app_secret: String::new(),
            api_base_url: None,
            relay_drain_interval_ms: default_relay_drain_interval_ms(),
            sync_poll_interval_secs: default_sync_poll_interval_secs(),
            sync_page_size: default_sync_page_size(),
        }
    }
}

impl ProviderSettings {
    /// Credential presence check used before connecting.
    pub fn require_credentials(&self, provider: Provider) -> UniboxResult<()> {
        if !self.enabled {
            return Err(UniboxError::Config(format!(
                "{} is not enabled in config",
                provider
            )));
        }
        if self.access_token.trim().is_empty() {
            return Err(UniboxError::Config(format!(
                "{} access token is not configured",
                provider
            )));
        }
        Ok(())
    }
}

fn default_relay_drain_interval_ms() -> u64 {
    1000
}

fn default_sync_poll_interval_secs() -> u64 {
    30
}

fn default_sync_page_size() -> usize {
    25
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8090
}
