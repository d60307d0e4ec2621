use crate::{
    command::CommandLine,
    platform::PlatformKind,
    services::connectivity::{ConnectivitySettings, RetryBudget},
};
use anyhow::{Context, Result};
use std::{env, fmt::Display, net::Ipv4Addr, str::FromStr, sync::OnceLock, time::Duration};

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Provisioning web form
    pub ui: UiConfig,

    /// Wireless interface and access point
    pub wifi: WifiConfig,

    /// Polling, scanning and handshake timing
    pub connectivity: ConnectivitySettings,

    /// What runs once the device is online
    pub next_stage: NextStageConfig,
}

#[derive(Clone, Debug)]
pub struct UiConfig {
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct WifiConfig {
    pub interface: String,
    pub ap_address: Ipv4Addr,
    /// `None` means detect from `uname -a`
    pub platform: Option<PlatformKind>,
}

#[derive(Clone, Debug)]
pub struct NextStageConfig {
    pub command: Option<CommandLine>,
}

/// Variable lookup, `env::var` in production
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl AppConfig {
    /// Get or load the application configuration
    ///
    /// The first successful call loads and validates everything from the
    /// environment; later calls return the cached instance.
    pub fn get() -> Result<&'static Self> {
        static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

        if let Some(config) = APP_CONFIG.get() {
            return Ok(config);
        }

        let config = Self::load_from(&|key| env::var(key).ok())?;

        Ok(APP_CONFIG.get_or_init(|| config))
    }

    pub fn load_from(lookup: Lookup<'_>) -> Result<Self> {
        Ok(Self {
            ui: UiConfig::load(lookup)?,
            wifi: WifiConfig::load(lookup)?,
            connectivity: load_connectivity(lookup)?,
            next_stage: NextStageConfig::load(lookup)?,
        })
    }
}

impl UiConfig {
    fn load(lookup: Lookup<'_>) -> Result<Self> {
        let port = parse_or(lookup, "UI_PORT", 80)?;

        Ok(Self { port })
    }
}

impl WifiConfig {
    fn load(lookup: Lookup<'_>) -> Result<Self> {
        let interface = lookup("WIFI_INTERFACE")
            .map(|interface| interface.trim().to_string())
            .filter(|interface| !interface.is_empty())
            .unwrap_or_else(|| "wlan0".to_string());

        let ap_address = parse_or(lookup, "AP_ADDRESS", Ipv4Addr::new(10, 0, 0, 1))?;

        let platform = match lookup("WIFI_PLATFORM") {
            None => None,
            Some(name) if name.trim().is_empty() || name.trim() == "auto" => None,
            Some(name) => Some(
                name.parse::<PlatformKind>()
                    .context("failed to parse WIFI_PLATFORM")?,
            ),
        };

        Ok(Self {
            interface,
            ap_address,
            platform,
        })
    }
}

fn load_connectivity(lookup: Lookup<'_>) -> Result<ConnectivitySettings> {
    let max_attempts = parse_or(lookup, "WAIT_MAX_ATTEMPTS", 20)?;
    let interval = millis_or(lookup, "WAIT_INTERVAL_MS", 3000)?;

    let retry_budget =
        RetryBudget::new(max_attempts, interval).context("failed to parse WAIT_MAX_ATTEMPTS")?;

    Ok(ConnectivitySettings {
        retry_budget,
        scan_retries: parse_or(lookup, "SCAN_RETRIES", 10)?,
        response_grace: millis_or(lookup, "RESPONSE_GRACE_MS", 2000)?,
        teardown_grace: millis_or(lookup, "TEARDOWN_GRACE_MS", 5000)?,
    })
}

impl NextStageConfig {
    fn load(lookup: Lookup<'_>) -> Result<Self> {
        let command = lookup("NEXT_STAGE_COMMAND")
            .map(|line| {
                CommandLine::parse(&line).context("failed to parse NEXT_STAGE_COMMAND")
            })
            .transpose()?;

        Ok(Self { command })
    }
}

fn parse_or<T>(lookup: Lookup<'_>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("failed to parse {key}: {e} ({value:?})")),
    }
}

fn millis_or(lookup: Lookup<'_>, key: &str, default: u64) -> Result<Duration> {
    parse_or(lookup, key, default).map(Duration::from_millis)
}
