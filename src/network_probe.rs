//! Wireless station and access point control through the system tools
//!
//! `wpa_cli` for the supplicant, `iwlist` for scanning and the platform's
//! AP command sequences. Every operation fails with a [`CommandError`].

use crate::{
    command::{CommandLine, CommandRunner},
    error::CommandError,
    platform::Platform,
    services::credentials::NetworkCredentials,
};
use log::{debug, info, warn};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use serde::Serialize;
use std::fmt;
use trait_variant::make;

/// Supplicant state as reported by `wpa_state=`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Completed,
    Disconnected,
    Inactive,
    /// Any transitional state (`SCANNING`, `ASSOCIATING`, ...)
    Other(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Completed)
    }
}

impl From<&str> for ConnectionStatus {
    fn from(state: &str) -> Self {
        match state.trim() {
            "COMPLETED" => ConnectionStatus::Completed,
            "DISCONNECTED" => ConnectionStatus::Disconnected,
            "INACTIVE" => ConnectionStatus::Inactive,
            other => ConnectionStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Completed => f.write_str("COMPLETED"),
            ConnectionStatus::Disconnected => f.write_str("DISCONNECTED"),
            ConnectionStatus::Inactive => f.write_str("INACTIVE"),
            ConnectionStatus::Other(state) => f.write_str(state),
        }
    }
}

/// Visible SSIDs, strongest first, without duplicates
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScanResult(Vec<String>);

impl ScanResult {
    pub fn new(ssids: Vec<String>) -> Self {
        Self(ssids)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ScanResult {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait NetworkProbe {
    async fn status(&self) -> Result<ConnectionStatus, CommandError>;
    /// SSID of the current association, if any
    async fn connected_network(&self) -> Result<Option<String>, CommandError>;
    /// Networks already defined in the supplicant configuration
    async fn known_networks(&self) -> Result<Vec<String>, CommandError>;
    /// Scan, re-running up to `retries` more times while the result is empty
    async fn scan(&self, retries: u32) -> Result<ScanResult, CommandError>;
    async fn start_ap(&self) -> Result<(), CommandError>;
    async fn stop_ap(&self) -> Result<(), CommandError>;
    /// Add, configure, enable and persist a supplicant network
    async fn define_network(&self, credentials: &NetworkCredentials) -> Result<(), CommandError>;
}

/// [`NetworkProbe`] backed by `wpa_cli`, `iwlist` and the platform's AP units
#[derive(Clone, Debug)]
pub struct WpaCliProbe<R> {
    runner: R,
    platform: Platform,
}

impl<R: CommandRunner + Sync> WpaCliProbe<R> {
    pub fn new(runner: R, platform: Platform) -> Self {
        Self { runner, platform }
    }

    async fn run_all(&self, commands: &[CommandLine]) -> Result<(), CommandError> {
        for command in commands {
            self.runner.run(command).await?;
        }
        Ok(())
    }

    /// Run a `wpa_cli` request whose only acceptable answer is `OK`
    async fn request_ok(&self, command: CommandLine) -> Result<(), CommandError> {
        let reply = self.runner.run(&command).await?;

        if reply.trim() != "OK" {
            return Err(CommandError::Parse {
                command: command.to_string(),
                detail: format!("expected OK, got {:?}", reply.trim()),
            });
        }

        Ok(())
    }

    async fn supplicant_status(&self) -> Result<(CommandLine, String), CommandError> {
        let command = self.platform.wpa_cli().arg("status");
        let output = self.runner.run(&command).await?;
        Ok((command, output))
    }
}

impl<R: CommandRunner + Sync> NetworkProbe for WpaCliProbe<R> {
    async fn status(&self) -> Result<ConnectionStatus, CommandError> {
        let (command, output) = self.supplicant_status().await?;

        status_field(&output, "wpa_state")
            .map(ConnectionStatus::from)
            .ok_or_else(|| CommandError::Parse {
                command: command.to_string(),
                detail: "no wpa_state in status output".to_string(),
            })
    }

    async fn connected_network(&self) -> Result<Option<String>, CommandError> {
        let (_, output) = self.supplicant_status().await?;

        Ok(status_field(&output, "ssid").map(ToString::to_string))
    }

    async fn known_networks(&self) -> Result<Vec<String>, CommandError> {
        let command = self.platform.wpa_cli().arg("list_networks");
        let output = self.runner.run(&command).await?;

        Ok(parse_network_list(&output))
    }

    async fn scan(&self, retries: u32) -> Result<ScanResult, CommandError> {
        let command = self.platform.scan();
        let mut attempt = 0;

        loop {
            let retry_left = attempt < retries;
            attempt += 1;

            match self.runner.run(&command).await {
                Ok(output) => {
                    let result = parse_scan_output(&output);
                    if !result.is_empty() || !retry_left {
                        debug!("scan found {} networks", result.len());
                        return Ok(result);
                    }
                    info!("scan returned no networks, retrying ({attempt}/{retries})");
                }
                Err(e) if retry_left => {
                    warn!("scan failed ({}), retrying ({attempt}/{retries}): {e}", e.kind());
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn start_ap(&self) -> Result<(), CommandError> {
        self.run_all(&self.platform.start_ap).await
    }

    async fn stop_ap(&self) -> Result<(), CommandError> {
        self.run_all(&self.platform.stop_ap).await
    }

    async fn define_network(&self, credentials: &NetworkCredentials) -> Result<(), CommandError> {
        let add = self.platform.wpa_cli().arg("add_network");
        let reply = self.runner.run(&add).await?;
        let id = reply.trim();

        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CommandError::Parse {
                command: add.to_string(),
                detail: format!("expected network id, got {id:?}"),
            });
        }

        let set_network = || self.platform.wpa_cli().arg("set_network").arg(id);

        self.request_ok(set_network().arg("ssid").arg(quoted(credentials.ssid())))
            .await?;

        match credentials.password() {
            Some(password) => {
                self.request_ok(set_network().arg("psk").secret_arg(quoted(password)))
                    .await?
            }
            None => {
                self.request_ok(set_network().arg("key_mgmt").arg("NONE"))
                    .await?
            }
        }

        self.request_ok(self.platform.wpa_cli().arg("enable_network").arg(id))
            .await?;
        self.request_ok(self.platform.wpa_cli().arg("save_config"))
            .await?;

        info!("network {} defined as id {id}", credentials.ssid());

        Ok(())
    }
}

fn quoted(value: &str) -> String {
    format!("\"{value}\"")
}

/// Value of a `key=value` line of `wpa_cli status`
fn status_field<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    output.lines().find_map(|line| {
        line.strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
    })
}

/// Second column of `wpa_cli list_networks`, header skipped
fn parse_network_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| line.split('\t').nth(1))
        .filter(|ssid| !ssid.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Turn `iwlist <iface> scan` output into a [`ScanResult`]
///
/// Each `ESSID:"..."` line is paired with the last `Quality=N` seen before
/// it; cells without a quality rank weakest.
pub fn parse_scan_output(output: &str) -> ScanResult {
    let mut quality: Option<u32> = None;
    let mut cells: Vec<(String, Option<u32>)> = Vec::new();

    for line in output.lines() {
        if let Some(rest) = line.split_once("Quality=").map(|(_, rest)| rest) {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            quality = digits.parse().ok();
            continue;
        }

        let Some(rest) = line.split_once("ESSID:\"").map(|(_, rest)| rest) else {
            continue;
        };
        let Some((ssid, _)) = rest.split_once('"') else {
            continue;
        };

        if !ssid.is_empty() && !ssid.contains("\\x00") {
            cells.push((ssid.to_string(), quality));
        }
        quality = None;
    }

    // stable, so equal qualities keep scan order
    cells.sort_by(|(_, a), (_, b)| b.cmp(a));

    let mut ssids: Vec<String> = Vec::with_capacity(cells.len());
    for (ssid, _) in cells {
        if !ssids.contains(&ssid) {
            ssids.push(ssid);
        }
    }

    ScanResult(ssids)
}
