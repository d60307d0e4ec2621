//! Platform profiles
//!
//! The wireless station side (`wpa_cli`, `iwlist`) is the same everywhere;
//! what differs between boards is how the access point stack is brought
//! up and down.

use crate::command::{CommandLine, CommandRunner};
use anyhow::{Result, bail};
use log::{info, warn};
use std::{fmt, net::Ipv4Addr, str::FromStr};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlatformKind {
    /// Raspberry Pi style: address, hostapd and udhcpd are separate steps
    #[default]
    Default,
    /// Yocto based boards where the hostapd unit handles address and DHCP
    Edison,
}

impl PlatformKind {
    /// Pick the platform from the kernel identification string
    pub async fn detect<R: CommandRunner>(runner: &R) -> Self {
        match runner.run(&CommandLine::new("uname").arg("-a")).await {
            Ok(uname) if uname.contains("yocto") => PlatformKind::Edison,
            Ok(_) => PlatformKind::Default,
            Err(e) => {
                warn!("platform detection failed ({}), using default: {e}", e.kind());
                PlatformKind::Default
            }
        }
    }

    /// Configured platform if any, detected otherwise
    pub async fn resolve<R: CommandRunner>(configured: Option<Self>, runner: &R) -> Self {
        let kind = match configured {
            Some(kind) => kind,
            None => Self::detect(runner).await,
        };
        info!("platform: {kind}");
        kind
    }
}

impl FromStr for PlatformKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "raspbian" | "pi" => Ok(PlatformKind::Default),
            "edison" | "yocto" => Ok(PlatformKind::Edison),
            other => bail!("unknown platform: {other}"),
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformKind::Default => write!(f, "default"),
            PlatformKind::Edison => write!(f, "edison"),
        }
    }
}

/// Command sequences for one board
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Platform {
    pub kind: PlatformKind,
    pub interface: String,
    pub start_ap: Vec<CommandLine>,
    pub stop_ap: Vec<CommandLine>,
}

impl Platform {
    pub fn new(kind: PlatformKind, interface: &str, ap_address: Ipv4Addr) -> Self {
        let systemctl = |action: &str, unit: &str| CommandLine::new("systemctl").arg(action).arg(unit);

        let (start_ap, stop_ap) = match kind {
            PlatformKind::Default => (
                vec![
                    CommandLine::new("ifconfig")
                        .arg(interface)
                        .arg(ap_address.to_string()),
                    systemctl("start", "hostapd"),
                    systemctl("start", "udhcpd"),
                ],
                vec![systemctl("stop", "udhcpd"), systemctl("stop", "hostapd")],
            ),
            PlatformKind::Edison => (
                vec![systemctl("start", "hostapd")],
                vec![systemctl("stop", "hostapd")],
            ),
        };

        Self {
            kind,
            interface: interface.to_string(),
            start_ap,
            stop_ap,
        }
    }

    pub fn wpa_cli(&self) -> CommandLine {
        CommandLine::new("wpa_cli").arg(format!("-i{}", self.interface))
    }

    pub fn scan(&self) -> CommandLine {
        CommandLine::new("iwlist").arg(&self.interface).arg("scan")
    }
}
