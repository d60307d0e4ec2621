use anyhow::{Result, ensure};
use std::fmt;

const MAX_SSID_BYTES: usize = 32;

/// SSID and passphrase submitted through the provisioning form
///
/// Lives for the duration of one handshake. Both fields are trimmed; an
/// empty passphrase selects an open network.
#[derive(Clone, PartialEq, Eq)]
pub struct NetworkCredentials {
    ssid: String,
    password: String,
}

impl NetworkCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self> {
        let ssid = ssid.trim();
        let password = password.trim();

        ensure!(!ssid.is_empty(), "ssid must not be empty");
        ensure!(
            ssid.len() <= MAX_SSID_BYTES,
            "ssid must not be longer than {MAX_SSID_BYTES} bytes"
        );

        Ok(Self {
            ssid: ssid.to_string(),
            password: password.to_string(),
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// `None` for open networks
    pub fn password(&self) -> Option<&str> {
        (!self.password.is_empty()).then_some(self.password.as_str())
    }
}

impl fmt::Debug for NetworkCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkCredentials")
            .field("ssid", &self.ssid)
            .field("open", &self.password.is_empty())
            .finish()
    }
}
