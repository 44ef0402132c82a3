//! Text command framing for the RX characteristic
//!
//! Commands are plain UTF-8 strings with no terminator or checksum. The WiFi
//! command is `wifi:<ssid>:<password>`. Colons inside the SSID or password
//! are sent as-is, so a receiver splitting on `:` cannot always tell the
//! fields apart.

use crate::ble::commands;
use crate::wifi::WifiCredential;

/// Payload for a single RX write
#[derive(Clone, PartialEq, Eq)]
pub struct ProvisioningCommand(String);

impl ProvisioningCommand {
    /// Free text command, sent verbatim (e.g. `weather`).
    pub fn text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this payload carries WiFi credentials
    pub fn is_wifi(&self) -> bool {
        self.0
            .split_once(commands::DELIMITER)
            .is_some_and(|(label, _)| label.eq_ignore_ascii_case(commands::WIFI))
    }
}

// The WiFi payload includes the password, keep it out of logs.
impl std::fmt::Debug for ProvisioningCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_wifi() {
            f.write_str("ProvisioningCommand(wifi:<redacted>)")
        } else {
            f.debug_tuple("ProvisioningCommand").field(&self.0).finish()
        }
    }
}

/// Serialize a credential into `wifi:<ssid>:<password>`.
pub fn format_command(credential: WifiCredential) -> ProvisioningCommand {
    let mut payload = String::with_capacity(
        commands::WIFI.len() + 2 + credential.ssid().len() + credential.password().len(),
    );
    payload.push_str(commands::WIFI);
    payload.push(commands::DELIMITER);
    payload.push_str(credential.ssid());
    payload.push(commands::DELIMITER);
    payload.push_str(credential.password());
    ProvisioningCommand(payload)
}

/// Split a WiFi payload on its first two delimiters, the way the robot does.
///
/// The robot lowercases what it receives, so the label matches in any case. A
/// payload with no second delimiter carries an empty password.
///
/// Returns `(ssid, password)`. This only recovers the original fields when the
/// SSID contains no colon.
pub fn parse_wifi_command(payload: &str) -> Option<(&str, &str)> {
    let (label, fields) = payload.split_once(commands::DELIMITER)?;
    if !label.eq_ignore_ascii_case(commands::WIFI) {
        return None;
    }
    Some(fields.split_once(commands::DELIMITER).unwrap_or((fields, "")))
}
