//! Capyboo provisioning protocol - GATT identifiers, credentials and framing

pub mod ble;
mod command;
mod wifi;

pub use command::{ProvisioningCommand, format_command, parse_wifi_command};
pub use wifi::{MAX_PASSWORD_LEN, MAX_SSID_LEN, ValidationError, WifiCredential, validate};
