//! Capyboo BLE Controller
//!
//! BLE central that hands WiFi credentials (and other text commands) to a
//! Capyboo robot.
//!
//! # Example
//!
//! ```ignore
//! use capyboo_ble_controller::{ControllerConfig, Provisioner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ControllerConfig::default();
//!     let provisioner = Provisioner::system(&config).await?;
//!
//!     provisioner.run(&config.device_name, "MySSID", "MyPassword").await?;
//!     provisioner.disconnect().await?;
//!
//!     Ok(())
//! }
//! ```

mod adapter;
pub mod ble;
mod config;
#[cfg(test)]
mod mock;
mod provision;
pub mod radio;

pub use adapter::{
    ActiveConnection, AdapterError, LinkState, PeripheralHandle, Timeouts, TransportAdapter,
};
pub use config::{CONFIG_FILE, ConfigError, ControllerConfig, capyboo_home};
pub use provision::{Provisioner, ProvisioningError};
pub use radio::{AdapterState, Advertisement, Radio, RadioError, WireEncoding};

pub use capyboo_proto::{
    ProvisioningCommand, ValidationError, WifiCredential, format_command, validate,
};

use ble::BtleRadio;

impl Provisioner<BtleRadio> {
    /// Provisioner over the system Bluetooth stack, set up from `config`.
    pub async fn system(config: &ControllerConfig) -> Result<Self, RadioError> {
        let radio = BtleRadio::new(config.adapter_index)
            .await?
            .with_encoding(config.encoding);
        let adapter = TransportAdapter::new(radio).with_timeouts(config.timeouts());
        Ok(Provisioner::new(adapter).with_scan_timeout(config.scan_timeout()))
    }
}
