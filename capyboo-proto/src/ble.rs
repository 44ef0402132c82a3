//! BLE GATT identifiers for the Capyboo serial-port service
//!
//! The robot exposes a single service with two characteristics: RX accepts
//! text commands written by the controller, TX notifies the controller with
//! text replies. Provisioning only writes to RX.

use uuid::Uuid;

/// Serial Port Service UUID: 0000fff0-0000-1000-8000-00805f9b34fb
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0000fff0_0000_1000_8000_00805f9b34fb);

/// TX Characteristic UUID (read/notify, robot -> controller)
pub const TX_CHAR_UUID: Uuid = Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb);

/// RX Characteristic UUID (write, controller -> robot)
pub const RX_CHAR_UUID: Uuid = Uuid::from_u128(0x0000fff2_0000_1000_8000_00805f9b34fb);

/// Name the robot advertises unless it was flashed with another one
pub const DEFAULT_DEVICE_NAME: &str = "Capyboo";

/// Text commands understood by the robot on the RX characteristic
pub mod commands {
    /// WiFi provisioning: `wifi:<ssid>:<password>`
    pub const WIFI: &str = "wifi";

    /// Field delimiter inside a command. Never escaped.
    pub const DELIMITER: char = ':';
}
