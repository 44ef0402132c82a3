//! Provisioning flow - hand WiFi credentials to a robot
//!
//! The flow owns the [`TransportAdapter`] it is given and drives it one step
//! at a time. Nothing is retried and a successful run keeps the connection
//! open; the caller decides when to disconnect.

use std::time::Duration;

use capyboo_proto::{
    ProvisioningCommand, ValidationError, format_command, parse_wifi_command, validate,
};
use log::info;

use crate::adapter::{ActiveConnection, AdapterError, PeripheralHandle, TransportAdapter};
use crate::radio::Radio;

#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("command must not be empty")]
    EmptyCommand,
}

pub struct Provisioner<R: Radio> {
    adapter: TransportAdapter<R>,
    scan_timeout: Option<Duration>,
}

impl<R: Radio> Provisioner<R> {
    pub fn new(adapter: TransportAdapter<R>) -> Self {
        Self {
            adapter,
            scan_timeout: None,
        }
    }

    /// Bound every scan; `None` scans until a match or an error.
    pub fn with_scan_timeout(mut self, scan_timeout: Option<Duration>) -> Self {
        self.scan_timeout = scan_timeout;
        self
    }

    pub fn adapter(&self) -> &TransportAdapter<R> {
        &self.adapter
    }

    pub async fn await_ready(&self) -> Result<(), ProvisioningError> {
        Ok(self.adapter.await_ready().await?)
    }

    pub async fn scan(
        &self,
        name: &str,
    ) -> Result<PeripheralHandle<R::Peripheral>, ProvisioningError> {
        Ok(self.adapter.scan(name, self.scan_timeout).await?)
    }

    pub async fn connect(
        &self,
        handle: &PeripheralHandle<R::Peripheral>,
    ) -> Result<ActiveConnection<R::Peripheral>, ProvisioningError> {
        Ok(self.adapter.connect(handle).await?)
    }

    /// Validate the credentials and write `wifi:<ssid>:<password>`.
    pub async fn send(&self, ssid: &str, password: &str) -> Result<(), ProvisioningError> {
        let credential = validate(ssid, password)?;
        self.write(&format_command(credential)).await
    }

    /// Write a free text command such as `weather`.
    ///
    /// Text the robot would read as a WiFi command, in any letter case and
    /// with or without a password field, goes through the same validation as
    /// [`Provisioner::send`].
    pub async fn send_text(&self, text: &str) -> Result<(), ProvisioningError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ProvisioningError::EmptyCommand);
        }
        if let Some((ssid, password)) = parse_wifi_command(text) {
            validate(ssid, password)?;
        }
        self.write(&ProvisioningCommand::text(text)).await
    }

    async fn write(&self, command: &ProvisioningCommand) -> Result<(), ProvisioningError> {
        let connection = self.adapter.active().ok_or(AdapterError::NotConnected)?;
        info!("Sending {command:?} to {}", connection.handle());
        self.adapter.write(&connection, command.as_bytes()).await?;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), ProvisioningError> {
        if let Some(connection) = self.adapter.active() {
            self.adapter.disconnect(&connection).await?;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.adapter.is_connected()
    }

    /// Release every transport resource; for shutdown paths.
    pub async fn teardown(&self) {
        self.adapter.teardown().await;
    }

    /// Ready, scan, connect, validate and write, stopping at the first error.
    pub async fn run(
        &self,
        device_name: &str,
        ssid: &str,
        password: &str,
    ) -> Result<(), ProvisioningError> {
        self.await_ready().await?;
        let handle = self.scan(device_name).await?;
        self.connect(&handle).await?;
        self.send(ssid, password).await?;
        info!("WiFi credentials sent to {handle}");
        Ok(())
    }
}
