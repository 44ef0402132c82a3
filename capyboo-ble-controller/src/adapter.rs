//! Transport adapter - owns at most one BLE central connection
//!
//! Lifecycle: `Idle -> AdapterReady -> Scanning -> Found -> Connecting ->
//! Connected -> Idle`. Writes are only legal while `Connected`. Every
//! subscription taken from the [`Radio`] (state changes, discovery) is an owned
//! stream that is dropped when the operation returns, whatever the outcome.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use capyboo_proto::ble::{RX_CHAR_UUID, SERVICE_UUID};
use futures::StreamExt;
use log::{debug, info, warn};

use crate::radio::{Advertisement, Radio, RadioError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    AdapterReady,
    Scanning,
    Found,
    Connecting,
    Connected,
}

/// A peripheral matched during a scan
#[derive(Debug, Clone)]
pub struct PeripheralHandle<P> {
    pub id: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    peripheral: P,
}

impl<P> PeripheralHandle<P> {
    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }
}

impl<P> std::fmt::Display for PeripheralHandle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.id),
            None => f.write_str(&self.id),
        }
    }
}

/// Proof of a live connection. Stale once that connection is torn down.
#[derive(Debug, Clone)]
pub struct ActiveConnection<P> {
    generation: u64,
    handle: PeripheralHandle<P>,
}

impl<P> ActiveConnection<P> {
    pub fn handle(&self) -> &PeripheralHandle<P> {
        &self.handle
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),
    #[error("scan failed: {0}")]
    ScanFailed(#[source] RadioError),
    #[error("could not find {name} within {timeout:?}, make sure it is powered on and nearby")]
    DeviceNotFound { name: String, timeout: Duration },
    #[error("connection failed: {0}")]
    ConnectFailed(#[source] RadioError),
    #[error("not connected to a device")]
    NotConnected,
    #[error("failed to send data: {0}")]
    WriteFailed(#[source] RadioError),
    #[error("failed to disconnect: {0}")]
    DisconnectFailed(#[source] RadioError),
}

/// Optional bounds on transport operations. `None` waits forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Option<Duration>,
    pub write: Option<Duration>,
}

struct Slot<P> {
    state: LinkState,
    generation: u64,
    scanning: bool,
    // peripheral of a connect that has not finished yet
    connecting: Option<P>,
    active: Option<ActiveConnection<P>>,
}

pub struct TransportAdapter<R: Radio> {
    radio: R,
    timeouts: Timeouts,
    slot: Mutex<Slot<R::Peripheral>>,
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    operation: impl Future<Output = Result<T, RadioError>>,
) -> Result<T, RadioError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| RadioError::Timeout(limit))?,
        None => operation.await,
    }
}

impl<R: Radio> TransportAdapter<R> {
    pub fn new(radio: R) -> Self {
        Self {
            radio,
            timeouts: Timeouts::default(),
            slot: Mutex::new(Slot {
                state: LinkState::Idle,
                generation: 0,
                scanning: false,
                connecting: None,
                active: None,
            }),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    // The slot is never held across an await, so a poisoned lock still holds
    // consistent data.
    fn slot(&self) -> MutexGuard<'_, Slot<R::Peripheral>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> LinkState {
        self.slot().state
    }

    pub fn is_connected(&self) -> bool {
        self.slot().active.is_some()
    }

    pub fn active(&self) -> Option<ActiveConnection<R::Peripheral>> {
        self.slot().active.clone()
    }

    fn is_current(&self, connection: &ActiveConnection<R::Peripheral>) -> bool {
        self.slot()
            .active
            .as_ref()
            .is_some_and(|active| active.generation == connection.generation)
    }

    /// Wait until the radio is powered on.
    ///
    /// Fails on a terminal state (off, unsupported, unauthorized) or if the
    /// platform stops reporting state changes.
    pub async fn await_ready(&self) -> Result<(), AdapterError> {
        // Subscribe first so a transition between the read and the
        // subscription cannot be lost.
        let mut changes = self
            .radio
            .state_changes()
            .await
            .map_err(|e| AdapterError::AdapterUnavailable(e.to_string()))?;
        let mut state = self
            .radio
            .state()
            .await
            .map_err(|e| AdapterError::AdapterUnavailable(e.to_string()))?;

        loop {
            debug!("Bluetooth adapter is {state}");
            if state.is_ready() {
                break;
            }
            if state.is_terminal() {
                return Err(AdapterError::AdapterUnavailable(format!(
                    "Bluetooth is {state}, please enable Bluetooth"
                )));
            }
            state = match changes.next().await {
                Some(state) => state,
                None => {
                    return Err(AdapterError::AdapterUnavailable(
                        "adapter stopped reporting its state".to_string(),
                    ));
                }
            };
        }

        let mut slot = self.slot();
        if slot.state == LinkState::Idle {
            slot.state = LinkState::AdapterReady;
        }
        info!("Bluetooth adapter ready");
        Ok(())
    }

    fn begin_scan(&self) {
        let mut slot = self.slot();
        slot.scanning = true;
        if slot.active.is_none() {
            slot.state = LinkState::Scanning;
        }
    }

    async fn end_scan(&self, found: bool) {
        let was_scanning = {
            let mut slot = self.slot();
            if slot.active.is_none() {
                slot.state = if found { LinkState::Found } else { LinkState::AdapterReady };
            }
            std::mem::take(&mut slot.scanning)
        };
        if was_scanning
            && let Err(e) = self.radio.stop_scan().await
        {
            warn!("Failed to stop BLE scan: {e}");
        }
    }

    /// Sweep until a peripheral advertises exactly `name`.
    ///
    /// With a `timeout`, gives up with [`AdapterError::DeviceNotFound`]. The
    /// sweep is stopped before returning on every path.
    pub async fn scan(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<PeripheralHandle<R::Peripheral>, AdapterError> {
        info!("Scanning for {name}...");
        self.begin_scan();
        let mut discoveries = match self.radio.start_scan().await {
            Ok(discoveries) => discoveries,
            Err(e) => {
                self.end_scan(false).await;
                return Err(AdapterError::ScanFailed(e));
            }
        };

        let search = async {
            while let Some(discovery) = discoveries.next().await {
                match discovery {
                    Err(e) => return Err(AdapterError::ScanFailed(e)),
                    Ok((peripheral, advertisement)) => {
                        debug!("Saw {:?} ({})", advertisement.name, advertisement.id);
                        if advertisement.name.as_deref() == Some(name) {
                            return Ok(PeripheralHandle {
                                id: advertisement.id,
                                name: advertisement.name,
                                rssi: advertisement.rssi,
                                peripheral,
                            });
                        }
                    }
                }
            }
            Err(AdapterError::ScanFailed(RadioError::Other(
                "discovery stream ended".to_string(),
            )))
        };

        let outcome = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, search)
                .await
                .unwrap_or_else(|_| {
                    Err(AdapterError::DeviceNotFound {
                        name: name.to_string(),
                        timeout,
                    })
                }),
            None => search.await,
        };

        drop(discoveries);
        self.end_scan(outcome.is_ok()).await;

        if let Ok(handle) = &outcome {
            info!("Found device: {handle}");
        }
        outcome
    }

    /// Sweep for `duration` and list every distinct advertiser, by id.
    pub async fn discover(&self, duration: Duration) -> Result<Vec<Advertisement>, AdapterError> {
        self.begin_scan();
        let mut discoveries = match self.radio.start_scan().await {
            Ok(discoveries) => discoveries,
            Err(e) => {
                self.end_scan(false).await;
                return Err(AdapterError::ScanFailed(e));
            }
        };

        let mut seen: Vec<Advertisement> = Vec::new();
        let collect = async {
            while let Some(discovery) = discoveries.next().await {
                let (_, advertisement) = match discovery {
                    Ok(found) => found,
                    Err(e) => return Err(AdapterError::ScanFailed(e)),
                };
                match seen.iter_mut().find(|a| a.id == advertisement.id) {
                    Some(known) => {
                        // Names often only arrive in a later scan response.
                        if advertisement.name.is_some() {
                            known.name = advertisement.name;
                        }
                        known.rssi = advertisement.rssi.or(known.rssi);
                    }
                    None => seen.push(advertisement),
                }
            }
            Ok(())
        };

        let outcome = match tokio::time::timeout(duration, collect).await {
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) | Err(_) => Ok(()),
        };

        drop(discoveries);
        self.end_scan(false).await;
        outcome.map(|()| seen)
    }

    async fn open(&self, peripheral: &R::Peripheral) -> Result<(), RadioError> {
        self.radio.connect(peripheral).await?;
        self.radio.discover_services(peripheral).await
    }

    /// Connect and discover services.
    ///
    /// Any existing connection is released first. On failure the slot stays
    /// empty and the half-open link is released.
    pub async fn connect(
        &self,
        handle: &PeripheralHandle<R::Peripheral>,
    ) -> Result<ActiveConnection<R::Peripheral>, AdapterError> {
        if let Some(previous) = self.active() {
            warn!("Releasing {} before connecting to {handle}", previous.handle);
            self.disconnect(&previous).await?;
        }

        {
            let mut slot = self.slot();
            slot.state = LinkState::Connecting;
            slot.connecting = Some(handle.peripheral.clone());
        }

        info!("Connecting to {handle}...");
        let result = with_timeout(self.timeouts.connect, self.open(&handle.peripheral)).await;

        let connection = {
            let mut slot = self.slot();
            slot.connecting = None;
            match result {
                Ok(()) => {
                    slot.generation += 1;
                    let connection = ActiveConnection {
                        generation: slot.generation,
                        handle: handle.clone(),
                    };
                    slot.active = Some(connection.clone());
                    slot.state = LinkState::Connected;
                    Ok(connection)
                }
                Err(e) => {
                    slot.state = LinkState::AdapterReady;
                    Err(e)
                }
            }
        };

        match connection {
            Ok(connection) => {
                info!("Connected to {handle}");
                Ok(connection)
            }
            Err(e) => {
                if let Err(release) = self.radio.disconnect(&handle.peripheral).await {
                    debug!("Releasing half-open link to {handle}: {release}");
                }
                Err(AdapterError::ConnectFailed(e))
            }
        }
    }

    /// Confirmed write of `bytes` to the RX characteristic.
    ///
    /// A failed write leaves the connection in place.
    pub async fn write(
        &self,
        connection: &ActiveConnection<R::Peripheral>,
        bytes: &[u8],
    ) -> Result<(), AdapterError> {
        if !self.is_current(connection) {
            return Err(AdapterError::NotConnected);
        }

        let payload = self.radio.encoding().encode(bytes);
        debug!("Writing {} bytes to {}", payload.len(), RX_CHAR_UUID);
        with_timeout(
            self.timeouts.write,
            self.radio.write(&connection.handle.peripheral, SERVICE_UUID, RX_CHAR_UUID, &payload),
        )
        .await
        .map_err(AdapterError::WriteFailed)
    }

    /// Release `connection`. A no-op if it is no longer the active one.
    pub async fn disconnect(
        &self,
        connection: &ActiveConnection<R::Peripheral>,
    ) -> Result<(), AdapterError> {
        let released = {
            let mut slot = self.slot();
            match &slot.active {
                Some(active) if active.generation == connection.generation => {
                    slot.state = LinkState::Idle;
                    slot.active.take()
                }
                _ => None,
            }
        };

        let Some(released) = released else {
            debug!("Already disconnected from {}", connection.handle);
            return Ok(());
        };

        info!("Disconnecting from {}", released.handle);
        self.radio
            .disconnect(&released.handle.peripheral)
            .await
            .map_err(AdapterError::DisconnectFailed)
    }

    /// Release everything: an outstanding sweep, an unfinished connect and the
    /// active connection. Safe to call at any time, any number of times.
    pub async fn teardown(&self) {
        let (scanning, connecting, active) = {
            let mut slot = self.slot();
            slot.state = LinkState::Idle;
            (
                std::mem::take(&mut slot.scanning),
                slot.connecting.take(),
                slot.active.take(),
            )
        };

        if scanning
            && let Err(e) = self.radio.stop_scan().await
        {
            warn!("Failed to stop BLE scan: {e}");
        }

        let peripherals = connecting
            .into_iter()
            .chain(active.map(|active| active.handle.peripheral));
        for peripheral in peripherals {
            debug!("Tearing down link to {peripheral:?}");
            if let Err(e) = self.radio.disconnect(&peripheral).await {
                warn!("Failed to disconnect during teardown: {e}");
            }
        }
    }
}
