//! btleplug-backed [`Radio`]
//!
//! Uses the first (or a chosen) system Bluetooth adapter in the central role.

use btleplug::api::{
    Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::{BoxStream, StreamExt};
use log::{debug, info};
use uuid::Uuid;

use crate::radio::{AdapterState, Advertisement, Discovery, Radio, RadioError, WireEncoding};

impl From<CentralState> for AdapterState {
    fn from(state: CentralState) -> Self {
        match state {
            CentralState::Unknown => Self::Unknown,
            CentralState::PoweredOn => Self::PoweredOn,
            CentralState::PoweredOff => Self::PoweredOff,
        }
    }
}

/// The system Bluetooth stack
pub struct BtleRadio {
    // Keeps the platform session alive for as long as the adapter is used.
    _manager: Manager,
    adapter: Adapter,
    encoding: WireEncoding,
}

impl BtleRadio {
    /// Open adapter number `index`, or the first one the platform reports.
    pub async fn new(index: Option<usize>) -> Result<Self, RadioError> {
        let manager = Manager::new().await?;
        let adapter = get_adapter(&manager, index.unwrap_or(0)).await?;
        info!("Using Bluetooth adapter: {}", adapter.adapter_info().await?);

        Ok(Self {
            _manager: manager,
            adapter,
            encoding: WireEncoding::Raw,
        })
    }

    pub fn with_encoding(mut self, encoding: WireEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

async fn get_adapter(manager: &Manager, index: usize) -> Result<Adapter, RadioError> {
    let adapters = manager.adapters().await?;
    adapters.into_iter().nth(index).ok_or(RadioError::NoAdapter)
}

async fn advertisement(adapter: &Adapter, id: &PeripheralId) -> Discovery<Peripheral> {
    let peripheral = adapter.peripheral(id).await?;
    let props = peripheral.properties().await?;
    let advertisement = Advertisement {
        id: peripheral.address().to_string(),
        name: props.as_ref().and_then(|p| p.local_name.clone()),
        rssi: props.and_then(|p| p.rssi),
    };
    Ok((peripheral, advertisement))
}

/// A peripheral can vanish between its event and the lookup. That says nothing
/// about the scan itself, so skip it rather than end the sweep.
fn skip_failed_lookup<P>(id: &(dyn std::fmt::Debug + Sync), lookup: Discovery<P>) -> Option<Discovery<P>> {
    match lookup {
        Ok(found) => Some(Ok(found)),
        Err(e) => {
            debug!("Skipping {id:?}: {e}");
            None
        }
    }
}

impl Radio for BtleRadio {
    type Peripheral = Peripheral;

    fn encoding(&self) -> WireEncoding {
        self.encoding
    }

    async fn state(&self) -> Result<AdapterState, RadioError> {
        Ok(self.adapter.adapter_state().await?.into())
    }

    async fn state_changes(&self) -> Result<BoxStream<'static, AdapterState>, RadioError> {
        let events = self.adapter.events().await?;
        Ok(events
            .filter_map(|event| async move {
                match event {
                    CentralEvent::StateUpdate(state) => Some(AdapterState::from(state)),
                    _ => None,
                }
            })
            .boxed())
    }

    async fn start_scan(&self) -> Result<BoxStream<'static, Discovery<Peripheral>>, RadioError> {
        // Subscribe before starting so the first advertisements are not missed.
        let events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;
        debug!("BLE scan started");

        let adapter = self.adapter.clone();
        Ok(events
            .filter_map(move |event| {
                let adapter = adapter.clone();
                async move {
                    match event {
                        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                            skip_failed_lookup(&id, advertisement(&adapter, &id).await)
                        }
                        _ => None,
                    }
                }
            })
            .boxed())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        self.adapter.stop_scan().await?;
        debug!("BLE scan stopped");
        Ok(())
    }

    async fn connect(&self, peripheral: &Peripheral) -> Result<(), RadioError> {
        peripheral.connect().await?;
        Ok(())
    }

    async fn discover_services(&self, peripheral: &Peripheral) -> Result<(), RadioError> {
        peripheral.discover_services().await?;
        Ok(())
    }

    async fn write(
        &self,
        peripheral: &Peripheral,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), RadioError> {
        let target = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == service && c.uuid == characteristic)
            .ok_or(RadioError::CharacteristicNotFound {
                service,
                characteristic,
            })?;

        peripheral.write(&target, payload, WriteType::WithResponse).await?;
        Ok(())
    }

    async fn disconnect(&self, peripheral: &Peripheral) -> Result<(), RadioError> {
        if peripheral.is_connected().await? {
            peripheral.disconnect().await?;
        }
        Ok(())
    }
}
