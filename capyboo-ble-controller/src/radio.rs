//! The seam between the transport adapter and a concrete BLE central stack

use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;

use futures::stream::BoxStream;
use uuid::Uuid;

/// Power state of the local Bluetooth radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Unknown,
    Resetting,
    PoweredOn,
    PoweredOff,
    Unsupported,
    Unauthorized,
}

impl AdapterState {
    pub fn is_ready(self) -> bool {
        self == Self::PoweredOn
    }

    /// States the radio will not leave on its own
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::PoweredOff | Self::Unsupported | Self::Unauthorized)
    }
}

impl std::fmt::Display for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Resetting => "resetting",
            Self::PoweredOn => "powered on",
            Self::PoweredOff => "powered off",
            Self::Unsupported => "unsupported",
            Self::Unauthorized => "unauthorized",
        })
    }
}

/// What a peripheral told us about itself while advertising
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

/// How payload bytes must be encoded before they reach the characteristic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireEncoding {
    /// Bytes are written unchanged
    #[default]
    Raw,
    /// Bytes are written as standard padded base64 text
    Base64,
}

impl WireEncoding {
    pub fn encode<'a>(self, payload: &'a [u8]) -> Cow<'a, [u8]> {
        match self {
            Self::Raw => Cow::Borrowed(payload),
            Self::Base64 => Cow::Owned(data_encoding::BASE64.encode(payload).into_bytes()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error(transparent)]
    Btle(#[from] btleplug::Error),
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Other(String),
}

pub type Discovery<P> = Result<(P, Advertisement), RadioError>;

/// Minimal BLE central surface needed to provision a single peripheral.
///
/// Streams returned by this trait are subscriptions: dropping one releases it.
pub trait Radio: Send + Sync {
    type Peripheral: Clone + std::fmt::Debug + Send + Sync + 'static;

    /// Encoding the write path of this stack requires
    fn encoding(&self) -> WireEncoding;

    fn state(&self) -> impl Future<Output = Result<AdapterState, RadioError>> + Send;

    fn state_changes(
        &self,
    ) -> impl Future<Output = Result<BoxStream<'static, AdapterState>, RadioError>> + Send;

    /// Start an unfiltered sweep. The stream yields every advertisement seen,
    /// including repeats, until [`Radio::stop_scan`] is called.
    fn start_scan(
        &self,
    ) -> impl Future<Output = Result<BoxStream<'static, Discovery<Self::Peripheral>>, RadioError>>
    + Send;

    fn stop_scan(&self) -> impl Future<Output = Result<(), RadioError>> + Send;

    fn connect(
        &self,
        peripheral: &Self::Peripheral,
    ) -> impl Future<Output = Result<(), RadioError>> + Send;

    fn discover_services(
        &self,
        peripheral: &Self::Peripheral,
    ) -> impl Future<Output = Result<(), RadioError>> + Send;

    /// Write with response to `characteristic` of `service`.
    fn write(
        &self,
        peripheral: &Self::Peripheral,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), RadioError>> + Send;

    fn disconnect(
        &self,
        peripheral: &Self::Peripheral,
    ) -> impl Future<Output = Result<(), RadioError>> + Send;
}
