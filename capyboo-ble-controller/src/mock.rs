//! In-memory [`Radio`] for tests. Records every transport call.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use uuid::Uuid;

use crate::radio::{AdapterState, Advertisement, Discovery, Radio, RadioError, WireEncoding};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartScan,
    StopScan,
    Connect(String),
    DiscoverServices(String),
    Write {
        peripheral: String,
        service: Uuid,
        characteristic: Uuid,
        payload: Vec<u8>,
    },
    Disconnect(String),
}

/// Stream wrapper that counts how many subscriptions are still alive
struct Tracked<T> {
    inner: BoxStream<'static, T>,
    live: Arc<AtomicUsize>,
}

impl<T> Tracked<T> {
    fn new(inner: BoxStream<'static, T>, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self { inner, live }
    }
}

impl<T> Stream for Tracked<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockRadio {
    pub encoding: WireEncoding,
    pub initial_state: AdapterState,
    pub state_updates: Vec<AdapterState>,
    /// End the state stream after `state_updates` instead of staying open
    pub state_stream_ends: bool,
    /// Advertisements as `(id, name)`; `Err` entries surface as discovery errors
    pub advertisements: Vec<Result<(String, Option<String>), String>>,
    pub fail_connect: Option<String>,
    pub fail_discover: Option<String>,
    pub fail_write: Option<String>,
    pub fail_disconnect: Option<String>,
    /// Never complete `connect`
    pub hang_connect: bool,
    /// Never complete `write`
    pub hang_write: bool,
    pub(crate) calls: Arc<Mutex<Vec<Call>>>,
    pub(crate) live_subscriptions: Arc<AtomicUsize>,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self {
            encoding: WireEncoding::Raw,
            initial_state: AdapterState::PoweredOn,
            state_updates: Vec::new(),
            state_stream_ends: false,
            advertisements: Vec::new(),
            fail_connect: None,
            fail_discover: None,
            fail_write: None,
            fail_disconnect: None,
            hang_connect: false,
            hang_write: false,
            calls: Arc::new(Mutex::new(Vec::new())),
            live_subscriptions: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockRadio {
    /// Radio that is powered on and sees the given peripherals advertise
    pub fn with_peripherals(names: &[&str]) -> Self {
        Self {
            advertisements: names
                .iter()
                .enumerate()
                .map(|(i, name)| Ok((format!("AA:BB:CC:DD:EE:{i:02X}"), Some(name.to_string()))))
                .collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write { payload, .. } => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| wanted(call)).count()
    }

    pub fn live_subscriptions(&self) -> usize {
        self.live_subscriptions.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn failure(reason: &Option<String>) -> Result<(), RadioError> {
    match reason {
        Some(reason) => Err(RadioError::Other(reason.clone())),
        None => Ok(()),
    }
}

impl Radio for MockRadio {
    type Peripheral = String;

    fn encoding(&self) -> WireEncoding {
        self.encoding
    }

    async fn state(&self) -> Result<AdapterState, RadioError> {
        Ok(self.initial_state)
    }

    async fn state_changes(&self) -> Result<BoxStream<'static, AdapterState>, RadioError> {
        let updates = stream::iter(self.state_updates.clone());
        let updates = if self.state_stream_ends {
            updates.boxed()
        } else {
            updates.chain(stream::pending()).boxed()
        };
        Ok(Tracked::new(updates, self.live_subscriptions.clone()).boxed())
    }

    async fn start_scan(&self) -> Result<BoxStream<'static, Discovery<String>>, RadioError> {
        self.record(Call::StartScan);
        let items: Vec<Discovery<String>> = self
            .advertisements
            .iter()
            .map(|advertisement| match advertisement {
                Ok((id, name)) => Ok((
                    id.clone(),
                    Advertisement {
                        id: id.clone(),
                        name: name.clone(),
                        rssi: Some(-60),
                    },
                )),
                Err(reason) => Err(RadioError::Other(reason.clone())),
            })
            .collect();
        let discoveries = stream::iter(items).chain(stream::pending()).boxed();
        Ok(Tracked::new(discoveries, self.live_subscriptions.clone()).boxed())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        self.record(Call::StopScan);
        Ok(())
    }

    async fn connect(&self, peripheral: &String) -> Result<(), RadioError> {
        self.record(Call::Connect(peripheral.clone()));
        if self.hang_connect {
            futures::future::pending::<()>().await;
        }
        failure(&self.fail_connect)
    }

    async fn discover_services(&self, peripheral: &String) -> Result<(), RadioError> {
        self.record(Call::DiscoverServices(peripheral.clone()));
        failure(&self.fail_discover)
    }

    async fn write(
        &self,
        peripheral: &String,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), RadioError> {
        self.record(Call::Write {
            peripheral: peripheral.clone(),
            service,
            characteristic,
            payload: payload.to_vec(),
        });
        if self.hang_write {
            futures::future::pending::<()>().await;
        }
        failure(&self.fail_write)
    }

    async fn disconnect(&self, peripheral: &String) -> Result<(), RadioError> {
        self.record(Call::Disconnect(peripheral.clone()));
        failure(&self.fail_disconnect)
    }
}
