//! Driver contract and registry.
//!
//! A [`Driver`] enumerates its devices and opens them for RX or TX; the
//! [`Registry`] maps driver names to driver instances and resolves
//! `driver[:identifier]` selector strings, picking the first listed
//! device when the identifier is empty. The registry is an explicit value
//! the binary builds during startup and never mutates afterwards.

use crate::{SdrError, SdrResult};
use num_complex::Complex64;
use ryfi_core::stream::Stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a device can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCaps {
    pub receive: bool,
    pub transmit: bool,
}

/// One enumerated device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub caps: DeviceCaps,
    /// Driver name the device belongs to.
    pub driver: String,
    /// Serial number or bus address; unique within the driver.
    pub identifier: String,
}

/// A receive-side device handle.
///
/// Lifecycle: open (idle) → `start` (running) → `stop` (idle). Tuning is
/// allowed anytime; the sample rate only while idle.
pub trait RxDevice: Send {
    /// Retune the RX carrier.
    fn tune(&mut self, freq: f64) -> SdrResult<()>;

    /// Set the sample rate. Fails with [`SdrError::Running`] while the
    /// device is streaming.
    fn set_samplerate(&mut self, rate: f64) -> SdrResult<()>;

    /// Set the analog bandwidth.
    fn set_bandwidth(&mut self, bw: f64) -> SdrResult<()>;

    /// Start streaming into [`RxDevice::output`].
    fn start(&mut self) -> SdrResult<()>;

    /// Stop streaming: signal the stream, join the worker, then disable
    /// the hardware channel, in that order.
    fn stop(&mut self);

    /// The baseband output stream.
    fn output(&self) -> Arc<Stream<Complex64>>;
}

/// A transmit-side device handle; reads baseband from the stream it was
/// opened with.
pub trait TxDevice: Send {
    fn tune(&mut self, freq: f64) -> SdrResult<()>;
    fn set_samplerate(&mut self, rate: f64) -> SdrResult<()>;
    fn start(&mut self) -> SdrResult<()>;
    fn stop(&mut self);
}

/// A device driver: enumeration plus open-for-RX / open-for-TX.
pub trait Driver: Send + Sync {
    /// Enumerate currently connected devices.
    fn list(&self) -> Vec<DeviceInfo>;

    /// Open a device for receive.
    fn open_rx(&self, _identifier: &str) -> SdrResult<Box<dyn RxDevice>> {
        Err(SdrError::Unsupported("receiving"))
    }

    /// Open a device for transmit, fed from `input`.
    fn open_tx(
        &self,
        _identifier: &str,
        _input: Arc<Stream<Complex64>>,
    ) -> SdrResult<Box<dyn TxDevice>> {
        Err(SdrError::Unsupported("transmitting"))
    }
}

/// Name → driver map, built once at startup.
#[derive(Default)]
pub struct Registry {
    drivers: BTreeMap<String, Box<dyn Driver>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a driver. Duplicate names are a configuration bug and fail.
    pub fn register(&mut self, name: &str, driver: Box<dyn Driver>) -> SdrResult<()> {
        if self.drivers.contains_key(name) {
            return Err(SdrError::DuplicateDriver(name.to_string()));
        }
        self.drivers.insert(name.to_string(), driver);
        Ok(())
    }

    /// Registered driver names, sorted.
    pub fn driver_names(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }

    /// Every device of every driver.
    pub fn list(&self) -> Vec<DeviceInfo> {
        self.drivers.values().flat_map(|d| d.list()).collect()
    }

    /// Resolve `driver[:identifier]` to a driver and a concrete device
    /// identifier; an empty identifier selects the first listed device.
    fn select(&self, selector: &str) -> SdrResult<(&dyn Driver, String)> {
        let (name, ident) = match selector.split_once(':') {
            Some((name, ident)) => (name, ident.to_string()),
            None => (selector, String::new()),
        };

        let driver = self
            .drivers
            .get(name)
            .ok_or_else(|| SdrError::UnknownDriver(name.to_string()))?
            .as_ref();

        let ident = if ident.is_empty() {
            driver
                .list()
                .into_iter()
                .next()
                .ok_or(SdrError::NoDevice)?
                .identifier
        } else {
            ident
        };

        Ok((driver, ident))
    }

    /// Open the selected device for receive.
    pub fn open_rx(&self, selector: &str) -> SdrResult<Box<dyn RxDevice>> {
        let (driver, ident) = self.select(selector)?;
        driver.open_rx(&ident)
    }

    /// Open the selected device for transmit.
    pub fn open_tx(
        &self,
        selector: &str,
        input: Arc<Stream<Complex64>>,
    ) -> SdrResult<Box<dyn TxDevice>> {
        let (driver, ident) = self.select(selector)?;
        driver.open_tx(&ident, input)
    }
}
