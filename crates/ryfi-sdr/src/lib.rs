//! # RyFi SDR layer
//!
//! Everything between the DSP pipelines and the radio hardware: a driver
//! registry resolving `driver[:serial]` selectors, refcounted device
//! contexts so RX and TX can share one physical radio, worker threads
//! that pump samples between the hardware and the DSP streams, and the
//! int16 ↔ float sample bridge.
//!
//! Vendor drivers plug in through the [`driver::Driver`] trait; the
//! in-process [`loopback::LoopbackDriver`] ships with the crate for
//! tests and demos.

pub mod bridge;
pub mod context;
pub mod driver;
pub mod loopback;
pub mod worker;

use thiserror::Error;

/// Result alias for the device layer.
pub type SdrResult<T> = Result<T, SdrError>;

/// Errors from drivers, devices and workers.
#[derive(Debug, Clone, Error)]
pub enum SdrError {
    /// No driver registered under this name.
    #[error("unknown device driver: '{0}'")]
    UnknownDriver(String),

    /// A driver with this name is already registered.
    #[error("a driver with the name '{0}' already exists")]
    DuplicateDriver(String),

    /// The selected driver found no devices.
    #[error("could not find any device using the selected driver")]
    NoDevice,

    /// The identifier did not match a device.
    #[error("invalid device identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Opening or configuring the hardware failed.
    #[error("device error: {0}")]
    Device(String),

    /// The operation is not allowed while the device is running.
    #[error("device is running")]
    Running,

    /// The driver does not support this direction.
    #[error("this driver does not support {0}")]
    Unsupported(&'static str),

    /// A hardware call timed out; the caller retries.
    #[error("hardware call timed out")]
    Timeout,
}
