//! Boundary with the BLE stack
//!
//! The dispatcher only ever needs [`PeripheralWriter`]; session bootstrap
//! drives a [`PeripheralLink`] to obtain one. Concrete implementations live in
//! `infrastructure` (Windows GATT, in-memory simulator).

use crate::domain::models::RobotIdentity;
use std::future::Future;
use std::time::Duration;

/// A single characteristic write that did not go through
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("peripheral disconnected")]
    Disconnected,

    #[error("write timed out after {0:?}")]
    TimedOut(Duration),
}

/// Failures while finding and connecting to the robot
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// Connected, but the expected service or characteristic is not there
    #[error("{0}")]
    Discovery(String),

    #[error("BLE adapter error: {0}")]
    Adapter(String),
}

/// Write-with-response access to the control characteristic
pub trait PeripheralWriter: Send + 'static {
    fn write(&mut self, frame: &[u8]) -> impl Future<Output = Result<(), WriteError>> + Send;
}

/// Scanning and connecting, as seen by session bootstrap
pub trait PeripheralLink: Send {
    /// A peripheral that advertised the target identity
    type Peripheral: Send;
    type Writer: PeripheralWriter;

    /// Resolve once a peripheral matching `identity` is seen. May never resolve;
    /// the caller races it against its own timeout.
    fn scan(
        &mut self,
        identity: &RobotIdentity,
    ) -> impl Future<Output = Result<Self::Peripheral, LinkError>> + Send;

    /// Connect and locate the control characteristic.
    fn connect(
        &mut self,
        peripheral: Self::Peripheral,
        identity: &RobotIdentity,
    ) -> impl Future<Output = Result<Self::Writer, LinkError>> + Send;
}
