//! In-memory robot
//!
//! Stands in for the BLE stack when no hardware is around (`--simulate`) and
//! in tests. Every frame is decoded the way the firmware would, logged and
//! recorded. Failures and hangs can be injected per frame.

use crate::domain::command::Command;
use crate::domain::frame::{self, DecodedFrame};
use crate::domain::models::{select_control_characteristic, RobotIdentity};
use crate::domain::peripheral::{LinkError, PeripheralLink, PeripheralWriter, WriteError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

type FramePredicate = Arc<dyn Fn(&DecodedFrame) -> bool + Send + Sync>;

/// Simulated control characteristic
#[derive(Clone, Default)]
pub struct SimulatedPeripheral {
    frames: Arc<Mutex<Vec<DecodedFrame>>>,
    fail_first: u32,
    fail_when: Option<FramePredicate>,
    hang_when: Option<FramePredicate>,
    latency: Duration,
}

impl SimulatedPeripheral {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the first `count` writes, whatever they carry
    pub fn fail_first(mut self, count: u32) -> Self {
        self.fail_first = count;
        self
    }

    /// Reject every write whose frame matches `predicate`
    pub fn fail_when(
        mut self,
        predicate: impl Fn(&DecodedFrame) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.fail_when = Some(Arc::new(predicate));
        self
    }

    /// Never complete writes whose frame matches `predicate`
    pub fn hang_when(
        mut self,
        predicate: impl Fn(&DecodedFrame) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.hang_when = Some(Arc::new(predicate));
        self
    }

    /// Delay every write, roughly like a write-with-response round trip
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Frames accepted so far, shared with every clone
    pub fn frames(&self) -> Arc<Mutex<Vec<DecodedFrame>>> {
        self.frames.clone()
    }
}

impl PeripheralWriter for SimulatedPeripheral {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), WriteError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let decoded = frame::decode(bytes).map_err(|e| {
            warn!("Robot rejected malformed frame {:02X?}: {}", bytes, e);
            WriteError::Rejected(e.to_string())
        })?;

        if self.fail_first > 0 {
            self.fail_first -= 1;
            return Err(WriteError::Rejected("simulated failure".to_string()));
        }

        let hang = self.hang_when.as_ref().is_some_and(|p| p(&decoded));
        if hang {
            std::future::pending::<()>().await;
        }

        let fail = self.fail_when.as_ref().is_some_and(|p| p(&decoded));
        if fail {
            return Err(WriteError::Rejected("simulated failure".to_string()));
        }

        match Command::new(decoded.opcode, decoded.payload.clone()) {
            Ok(command) => info!("robot <- {}", command),
            Err(_) => info!("robot <- {:02X?}", bytes),
        }

        if let Ok(mut frames) = self.frames.lock() {
            frames.push(decoded);
        }
        Ok(())
    }
}

/// Simulated adapter: one robot that may or may not be advertising
pub struct SimulatedLink {
    advertised: Option<String>,
    /// Characteristic handles with their descriptor values
    characteristics: Vec<(u16, Vec<Vec<u8>>)>,
    scan_delay: Duration,
    peripheral: SimulatedPeripheral,
}

impl SimulatedLink {
    /// A robot advertising `identity`, with its control characteristic behind a decoy
    pub fn new(identity: &RobotIdentity) -> Self {
        Self {
            advertised: Some(identity.device_id.clone()),
            characteristics: vec![
                (0x0010, vec![b"Bitsnap Status".to_vec()]),
                (0x0013, vec![identity.control_label.as_bytes().to_vec()]),
            ],
            scan_delay: Duration::from_millis(50),
            peripheral: SimulatedPeripheral::new(),
        }
    }

    /// Nothing ever shows up
    pub fn silent() -> Self {
        Self {
            advertised: None,
            characteristics: Vec::new(),
            scan_delay: Duration::ZERO,
            peripheral: SimulatedPeripheral::new(),
        }
    }

    /// Advertise a different device identifier
    pub fn advertising(mut self, device_id: &str) -> Self {
        self.advertised = Some(device_id.to_string());
        self
    }

    /// Drop every characteristic so discovery comes up empty
    pub fn without_control_characteristic(mut self) -> Self {
        self.characteristics.retain(|(handle, _)| *handle != 0x0013);
        self
    }

    pub fn with_scan_delay(mut self, delay: Duration) -> Self {
        self.scan_delay = delay;
        self
    }

    pub fn with_peripheral(mut self, peripheral: SimulatedPeripheral) -> Self {
        self.peripheral = peripheral;
        self
    }

    /// Same recording peripheral the session will write to
    pub fn peripheral(&self) -> SimulatedPeripheral {
        self.peripheral.clone()
    }
}

impl PeripheralLink for SimulatedLink {
    type Peripheral = String;
    type Writer = SimulatedPeripheral;

    async fn scan(&mut self, identity: &RobotIdentity) -> Result<String, LinkError> {
        info!("Looking for robot {}...", identity.device_id);
        match &self.advertised {
            Some(id) if identity.matches_device(id) => {
                tokio::time::sleep(self.scan_delay).await;
                info!("Found robot {}", id);
                Ok(id.clone())
            }
            _ => std::future::pending().await,
        }
    }

    async fn connect(
        &mut self,
        device: String,
        identity: &RobotIdentity,
    ) -> Result<SimulatedPeripheral, LinkError> {
        let candidates = self
            .characteristics
            .iter()
            .map(|(handle, descriptors)| (*handle, descriptors.clone()));
        let handle = select_control_characteristic(identity, candidates).ok_or_else(|| {
            LinkError::Discovery(format!(
                "{} has no characteristic labelled {:?}",
                device, identity.control_label
            ))
        })?;

        debug!("Control characteristic at handle {:#06X}", handle);
        Ok(self.peripheral.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_decoded_frames() {
        let mut peripheral = SimulatedPeripheral::new();
        let frames = peripheral.frames();
        peripheral.write(&Command::servo(0xBF).encode()).await.unwrap();

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, vec![1, 0xBF]);
    }

    #[tokio::test]
    async fn test_rejects_malformed_frame() {
        let mut peripheral = SimulatedPeripheral::new();
        let frames = peripheral.frames();
        let result = peripheral.write(&[0x14, 0x02, 0x02, 0xC0, 0x00, 0x00]).await;

        assert!(matches!(result, Err(WriteError::Rejected(_))));
        assert!(frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_finds_labelled_characteristic() {
        let identity = RobotIdentity::default();
        let mut link = SimulatedLink::new(&identity);
        let device = link.scan(&identity).await.unwrap();
        assert!(link.connect(device, &identity).await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_without_label_is_discovery_error() {
        let identity = RobotIdentity::default();
        let mut link = SimulatedLink::new(&identity).without_control_characteristic();
        let device = link.scan(&identity).await.unwrap();
        assert!(matches!(
            link.connect(device, &identity).await,
            Err(LinkError::Discovery(_))
        ));
    }
}
