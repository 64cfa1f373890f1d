//! BLE Scanner Module
//!
//! Watches advertisements until the robot shows up.

use crate::domain::models::RobotIdentity;
use crate::infrastructure::bluetooth::protocol;
use anyhow::Result;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, info};
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEScanningMode,
};
use windows::Foundation::TypedEventHandler;

/// BLE Scanner for discovering the robot
pub struct BleScanner {
    watcher: Option<BluetoothLEAdvertisementWatcher>,
}

impl BleScanner {
    pub fn new() -> Self {
        Self { watcher: None }
    }

    /// Start scanning. The receiver resolves with the robot's address the first
    /// time it advertises.
    pub fn start(&mut self, identity: &RobotIdentity) -> Result<oneshot::Receiver<u64>> {
        // Stop any existing scan
        self.stop()?;

        info!("Looking for robot {}...", identity.device_id);

        let watcher = BluetoothLEAdvertisementWatcher::new()?;
        watcher.SetScanningMode(BluetoothLEScanningMode::Active)?;

        let (found_tx, found_rx) = oneshot::channel();
        let found_tx = Arc::new(Mutex::new(Some(found_tx)));
        let identity = identity.clone();

        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let address = args.BluetoothAddress()?;
                    let id = protocol::format_bluetooth_address(address);
                    if !identity.matches_device(&id) {
                        return Ok(());
                    }

                    // Only the first sighting completes the scan
                    if let Some(tx) = found_tx.lock().ok().and_then(|mut slot| slot.take()) {
                        info!("Found robot {}", id);
                        let _ = tx.send(address);
                    }
                }
                Ok(())
            },
        );

        watcher.Received(&handler)?;
        watcher.Start()?;
        self.watcher = Some(watcher);

        Ok(found_rx)
    }

    /// Stop scanning
    pub fn stop(&mut self) -> Result<()> {
        if let Some(watcher) = self.watcher.take() {
            debug!("Stopping BLE scan");
            watcher.Stop()?;
        }
        Ok(())
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
