//! BLE Connection Module
//!
//! Connects to the robot, finds the control characteristic by its descriptor
//! label and writes frames to it with response.

use crate::domain::models::{select_control_characteristic, RobotIdentity};
use crate::domain::peripheral::{LinkError, PeripheralLink, PeripheralWriter, WriteError};
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::scanner::BleScanner;
use tracing::{debug, info, warn};
use windows::Devices::Bluetooth::BluetoothLEDevice;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattCommunicationStatus, GattWriteOption,
};
use windows::Storage::Streams::{DataReader, DataWriter};

fn adapter_error(e: impl std::fmt::Display) -> LinkError {
    LinkError::Adapter(e.to_string())
}

/// `PeripheralLink` backed by the WinRT Bluetooth LE APIs
pub struct WindowsBleLink {
    scanner: BleScanner,
}

impl WindowsBleLink {
    pub fn new() -> Self {
        Self {
            scanner: BleScanner::new(),
        }
    }

    /// Read every characteristic's descriptors on the robot service
    async fn control_characteristic(
        device: &BluetoothLEDevice,
        identity: &RobotIdentity,
    ) -> Result<GattCharacteristic, LinkError> {
        let service_uuid = protocol::parse_uuid(&identity.service_uuid).map_err(adapter_error)?;

        let services_result = device
            .GetGattServicesForUuidAsync(service_uuid)
            .map_err(adapter_error)?
            .await
            .map_err(adapter_error)?;
        let status = services_result.Status().map_err(adapter_error)?;
        if status != GattCommunicationStatus::Success {
            return Err(LinkError::Adapter(format!(
                "Failed to get GATT services: {:?}",
                status
            )));
        }

        let mut candidates = Vec::new();
        let services = services_result.Services().map_err(adapter_error)?;
        for i in 0..services.Size().map_err(adapter_error)? {
            let service = services.GetAt(i).map_err(adapter_error)?;
            let chars_result = service
                .GetCharacteristicsAsync()
                .map_err(adapter_error)?
                .await
                .map_err(adapter_error)?;
            if chars_result.Status().map_err(adapter_error)? != GattCommunicationStatus::Success {
                warn!("Skipping service {}: characteristics unavailable", i);
                continue;
            }

            let characteristics = chars_result.Characteristics().map_err(adapter_error)?;
            for j in 0..characteristics.Size().map_err(adapter_error)? {
                let characteristic = characteristics.GetAt(j).map_err(adapter_error)?;
                let labels = Self::descriptor_values(&characteristic).await?;
                candidates.push((characteristic, labels));
            }
        }

        debug!("Inspected {} characteristics", candidates.len());
        select_control_characteristic(identity, candidates).ok_or_else(|| {
            LinkError::Discovery(format!(
                "no characteristic labelled {:?} on service {}",
                identity.control_label, identity.service_uuid
            ))
        })
    }

    async fn descriptor_values(
        characteristic: &GattCharacteristic,
    ) -> Result<Vec<Vec<u8>>, LinkError> {
        let result = characteristic
            .GetDescriptorsAsync()
            .map_err(adapter_error)?
            .await
            .map_err(adapter_error)?;
        if result.Status().map_err(adapter_error)? != GattCommunicationStatus::Success {
            return Ok(Vec::new());
        }

        let mut values = Vec::new();
        let descriptors = result.Descriptors().map_err(adapter_error)?;
        for k in 0..descriptors.Size().map_err(adapter_error)? {
            let descriptor = descriptors.GetAt(k).map_err(adapter_error)?;
            let read = descriptor
                .ReadValueAsync()
                .map_err(adapter_error)?
                .await
                .map_err(adapter_error)?;
            if read.Status().map_err(adapter_error)? != GattCommunicationStatus::Success {
                continue;
            }

            let buffer = read.Value().map_err(adapter_error)?;
            let reader = DataReader::FromBuffer(&buffer).map_err(adapter_error)?;
            let length = reader.UnconsumedBufferLength().map_err(adapter_error)? as usize;
            let mut bytes = vec![0u8; length];
            reader.ReadBytes(&mut bytes).map_err(adapter_error)?;
            values.push(bytes);
        }
        Ok(values)
    }
}

impl PeripheralLink for WindowsBleLink {
    type Peripheral = u64;
    type Writer = GattWriter;

    async fn scan(&mut self, identity: &RobotIdentity) -> Result<u64, LinkError> {
        let found = self.scanner.start(identity).map_err(adapter_error)?;
        let address = found
            .await
            .map_err(|_| LinkError::Adapter("BLE scan ended unexpectedly".to_string()))?;
        self.scanner.stop().map_err(adapter_error)?;
        Ok(address)
    }

    async fn connect(
        &mut self,
        address: u64,
        identity: &RobotIdentity,
    ) -> Result<GattWriter, LinkError> {
        info!("Connecting to robot {}", protocol::format_bluetooth_address(address));

        let device = BluetoothLEDevice::FromBluetoothAddressAsync(address)
            .map_err(adapter_error)?
            .await
            .map_err(adapter_error)?;

        let characteristic = Self::control_characteristic(&device, identity).await?;
        info!(
            "Found control characteristic (handle {:#06X})",
            characteristic.AttributeHandle().unwrap_or_default()
        );

        Ok(GattWriter {
            _device: device,
            characteristic,
        })
    }
}

/// Write-with-response access to the control characteristic
pub struct GattWriter {
    // Holding the device keeps the connection open
    _device: BluetoothLEDevice,
    characteristic: GattCharacteristic,
}

impl PeripheralWriter for GattWriter {
    async fn write(&mut self, frame: &[u8]) -> Result<(), WriteError> {
        let rejected = |e: windows::core::Error| WriteError::Rejected(e.to_string());

        let writer = DataWriter::new().map_err(rejected)?;
        writer.WriteBytes(frame).map_err(rejected)?;
        let buffer = writer.DetachBuffer().map_err(rejected)?;

        let result = self
            .characteristic
            .WriteValueWithResultAndOptionAsync(&buffer, GattWriteOption::WriteWithResponse)
            .map_err(rejected)?
            .await
            .map_err(rejected)?;

        match result.Status().map_err(rejected)? {
            GattCommunicationStatus::Success => Ok(()),
            GattCommunicationStatus::Unreachable => Err(WriteError::Disconnected),
            status => Err(WriteError::Rejected(format!("GATT status {:?}", status))),
        }
    }
}
