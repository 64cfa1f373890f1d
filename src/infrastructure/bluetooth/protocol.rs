//! Bitsnap robot BLE addressing
//!
//! Helpers for turning the configured robot identity into what the Windows
//! BLE APIs expect: 48-bit addresses as `u64` and UUID strings as `GUID`.

use anyhow::Result;
#[cfg(windows)]
use windows::core::GUID;

/// Parse a colon-separated MAC such as `C5:DD:FB:6A:06:9E`
pub fn parse_bluetooth_address(address: &str) -> Result<u64> {
    let octets: Vec<&str> = address.trim().split(':').collect();
    if octets.len() != 6 {
        return Err(anyhow::anyhow!("Invalid Bluetooth address: {}", address));
    }

    let mut value = 0u64;
    for octet in octets {
        if octet.len() != 2 {
            return Err(anyhow::anyhow!("Invalid Bluetooth address: {}", address));
        }
        value = (value << 8) | u64::from(u8::from_str_radix(octet, 16)?);
    }
    Ok(value)
}

/// Upper-case colon-separated form of a 48-bit address
pub fn format_bluetooth_address(address: u64) -> String {
    let bytes = address.to_be_bytes();
    bytes[2..]
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse a UUID string into a Windows GUID
#[cfg(windows)]
pub fn parse_uuid(uuid_str: &str) -> Result<GUID> {
    let uuid_str = uuid_str.replace('-', "");

    if uuid_str.len() != 32 {
        return Err(anyhow::anyhow!("Invalid UUID format"));
    }

    let d1 = u32::from_str_radix(&uuid_str[0..8], 16)?;
    let d2 = u16::from_str_radix(&uuid_str[8..12], 16)?;
    let d3 = u16::from_str_radix(&uuid_str[12..16], 16)?;

    let mut d4 = [0u8; 8];
    for (i, byte) in d4.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&uuid_str[16 + i * 2..18 + i * 2], 16)?;
    }

    Ok(GUID {
        data1: d1,
        data2: d2,
        data3: d3,
        data4: d4,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ROBOT_DEVICE_ID;

    #[test]
    fn test_parse_robot_address() {
        assert_eq!(
            parse_bluetooth_address(ROBOT_DEVICE_ID).unwrap(),
            0xC5DD_FB6A_069E
        );
        assert_eq!(
            parse_bluetooth_address("c5:dd:fb:6a:06:9e").unwrap(),
            0xC5DD_FB6A_069E
        );
    }

    #[test]
    fn test_format_round_trips_robot_address() {
        assert_eq!(format_bluetooth_address(0xC5DD_FB6A_069E), ROBOT_DEVICE_ID);
        assert_eq!(format_bluetooth_address(0x01), "00:00:00:00:00:01");
    }

    #[test]
    fn test_reject_malformed_address() {
        assert!(parse_bluetooth_address("C5:DD:FB:6A:06").is_err());
        assert!(parse_bluetooth_address("C5:DD:FB:6A:06:9").is_err());
        assert!(parse_bluetooth_address("C5:DD:FB:6A:06:ZZ").is_err());
    }

    #[cfg(windows)]
    #[test]
    fn test_parse_uuid() {
        let guid = parse_uuid(crate::domain::models::ROBOT_SERVICE_UUID).unwrap();
        assert_eq!(guid.data1, 0xd9d9e9e0);
        assert_eq!(guid.data2, 0xaa4e);
    }
}
