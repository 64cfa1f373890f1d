//! Bitsnap wire framing
//!
//! Every command written to the control characteristic is wrapped in a frame:
//!
//! ```text
//! [0]       : Header (opcode << 1, low bit reserved = 0)
//! [1]       : Payload length N
//! [2..2+N]  : Payload
//! [2+N..]   : CRC-16/CCITT-FALSE of the payload only (u16 big-endian)
//! ```
//!
//! The checksum does not cover the header or the length byte. The robot
//! firmware verifies it that way, so header corruption goes unnoticed.

use crc::{Crc, CRC_16_IBM_3740};

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection, no final XOR
const CCITT_FALSE: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Header + length + checksum
pub const FRAME_OVERHEAD: usize = 4;

/// Largest payload the length byte can describe
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Opcodes are 7 bits wide; the header's low bit is reserved
pub const MAX_OPCODE: u8 = 0x7F;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("opcode {opcode:#04X} does not fit in 7 bits")]
    OpcodeOutOfRange { opcode: u8 },

    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("frame truncated ({len} bytes)")]
    Truncated { len: usize },

    #[error("length byte says {declared} payload bytes but frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("reserved header bit set (header {header:#04X})")]
    ReservedBitSet { header: u8 },

    #[error("checksum mismatch (expected {expected:#06X}, got {actual:#06X})")]
    ChecksumMismatch { expected: u16, actual: u16 },
}

/// A frame parsed back into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub opcode: u8,
    pub payload: Vec<u8>,
    pub checksum: u16,
}

/// CRC-16/CCITT-FALSE of `payload`
pub fn checksum(payload: &[u8]) -> u16 {
    CCITT_FALSE.checksum(payload)
}

/// Check that `opcode` and `payload` fit the header and length byte.
pub fn validate(opcode: u8, payload: &[u8]) -> Result<(), FrameError> {
    if opcode > MAX_OPCODE {
        return Err(FrameError::OpcodeOutOfRange { opcode });
    }
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    Ok(())
}

/// Encode a frame, rejecting input the header or length byte cannot carry.
pub fn try_encode(opcode: u8, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    validate(opcode, payload)?;
    Ok(encode(opcode, payload))
}

/// Encode a frame.
///
/// Callers must pass a 7-bit opcode and at most [`MAX_PAYLOAD`] bytes; every
/// [`Command`](crate::domain::command::Command) already does.
pub fn encode(opcode: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(opcode <= MAX_OPCODE, "opcode {opcode:#04X} out of range");
    debug_assert!(payload.len() <= MAX_PAYLOAD, "payload too large");

    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    frame.push(opcode << 1);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&checksum(payload).to_be_bytes());
    frame
}

/// Parse and verify a complete frame.
pub fn decode(frame: &[u8]) -> Result<DecodedFrame, FrameError> {
    if frame.len() < FRAME_OVERHEAD {
        return Err(FrameError::Truncated { len: frame.len() });
    }

    let header = frame[0];
    if header & 0x01 != 0 {
        return Err(FrameError::ReservedBitSet { header });
    }

    let declared = frame[1] as usize;
    let actual = frame.len() - FRAME_OVERHEAD;
    if declared != actual {
        return Err(FrameError::LengthMismatch { declared, actual });
    }

    let payload = &frame[2..2 + declared];
    let received = u16::from_be_bytes([frame[2 + declared], frame[3 + declared]]);
    let expected = checksum(payload);
    if received != expected {
        return Err(FrameError::ChecksumMismatch {
            expected,
            actual: received,
        });
    }

    Ok(DecodedFrame {
        opcode: header >> 1,
        payload: payload.to_vec(),
        checksum: received,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bit-at-a-time CCITT-FALSE, independent of the `crc` crate tables
    fn reference_crc(data: &[u8]) -> u16 {
        let mut crc: u16 = 0xFFFF;
        for &byte in data {
            crc ^= (byte as u16) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 {
                    (crc << 1) ^ 0x1021
                } else {
                    crc << 1
                };
            }
        }
        crc
    }

    #[test]
    fn test_checksum_check_value() {
        assert_eq!(checksum(b"123456789"), 0x29B1);
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn test_set_bitsnap_vector() {
        assert_eq!(
            encode(0x0A, &[0x02, 0xC0]),
            vec![0x14, 0x02, 0x02, 0xC0, 0xA2, 0x21]
        );
    }

    #[test]
    fn test_reset_vector() {
        assert_eq!(
            encode(0x0E, &[0x7F, 0x7F, 0x7F]),
            vec![0x1C, 0x03, 0x7F, 0x7F, 0x7F, 0xAF, 0xBA]
        );
    }

    #[test]
    fn test_frame_layout_matches_reference() {
        // A spread of opcodes and payload lengths, including the 0 and 255 edges
        for opcode in [0u8, 1, 0x09, 0x0A, 0x0E, 0x40, 0x7F] {
            for len in [0usize, 1, 2, 3, 17, 128, 254, 255] {
                let payload: Vec<u8> = (0..len)
                    .map(|i| (i as u8).wrapping_mul(31) ^ opcode)
                    .collect();
                let frame = encode(opcode, &payload);

                assert_eq!(frame.len(), len + FRAME_OVERHEAD);
                assert_eq!(frame[0], opcode << 1);
                assert_eq!(frame[1] as usize, len);
                assert_eq!(&frame[2..2 + len], payload.as_slice());

                let crc = reference_crc(&payload);
                assert_eq!(frame[2 + len], (crc >> 8) as u8);
                assert_eq!(frame[3 + len], (crc & 0xFF) as u8);
            }
        }
    }

    #[test]
    fn test_checksum_ignores_header() {
        let payload = [0x01, 0xBF];
        let a = encode(0x0A, &payload);
        let b = encode(0x3C, &payload);
        assert_ne!(a[0], b[0]);
        assert_eq!(a[a.len() - 2..], b[b.len() - 2..]);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![0u8; 256];
        assert_eq!(
            try_encode(0x0A, &payload),
            Err(FrameError::PayloadTooLarge {
                size: 256,
                max: MAX_PAYLOAD
            })
        );
    }

    #[test]
    fn test_wide_opcode_rejected() {
        // 0x8A << 1 would alias SetBitsnap (0x0A) on the wire
        assert_eq!(
            try_encode(0x8A, &[0x02, 0xC0]),
            Err(FrameError::OpcodeOutOfRange { opcode: 0x8A })
        );
        assert_eq!(
            try_encode(0xFF, &[]),
            Err(FrameError::OpcodeOutOfRange { opcode: 0xFF })
        );
        assert!(try_encode(MAX_OPCODE, &[]).is_ok());
    }

    #[test]
    #[should_panic(expected = "payload too large")]
    #[cfg(debug_assertions)]
    fn test_encode_asserts_payload_bound() {
        encode(0x0A, &[0u8; 256]);
    }

    #[test]
    fn test_decode_valid_frame() {
        let decoded = decode(&[0x14, 0x02, 0x02, 0xC0, 0xA2, 0x21]).unwrap();
        assert_eq!(decoded.opcode, 0x0A);
        assert_eq!(decoded.payload, vec![0x02, 0xC0]);
        assert_eq!(decoded.checksum, 0xA221);
    }

    #[test]
    fn test_decode_rejects_corruption() {
        assert_eq!(decode(&[0x14, 0x02]), Err(FrameError::Truncated { len: 2 }));
        assert_eq!(
            decode(&[0x15, 0x02, 0x02, 0xC0, 0xA2, 0x21]),
            Err(FrameError::ReservedBitSet { header: 0x15 })
        );
        assert_eq!(
            decode(&[0x14, 0x03, 0x02, 0xC0, 0xA2, 0x21]),
            Err(FrameError::LengthMismatch {
                declared: 3,
                actual: 2
            })
        );
        assert_eq!(
            decode(&[0x14, 0x02, 0x02, 0xC1, 0xA2, 0x21]),
            Err(FrameError::ChecksumMismatch {
                expected: checksum(&[0x02, 0xC1]),
                actual: 0xA221
            })
        );
    }

    #[test]
    fn test_header_corruption_goes_undetected() {
        // Flipping the opcode keeps the checksum valid
        let decoded = decode(&[0x16, 0x02, 0x02, 0xC0, 0xA2, 0x21]).unwrap();
        assert_eq!(decoded.opcode, 0x0B);
    }
}
