//! Robot command set
//!
//! Each command is an opcode plus a short payload, handed to
//! [`frame::encode`](crate::domain::frame::encode) at dispatch time.

use crate::domain::frame::{self, FrameError};
use std::fmt;

/// Write a value to one of the firmware's Bitsnap channels
pub const OP_SET_BITSNAP: u8 = 0x0A;
/// Set the LED color
pub const OP_LED: u8 = 0x09;
/// Return all channels to neutral
pub const OP_RESET: u8 = 0x0E;

/// Payload sent with [`OP_RESET`]
pub const RESET_PAYLOAD: [u8; 3] = [0x7F, 0x7F, 0x7F];

/// Motor value at rest
pub const MOTOR_NEUTRAL: u8 = 0x89;
/// Servo value pointing straight ahead
pub const SERVO_CENTER: u8 = 0x7F;

/// Bitsnap channels wired on the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Motor1,
    Servo,
    Motor2,
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Motor1 => 0,
            Channel::Servo => 1,
            Channel::Motor2 => 2,
        }
    }
}

/// An immutable command ready for the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: u8,
    payload: Vec<u8>,
}

impl Command {
    /// Raw command. Fails when the opcode is wider than 7 bits or the payload
    /// will not fit the length byte.
    pub fn new(opcode: u8, payload: impl Into<Vec<u8>>) -> Result<Self, FrameError> {
        let payload = payload.into();
        frame::validate(opcode, &payload)?;
        Ok(Self { opcode, payload })
    }

    /// Any channel byte is passed through; the firmware decides what it means.
    pub fn set_bitsnap(channel: impl Into<u8>, value: u8) -> Self {
        Self {
            opcode: OP_SET_BITSNAP,
            payload: vec![channel.into(), value],
        }
    }

    pub fn motor1(value: u8) -> Self {
        Self::set_bitsnap(Channel::Motor1, value)
    }

    pub fn motor2(value: u8) -> Self {
        Self::set_bitsnap(Channel::Motor2, value)
    }

    pub fn servo(value: u8) -> Self {
        Self::set_bitsnap(Channel::Servo, value)
    }

    pub fn led(r: u8, g: u8, b: u8) -> Self {
        Self {
            opcode: OP_LED,
            payload: vec![r, g, b],
        }
    }

    pub fn red(value: u8) -> Self {
        Self::led(value, 0, 0)
    }

    pub fn green(value: u8) -> Self {
        Self::led(0, value, 0)
    }

    pub fn blue(value: u8) -> Self {
        Self::led(0, 0, value)
    }

    pub fn reset() -> Self {
        Self {
            opcode: OP_RESET,
            payload: RESET_PAYLOAD.to_vec(),
        }
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Wire bytes for this command
    pub fn encode(&self) -> Vec<u8> {
        frame::encode(self.opcode, &self.payload)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.opcode, self.payload.as_slice()) {
            (OP_SET_BITSNAP, [0, v]) => write!(f, "motor1({v:#04X})"),
            (OP_SET_BITSNAP, [1, v]) => write!(f, "servo({v:#04X})"),
            (OP_SET_BITSNAP, [2, v]) => write!(f, "motor2({v:#04X})"),
            (OP_SET_BITSNAP, [ch, v]) => write!(f, "set_bitsnap({ch}, {v:#04X})"),
            (OP_LED, [r, g, b]) => write!(f, "led({r}, {g}, {b})"),
            (OP_RESET, _) => write!(f, "reset"),
            (op, payload) => write!(f, "raw({op:#04X}, {payload:02X?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_mapping() {
        assert_eq!(Command::motor1(0x10).payload(), &[0, 0x10]);
        assert_eq!(Command::servo(0x10).payload(), &[1, 0x10]);
        assert_eq!(Command::motor2(0x10).payload(), &[2, 0x10]);
        assert_eq!(Command::motor2(0x10).opcode(), OP_SET_BITSNAP);
    }

    #[test]
    fn test_unknown_channel_passes_through() {
        let cmd = Command::set_bitsnap(9u8, 0x42);
        assert_eq!(cmd.payload(), &[9, 0x42]);
        assert_eq!(cmd.to_string(), "set_bitsnap(9, 0x42)");
    }

    #[test]
    fn test_led_helpers() {
        assert_eq!(Command::led(1, 2, 3).payload(), &[1, 2, 3]);
        assert_eq!(Command::red(5), Command::led(5, 0, 0));
        assert_eq!(Command::green(5), Command::led(0, 5, 0));
        assert_eq!(Command::blue(5), Command::led(0, 0, 5));
    }

    #[test]
    fn test_reset_encoding() {
        assert_eq!(
            Command::reset().encode(),
            vec![0x1C, 0x03, 0x7F, 0x7F, 0x7F, 0xAF, 0xBA]
        );
    }

    #[test]
    fn test_motor2_forward_encoding() {
        // Drive-forward value used by the maneuvers: 0x89 + 59
        let cmd = Command::motor2(MOTOR_NEUTRAL + 59);
        assert_eq!(cmd.payload(), &[0x02, 0xC4]);
        assert_eq!(&cmd.encode()[..4], &[0x14, 0x02, 0x02, 0xC4]);
    }

    #[test]
    fn test_raw_command_length_bound() {
        assert!(Command::new(0x30, vec![0u8; 255]).is_ok());
        assert!(Command::new(0x30, vec![0u8; 256]).is_err());
    }

    #[test]
    fn test_raw_command_opcode_bound() {
        assert_eq!(
            Command::new(0x8A, [0x02, 0xC0]),
            Err(FrameError::OpcodeOutOfRange { opcode: 0x8A })
        );
        let raw = Command::new(0x7F, [0x01]).unwrap();
        assert_eq!(raw.encode()[0], 0xFE);
    }
}
