use crate::domain::command::Command;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::protocol;
use crate::presentation::maneuver::Maneuver;
use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "bitsnap-robot",
    about = "Drive a Bitsnap robot over Bluetooth LE"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Talk to an in-memory robot instead of Bluetooth
    #[arg(long, global = true, default_value_t = false)]
    pub simulate: bool,
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Robot address, e.g. C5:DD:FB:6A:06:9E
    #[arg(long, global = true, value_parser = parse_device_address)]
    pub device: Option<String>,
    /// Give up finding the robot after this many milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,
    /// Command queue capacity
    #[arg(long, global = true)]
    pub queue_capacity: Option<usize>,
    /// Log filter, e.g. "debug" or "bitsnap_robot=trace"
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

impl GlobalOpts {
    /// Apply per-run overrides on top of the settings file
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(device) = &self.device {
            settings.robot.device_id = device.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            settings.connect_timeout_ms = timeout_ms;
        }
        if let Some(capacity) = self.queue_capacity {
            settings.queue_capacity = capacity;
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Send a single command
    Send {
        #[command(subcommand)]
        command: SendCmd,
    },
    /// Run a timed maneuver, then reset
    Move {
        #[arg(value_enum)]
        maneuver: Maneuver,
    },
    /// Print the wire frame for an opcode and payload without connecting
    Encode {
        /// Opcode (0-127), decimal or 0x-prefixed hex
        #[arg(value_parser = parse_byte)]
        opcode: u8,
        /// Payload as hex, e.g. "02C0" or "7f 7f 7f"
        #[arg(default_value = "")]
        payload: String,
    },
    /// Inspect or reset the settings file
    Settings {
        #[command(subcommand)]
        action: SettingsCmd,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SendCmd {
    /// Set motor 1 (0x89 is stopped)
    Motor1 {
        #[arg(value_parser = parse_byte)]
        value: u8,
    },
    /// Set motor 2 (0x89 is stopped)
    Motor2 {
        #[arg(value_parser = parse_byte)]
        value: u8,
    },
    /// Set the steering servo (0x7F is centered)
    Servo {
        #[arg(value_parser = parse_byte)]
        value: u8,
    },
    /// Write any Bitsnap channel
    Bitsnap {
        #[arg(value_parser = parse_byte)]
        channel: u8,
        #[arg(value_parser = parse_byte)]
        value: u8,
    },
    /// Set the LED color
    Led {
        #[arg(value_parser = parse_byte)]
        r: u8,
        #[arg(value_parser = parse_byte)]
        g: u8,
        #[arg(value_parser = parse_byte)]
        b: u8,
    },
    /// Return every channel to neutral
    Reset,
}

impl SendCmd {
    pub fn to_command(&self) -> Command {
        match *self {
            SendCmd::Motor1 { value } => Command::motor1(value),
            SendCmd::Motor2 { value } => Command::motor2(value),
            SendCmd::Servo { value } => Command::servo(value),
            SendCmd::Bitsnap { channel, value } => Command::set_bitsnap(channel, value),
            SendCmd::Led { r, g, b } => Command::led(r, g, b),
            SendCmd::Reset => Command::reset(),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCmd {
    /// Print the effective settings as JSON
    Show,
    /// Print where the settings file lives
    Path,
    /// Write the effective settings to the file
    Save,
    /// Overwrite the file with defaults
    Reset,
}

/// Accept "137", "0x89" or "0X89"
pub fn parse_byte(s: &str) -> anyhow::Result<u8> {
    let s = s.trim();
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    value.map_err(|_| anyhow!("expected a byte (0-255 or 0x00-0xFF), got {:?}", s))
}

/// Hex payload with optional whitespace between bytes
/// Validate a MAC and normalize it to upper case
pub fn parse_device_address(s: &str) -> anyhow::Result<String> {
    let address = protocol::parse_bluetooth_address(s)?;
    Ok(protocol::format_bluetooth_address(address))
}

pub fn parse_hex_payload(s: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(anyhow!("odd hex length"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| anyhow!("bad hex {:?}", &digits[i..i + 2]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_byte() {
        assert_eq!(parse_byte("137").unwrap(), 0x89);
        assert_eq!(parse_byte("0xC4").unwrap(), 0xC4);
        assert_eq!(parse_byte("0X7f").unwrap(), 0x7F);
        assert!(parse_byte("256").is_err());
        assert!(parse_byte("0x100").is_err());
    }

    #[test]
    fn test_parse_hex_payload() {
        assert_eq!(parse_hex_payload("02C0").unwrap(), vec![0x02, 0xC0]);
        assert_eq!(parse_hex_payload("7f 7f 7f").unwrap(), vec![0x7F; 3]);
        assert!(parse_hex_payload("").unwrap().is_empty());
        assert!(parse_hex_payload("7f7").is_err());
        assert!(parse_hex_payload("zz").is_err());
    }

    #[test]
    fn test_bad_device_address_rejected() {
        let result =
            Cli::try_parse_from(["bitsnap-robot", "--device", "C5:DD:FB", "send", "reset"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_send_led() {
        let cli = Cli::try_parse_from([
            "bitsnap-robot",
            "--simulate",
            "send",
            "led",
            "1",
            "0",
            "0x10",
        ])
        .unwrap();
        assert!(cli.global.simulate);
        match cli.cmd {
            Cmd::Send { command } => {
                assert_eq!(command.to_command(), Command::led(1, 0, 0x10))
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::try_parse_from([
            "bitsnap-robot",
            "move",
            "left",
            "--device",
            "aa:bb:cc:dd:ee:ff",
            "--timeout-ms",
            "1500",
        ])
        .unwrap();
        let mut settings = Settings::default();
        cli.global.apply(&mut settings);
        assert_eq!(settings.robot.device_id, "AA:BB:CC:DD:EE:FF");
        assert_eq!(settings.connect_timeout_ms, 1500);
        assert_eq!(settings.queue_capacity, 100);
    }
}
