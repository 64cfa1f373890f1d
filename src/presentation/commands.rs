//! Subcommand runners
//!
//! Each run owns its session: connect, hand the dispatcher handle to the work,
//! then drain and close.

use crate::domain::command::Command;
use crate::domain::frame;
use crate::domain::peripheral::PeripheralLink;
use crate::domain::settings::{Settings, SettingsService};
use crate::infrastructure::session::{self, SessionConfig};
use crate::infrastructure::simulator::{SimulatedLink, SimulatedPeripheral};
use crate::presentation::cli::{parse_hex_payload, SettingsCmd};
use crate::presentation::maneuver::Maneuver;
use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::info;

/// What to do once the robot is ready
#[derive(Debug, Clone)]
pub enum Work {
    Send(Command),
    Maneuver(Maneuver),
}

/// Connect (for real or simulated), run `work`, close.
pub async fn drive(settings: &Settings, simulate: bool, work: Work) -> Result<()> {
    let config = SessionConfig::from(settings);
    if simulate {
        let peripheral = SimulatedPeripheral::new().with_latency(Duration::from_millis(20));
        let mut link = SimulatedLink::new(&config.identity).with_peripheral(peripheral);
        return run(&mut link, config, work).await;
    }
    drive_bluetooth(config, work).await
}

#[cfg(windows)]
async fn drive_bluetooth(config: SessionConfig, work: Work) -> Result<()> {
    let mut link = crate::infrastructure::bluetooth::WindowsBleLink::new();
    run(&mut link, config, work).await
}

#[cfg(not(windows))]
async fn drive_bluetooth(_config: SessionConfig, _work: Work) -> Result<()> {
    bail!("Bluetooth LE is only supported on Windows builds; pass --simulate to use the in-memory robot")
}

async fn run<L: PeripheralLink>(link: &mut L, config: SessionConfig, work: Work) -> Result<()> {
    let session = session::establish(link, config)
        .await
        .context("Unable to reach the robot")?;

    let handle = session.handle();
    let outcome = match work {
        Work::Send(command) => {
            info!("Sending {}", command);
            handle.enqueue(command).await
        }
        Work::Maneuver(maneuver) => maneuver.perform(&handle).await,
    };
    drop(handle);

    let stats = session.close().await;
    info!(
        "Done: {} written, {} failed, {} retried",
        stats.written, stats.failed, stats.retried
    );

    outcome.context("Command was not accepted")?;
    if stats.failed > 0 {
        bail!("{} write(s) to the robot failed", stats.failed);
    }
    Ok(())
}

/// Render a frame as spaced upper-case hex
pub fn format_frame(opcode: u8, payload: &[u8]) -> Result<String> {
    let bytes = frame::try_encode(opcode, payload)?;
    Ok(bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" "))
}

pub fn encode(opcode: u8, payload: &str) -> Result<()> {
    let payload = parse_hex_payload(payload)?;
    println!("{}", format_frame(opcode, &payload)?);
    Ok(())
}

pub fn settings(service: &mut SettingsService, action: SettingsCmd) -> Result<()> {
    match action {
        SettingsCmd::Show => {
            println!("{}", serde_json::to_string_pretty(service.get())?);
        }
        SettingsCmd::Path => {
            println!("{}", service.path().display());
        }
        SettingsCmd::Save => {
            service.save()?;
            info!("Settings saved to {}", service.path().display());
        }
        SettingsCmd::Reset => {
            service.reset()?;
            info!("Settings reset at {}", service.path().display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_frame() {
        assert_eq!(
            format_frame(0x0A, &[0x02, 0xC0]).unwrap(),
            "14 02 02 C0 A2 21"
        );
        assert_eq!(format_frame(0x00, &[]).unwrap(), "00 00 FF FF");
        assert!(format_frame(0x80, &[]).is_err());
        assert!(format_frame(0x0A, &[0u8; 256]).is_err());
    }

    #[tokio::test]
    async fn test_drive_simulated() {
        let settings = Settings::default();
        drive(&settings, true, Work::Send(Command::servo(0x7F)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_drive_rejects_zero_capacity() {
        let settings = Settings {
            queue_capacity: 0,
            ..Default::default()
        };
        let err = drive(&settings, true, Work::Send(Command::reset()))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("capacity"));
    }
}
