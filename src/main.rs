use anyhow::Result;
use bitsnap_robot::domain::settings::SettingsService;
use bitsnap_robot::infrastructure::logging;
use bitsnap_robot::presentation::cli::{Cli, Cmd};
use bitsnap_robot::presentation::commands::{self, Work};
use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings_service = match &args.global.config {
        Some(path) => SettingsService::with_path(path.clone()),
        None => SettingsService::new()?,
    };
    args.global.apply(settings_service.get_mut());
    let settings = settings_service.get().clone();

    let _logging_guard =
        logging::init_logger(&settings.log_settings, args.global.log_level.as_deref())?;
    info!("Starting Bitsnap robot controller");

    match args.cmd {
        Cmd::Send { command } => {
            commands::drive(
                &settings,
                args.global.simulate,
                Work::Send(command.to_command()),
            )
            .await
        }
        Cmd::Move { maneuver } => {
            commands::drive(&settings, args.global.simulate, Work::Maneuver(maneuver)).await
        }
        Cmd::Encode { opcode, payload } => commands::encode(opcode, &payload),
        Cmd::Settings { action } => commands::settings(&mut settings_service, action),
    }
}
