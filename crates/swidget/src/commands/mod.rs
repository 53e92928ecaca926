//! Command dispatch: bridges CLI args -> device operations -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod discover;
pub mod info;
pub mod watch;

use swidget_core::{DeviceConfig, discover_single};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a device-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    config: DeviceConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    // Watch owns the device lifetime (push channel or polling).
    if let Command::Watch(args) = cmd {
        return watch::handle(config, args, global).await;
    }

    let device = discover_single(config).await?;
    match cmd {
        Command::Info => info::info(&device, global),
        Command::Readings => info::readings(&device, global),
        Command::On(args) => control::power(&device, true, &args, global).await,
        Command::Off(args) => control::power(&device, false, &args, global).await,
        Command::Brightness(args) => control::brightness(&device, &args, global).await,
        Command::Timer(args) => control::timer(&device, &args, global).await,
        Command::Ping => control::ping(&device, global).await,
        Command::Blink => control::blink(&device, global).await,
        // Handled before dispatch
        Command::Watch(_) | Command::Discover(_) | Command::Config(_) | Command::Completions(_) => {
            unreachable!()
        }
    }
}
