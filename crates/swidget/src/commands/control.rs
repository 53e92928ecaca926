//! Control commands: on/off, brightness, countdown timer, ping, blink.

use swidget_core::TypedDevice;

use crate::cli::{BrightnessArgs, GlobalOpts, PowerArgs, TimerArgs};
use crate::error::CliError;
use crate::output;

fn done(global: &GlobalOpts, message: &str) {
    if !global.quiet {
        eprintln!("✓ {message}");
    }
}

pub async fn power(
    device: &TypedDevice,
    on: bool,
    args: &PowerArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let state = if on { "on" } else { "off" };
    match (args.usb, on) {
        (true, true) => device.turn_on_usb_insert().await?,
        (true, false) => device.turn_off_usb_insert().await?,
        (false, true) => device.turn_on().await?,
        (false, false) => device.turn_off().await?,
    }
    let target = if args.usb { "USB insert" } else { "Load" };
    done(global, &format!("{target} turned {state} on {}", device.host()));
    Ok(())
}

pub async fn brightness(
    device: &TypedDevice,
    args: &BrightnessArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let dimmer = device.as_dimmer().ok_or_else(|| CliError::Unsupported {
        operation: "brightness".into(),
        required: format!("a dimmer (this is a {})", device.device_type()),
    })?;
    dimmer.set_brightness(args.level).await?;
    done(global, &format!("Brightness set to {}%", args.level));
    Ok(())
}

pub async fn timer(
    device: &TypedDevice,
    args: &TimerArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let switch = device.as_timer_switch().ok_or_else(|| CliError::Unsupported {
        operation: "timer".into(),
        required: format!("a timer switch (this is a {})", device.device_type()),
    })?;
    switch.set_countdown_timer(args.minutes).await?;
    done(global, &format!("Load turns off in {} min", args.minutes));
    Ok(())
}

pub async fn ping(device: &TypedDevice, global: &GlobalOpts) -> Result<(), CliError> {
    let reply = device.ping().await?;
    let out = output::render_single(
        &global.output,
        &serde_json::json!({ "host": device.host(), "reply": reply.trim() }),
        |_| format!("{} answered: {}", device.host(), reply.trim()),
        |_| reply.trim().to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn blink(device: &TypedDevice, global: &GlobalOpts) -> Result<(), CliError> {
    device.blink().await?;
    done(global, &format!("{} is blinking", device.host()));
    Ok(())
}
