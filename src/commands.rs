//! The `/font` command and the host menu button, plus bounded retry for
//! registering them while the host is still starting up.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::HostError;
use crate::host::{CommandRegistry, CommandSpec, MenuHost};

pub const FONT_COMMAND: CommandSpec = CommandSpec {
    name: "font",
    help: "Open the font manager.\nUsage: /font",
};

pub const MENU_BUTTON_ID: &str = "font_manager_button";
pub const MENU_BUTTON_LABEL: &str = "Font Manager";

/// Commands this extension understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    OpenFontManager,
}

/// Parse user input starting with '/'.
/// Returns `None` for plain text, commands owned by someone else, and misuse
/// (a usage line is pushed to `notices` in that case).
pub fn handle_user_command(input: &str, notices: &mut Vec<String>) -> Option<UserCommand> {
    let s = input.trim();
    let cmdline = s.strip_prefix('/')?.trim();
    let mut parts = cmdline.split_whitespace();
    let cmd = parts.next().unwrap_or("").to_lowercase();

    match cmd.as_str() {
        "font" => {
            if parts.next().is_some() {
                notices.push("Usage: /font".into());
                return None;
            }
            Some(UserCommand::OpenFontManager)
        }
        _ => None,
    }
}

/// How long to wait before and between attempts, and how often to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Command registration: first try after 2s, then every 5s for about a minute.
pub const COMMAND_RETRY: RetryPolicy = RetryPolicy {
    initial_delay: Duration::from_secs(2),
    interval: Duration::from_secs(5),
    max_attempts: 12,
};

/// Menu injection: try now, then every second for about 30s.
pub const MENU_RETRY: RetryPolicy = RetryPolicy {
    initial_delay: Duration::ZERO,
    interval: Duration::from_secs(1),
    max_attempts: 30,
};

/// Run `attempt` until it succeeds or the policy is exhausted.
/// The last error is logged and returned.
pub async fn retry_with_delay<T, F>(what: &str, policy: &RetryPolicy, mut attempt: F) -> Result<T, HostError>
where
    F: FnMut() -> Result<T, HostError>,
{
    if !policy.initial_delay.is_zero() {
        sleep(policy.initial_delay).await;
    }

    let max_attempts = policy.max_attempts.max(1);
    let mut tries = 1;
    loop {
        match attempt() {
            Ok(value) => {
                debug!(what, attempt = tries, "succeeded");
                return Ok(value);
            }
            Err(e) if tries >= max_attempts => {
                error!(what, attempts = tries, error = %e, "giving up");
                return Err(e);
            }
            Err(e) => {
                warn!(what, attempt = tries, error = %e, "failed, retrying in {:?}", policy.interval);
                sleep(policy.interval).await;
                tries += 1;
            }
        }
    }
}

pub async fn register_font_command<R>(registry: &mut R) -> Result<(), HostError>
where
    R: CommandRegistry + ?Sized,
{
    retry_with_delay("command registration", &COMMAND_RETRY, || {
        registry.register_command(&FONT_COMMAND)
    })
    .await?;
    info!(command = FONT_COMMAND.name, "slash command registered");
    Ok(())
}

pub async fn inject_menu_button<M>(menu: &mut M) -> Result<(), HostError>
where
    M: MenuHost + ?Sized,
{
    retry_with_delay("menu button", &MENU_RETRY, || {
        menu.append_menu_button(MENU_BUTTON_ID, MENU_BUTTON_LABEL)
    })
    .await?;
    info!(id = MENU_BUTTON_ID, "menu button added");
    Ok(())
}
