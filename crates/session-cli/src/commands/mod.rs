//! CLI command implementations.

mod account;
mod api;
mod auth;

pub use account::{activate, forgot_password, me, register, reset_password};
pub use api::get;
pub use auth::{login, logout, status, watch};

use crate::output::OutputFormat;
use anyhow::{Context as _, Result};
use client_config_and_utils::{Config, Paths};
use session_auth::SessionRuntime;
use std::io::{self, Write};
use tracing::warn;

/// Resolved configuration shared by every command.
pub struct Context {
    pub config: Config,
    pub paths: Paths,
    pub format: OutputFormat,
}

impl Context {
    /// Build the session runtime over the stored session without touching
    /// the network. Nothing is refreshed and no renewal is armed.
    pub fn open_runtime(&self) -> Result<SessionRuntime> {
        SessionRuntime::from_config(&self.config, &self.paths).context("Failed to set up session")
    }

    /// Build the session runtime and arm renewal for any stored session.
    ///
    /// A stored session that can no longer be refreshed is dropped here; the
    /// command then runs logged out.
    pub async fn runtime(&self) -> Result<SessionRuntime> {
        let runtime = self.open_runtime()?;
        match runtime.start().await {
            Ok(_) => {}
            Err(e) if e.is_session_ended() => {
                warn!(error = %e, "Stored session could not be resumed");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(runtime)
    }
}

/// Use `value` if given, otherwise prompt for a non-empty line.
fn value_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        return Ok(value.trim().to_string());
    }

    print!("{}: ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_string();

    if input.is_empty() {
        anyhow::bail!("{} is required", label);
    }
    Ok(input)
}

/// Prompt for a secret without echo.
fn prompt_secret(label: &str) -> Result<String> {
    let secret = rpassword::prompt_password(format!("{}: ", label))?;
    if secret.is_empty() {
        anyhow::bail!("{} is required", label);
    }
    Ok(secret)
}
