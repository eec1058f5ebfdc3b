//! Authentication commands.

use super::{prompt_secret, value_or_prompt, Context};
use crate::output::{self, row, OutputFormat};
use anyhow::Result;
use serde::Serialize;
use session_auth::{Renewal, SessionEndReason, SessionSnapshot, SessionState};
use std::fmt;
use tokio::sync::mpsc;
use tracing::info;

/// Login with email and password.
pub async fn login(ctx: &Context, email: Option<String>) -> Result<()> {
    let runtime = ctx.runtime().await?;

    if runtime.session().has_session() {
        output::print_success(
            "Already logged in. Run 'sessionctl logout' first to switch accounts.",
            ctx.format,
        );
        return Ok(());
    }

    let email = value_or_prompt(email, "Email")?;
    let password = prompt_secret("Password")?;

    if ctx.format == OutputFormat::Text {
        println!("Logging in...");
    }

    let renewal = runtime.login(&email, &password).await?;
    info!(renewal = ?renewal, "Logged in from CLI");

    let expires = runtime
        .session()
        .expires_at()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());
    match renewal {
        Renewal::RefreshedImmediately { .. } => output::print_success(
            &format!("Logged in as {} (token refreshed, expires {})", email, expires),
            ctx.format,
        ),
        _ => output::print_success(
            &format!("Logged in as {} (expires {})", email, expires),
            ctx.format,
        ),
    }
    Ok(())
}

/// Logout and clear the stored session.
pub async fn logout(ctx: &Context) -> Result<()> {
    let runtime = ctx.open_runtime()?;

    if !runtime.session().has_session() {
        output::print_success("Not logged in", ctx.format);
        return Ok(());
    }

    runtime.logout();
    output::print_success("Logged out successfully", ctx.format);
    Ok(())
}

/// Session status as reported by `sessionctl status`.
#[derive(Debug, Serialize)]
struct StatusReport {
    api_base_url: String,
    #[serde(flatten)]
    session: SessionSnapshot,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = &self.session;
        writeln!(f, "{}", row("API", &self.api_base_url))?;
        if !session.has_session {
            return write!(f, "{}", row("Auth", "not logged in"));
        }

        writeln!(f, "{}", row("Auth", "logged in"))?;
        writeln!(f, "{}", row("State", format!("{:?}", session.state)))?;
        let expires = session
            .expires_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        writeln!(f, "{}", row("Expires", expires))?;
        if session.is_expired {
            writeln!(f, "{}", row("Remaining", "expired"))?;
        } else {
            writeln!(
                f,
                "{}",
                row("Remaining", format!("{}s", session.expires_in_secs))
            )?;
        }
        write!(
            f,
            "{}",
            row(
                "Renewal",
                if session.renewal_armed {
                    "scheduled"
                } else {
                    "not scheduled"
                }
            )
        )
    }
}

/// Show the stored session as it is on disk.
pub async fn status(ctx: &Context) -> Result<()> {
    let runtime = ctx.open_runtime()?;
    let report = StatusReport {
        api_base_url: ctx.config.api_base_url.clone(),
        session: runtime.status(),
    };
    output::print(&report, ctx.format);
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchEvent {
    StateChanged {
        state: SessionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        expires_at: Option<String>,
    },
    SessionEnded {
        reason: SessionEndReason,
    },
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let now = chrono::Local::now().format("%H:%M:%S");
        match self {
            WatchEvent::StateChanged {
                state,
                expires_at: Some(expires_at),
            } => write!(f, "[{}] {:?} (expires {})", now, state, expires_at),
            WatchEvent::StateChanged { state, .. } => write!(f, "[{}] {:?}", now, state),
            WatchEvent::SessionEnded { reason } => {
                write!(f, "[{}] Session ended: {:?}", now, reason)
            }
        }
    }
}

/// Keep the session alive in the foreground until Ctrl-C or the session ends.
pub async fn watch(ctx: &Context) -> Result<()> {
    let runtime = ctx.runtime().await?;
    if !runtime.session().has_session() {
        anyhow::bail!("Not logged in. Run 'sessionctl login' first");
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let state_tx = tx.clone();
    runtime.session().set_state_callback(Box::new(move |payload| {
        let _ = state_tx.send(WatchEvent::StateChanged {
            state: payload.state,
            expires_at: payload.expires_at,
        });
    }));
    runtime
        .session()
        .set_session_ended_callback(Box::new(move |reason| {
            let _ = tx.send(WatchEvent::SessionEnded { reason });
        }));

    if ctx.format == OutputFormat::Text {
        println!("{}", status_line(&runtime.status()));
        println!("Watching session. Press Ctrl-C to stop.");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Watch interrupted");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                let ended = matches!(event, WatchEvent::SessionEnded { .. });
                output::print(&event, ctx.format);
                if ended {
                    anyhow::bail!("Session expired, please log in again");
                }
            }
        }
    }
    Ok(())
}

fn status_line(snapshot: &SessionSnapshot) -> String {
    match snapshot.expires_at {
        Some(expires_at) => format!(
            "Session {:?}, access token expires {}",
            snapshot.state,
            expires_at.to_rfc3339()
        ),
        None => format!("Session {:?}", snapshot.state),
    }
}
