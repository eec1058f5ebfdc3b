//! sessionctl - log in, inspect and keep alive an API session from the terminal.

mod commands;
mod output;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use client_config_and_utils::{init_logging, Config, Paths};
use commands::Context;
use session_auth::AuthError;
use std::path::PathBuf;
use tracing::debug;

/// sessionctl - Manage an API session with automatic token renewal.
#[derive(Parser)]
#[command(name = "sessionctl")]
#[command(about = "Log in to the API and keep the session fresh")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory holding config, session and logs (default ~/.sessionctl)
    #[arg(long, env = "SESSIONCTL_BASE_DIR", global = true)]
    base_dir: Option<PathBuf>,

    /// Mirror logs to stderr
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login {
        /// Account email (prompted if omitted)
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Logout and clear the stored session
    Logout,

    /// Show the stored session
    Status,

    /// Keep the session alive in the foreground, printing renewals
    Watch,

    /// Show the logged-in user
    Me,

    /// Send an authenticated GET request and print the response
    Get {
        /// Path relative to the API base URL, e.g. /api/v1/auth/me
        path: String,
    },

    /// Create an account
    Register {
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Activate an account with the emailed code
    Activate {
        #[arg(short, long)]
        email: Option<String>,
        #[arg(short, long)]
        code: Option<String>,
    },

    /// Request a password reset code
    ForgotPassword {
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Set a new password with a reset code
    ResetPassword {
        #[arg(short, long)]
        code: Option<String>,
    },
}

fn load_context(cli: &Cli) -> Result<Context> {
    let paths = match &cli.base_dir {
        Some(dir) => Paths::with_base_dir(dir.clone()),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)
        .with_context(|| format!("Failed to load {}", paths.config_file().display()))?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    paths.ensure_dirs()?;
    init_logging("sessionctl", &config.log_level, &paths, cli.verbose);
    debug!(base_dir = %paths.base_dir().display(), "Configuration loaded");

    Ok(Context {
        config,
        paths,
        format: cli.format,
    })
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = load_context(&cli)?;

    match cli.command {
        Commands::Login { email } => commands::login(&ctx, email).await,
        Commands::Logout => commands::logout(&ctx).await,
        Commands::Status => commands::status(&ctx).await,
        Commands::Watch => commands::watch(&ctx).await,
        Commands::Me => commands::me(&ctx).await,
        Commands::Get { path } => commands::get(&ctx, &path).await,
        Commands::Register { email } => commands::register(&ctx, email).await,
        Commands::Activate { email, code } => commands::activate(&ctx, email, code).await,
        Commands::ForgotPassword { email } => commands::forgot_password(&ctx, email).await,
        Commands::ResetPassword { code } => commands::reset_password(&ctx, code).await,
    }
}

/// Terminal auth failures all read the same to the user.
fn describe(error: &anyhow::Error) -> String {
    match error.downcast_ref::<AuthError>() {
        Some(auth) if auth.is_session_ended() => {
            "Session expired, please log in again with 'sessionctl login'".to_string()
        }
        _ => format!("{:#}", error),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    if let Err(e) = run(cli).await {
        output::print_error(&describe(&e), format);
        std::process::exit(1);
    }
}
