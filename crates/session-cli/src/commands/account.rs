//! Account commands.

use super::{prompt_secret, value_or_prompt, Context};
use crate::output::{self, row, OutputFormat};
use anyhow::Result;
use session_auth::MessageResponse;

/// Show the logged-in user.
pub async fn me(ctx: &Context) -> Result<()> {
    let runtime = ctx.runtime().await?;
    let me = runtime.accounts().me().await?;

    match ctx.format {
        OutputFormat::Text => {
            println!("{}", row("Email", &me.email));
            println!("{}", row("User ID", me.id));
            println!("{}", row("Active", me.is_active));
            println!("{}", row("Admin", me.is_superuser));
            if let Some(last) = me.last_connected_at {
                println!("{}", row("Last seen", last.to_rfc3339()));
            }
            println!("{}", row("Created", me.created_at.to_rfc3339()));
        }
        OutputFormat::Json => output::print_json(&me),
    }
    Ok(())
}

/// Create an account. The server emails an activation code.
pub async fn register(ctx: &Context, email: Option<String>) -> Result<()> {
    let email = value_or_prompt(email, "Email")?;
    let password = prompt_secret("Password")?;
    let confirm = prompt_secret("Confirm password")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    let runtime = ctx.runtime().await?;
    let created = runtime.accounts().register(&email, &password).await?;

    match ctx.format {
        OutputFormat::Text => {
            println!("Registered {}", created.email);
            if !created.is_active {
                println!("Check your inbox, then run 'sessionctl activate'.");
            }
        }
        OutputFormat::Json => output::print_json(&created),
    }
    Ok(())
}

pub async fn activate(ctx: &Context, email: Option<String>, code: Option<String>) -> Result<()> {
    let email = value_or_prompt(email, "Email")?;
    let code = value_or_prompt(code, "Activation code")?;

    let runtime = ctx.runtime().await?;
    let reply = runtime.accounts().activate(&email, &code).await?;
    print_message(&reply, ctx.format);
    Ok(())
}

pub async fn forgot_password(ctx: &Context, email: Option<String>) -> Result<()> {
    let email = value_or_prompt(email, "Email")?;

    let runtime = ctx.runtime().await?;
    let reply = runtime.accounts().forgot_password(&email).await?;
    print_message(&reply, ctx.format);
    Ok(())
}

pub async fn reset_password(ctx: &Context, code: Option<String>) -> Result<()> {
    let code = value_or_prompt(code, "Reset code")?;
    let password = prompt_secret("New password")?;

    let runtime = ctx.runtime().await?;
    let reply = runtime.accounts().reset_password(&code, &password).await?;
    print_message(&reply, ctx.format);
    Ok(())
}

fn print_message(reply: &MessageResponse, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", reply.message),
        OutputFormat::Json => output::print_json(reply),
    }
}
