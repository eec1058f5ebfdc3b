//! Raw authenticated requests.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use serde_json::Value;

/// GET `path` with the session's token and print the body.
pub async fn get(ctx: &Context, path: &str) -> Result<()> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    let runtime = ctx.runtime().await?;
    let body: Value = runtime.client().get(&path).await?;

    match (&body, ctx.format) {
        (Value::String(text), OutputFormat::Text) => println!("{}", text),
        _ => output::print_json(&body),
    }
    Ok(())
}
