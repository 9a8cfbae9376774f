//! `akari restart` / `akari reload`.

use akari_api::Ack;

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::output;

use super::Ctx;

pub async fn restart(ctx: &Ctx) -> Result<(), CliError> {
    let ack = ctx.ops.restart_service(&ctx.entry).await?;
    report(ctx, &ack, "Service restart requested")
}

pub async fn reload(ctx: &Ctx) -> Result<(), CliError> {
    let ack = ctx.ops.reload_config(&ctx.entry).await?;
    report(ctx, &ack, "Configuration reload requested")
}

fn report(ctx: &Ctx, ack: &Ack, done: &str) -> Result<(), CliError> {
    let out = match ctx.output {
        OutputFormat::Table | OutputFormat::Plain => match &ack.message {
            Some(message) => format!("{done}: {message}"),
            None => done.to_owned(),
        },
        _ => output::render_single(ctx.output, ack, |_| String::new(), |_| String::new())?,
    };
    output::print_output(&out, ctx.quiet);
    Ok(())
}
