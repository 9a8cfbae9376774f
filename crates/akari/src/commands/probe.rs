//! `akari probe`: can we reach the device, and does it accept our key?

use akari_api::DeviceHealth;
use akari_core::ProbeResult;
use serde::Serialize;

use crate::error::CliError;
use crate::output;

use super::{Ctx, health, util};

#[derive(Serialize)]
struct Reachable<'a> {
    device_id: &'a str,
    address: String,
    health: &'a DeviceHealth,
}

pub async fn handle(ctx: &Ctx) -> Result<(), CliError> {
    let identity = ctx.ops.resolve(&ctx.entry)?;

    match ctx.ops.probe(&identity).await {
        ProbeResult::Reachable(h) => {
            let report = Reachable {
                device_id: &identity.device_id,
                address: identity.address(),
                health: &h,
            };
            let out = output::render_single(
                ctx.output,
                &report,
                |r| {
                    format!(
                        "{} at {} is reachable (up {})\n{}",
                        r.device_id,
                        r.address,
                        util::format_uptime(r.health.uptime_seconds),
                        health::detail(r.health)
                    )
                },
                |_| "ok".to_owned(),
            )?;
            output::print_output(&out, ctx.quiet);
            Ok(())
        }
        ProbeResult::CannotConnect(reason) => Err(CliError::ConnectionFailed {
            url: identity.address(),
            reason,
        }),
        ProbeResult::InvalidAuth => Err(CliError::AuthFailed),
        ProbeResult::Failed(e) => Err(e.into()),
    }
}
