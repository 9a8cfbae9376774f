//! `akari health`.

use akari_api::{DeviceHealth, ModuleState};

use crate::error::CliError;
use crate::output;

use super::{Ctx, util};

pub async fn handle(ctx: &Ctx) -> Result<(), CliError> {
    let health = ctx.ops.get_health(&ctx.entry).await?;
    let out = output::render_single(ctx.output, &health, detail, |h| {
        h.uptime_seconds.to_string()
    })?;
    output::print_output(&out, ctx.quiet);
    Ok(())
}

pub(crate) fn detail(h: &DeviceHealth) -> String {
    let memory = match h.ram_used_pct() {
        Some(pct) => format!(
            "{} / {} ({pct:.1}%)",
            util::format_bytes(h.ram_used_bytes),
            util::format_bytes(h.ram_total_bytes)
        ),
        None => util::format_bytes(h.ram_used_bytes),
    };

    let mut lines = vec![
        format!("CPU temp: {:.1} °C", h.cpu_temp_c),
        format!("Memory:   {memory}"),
        format!("Uptime:   {}", util::format_uptime(h.uptime_seconds)),
        "Modules:".to_owned(),
    ];
    for (module, state) in h.module_status.iter() {
        let state = match state {
            ModuleState::Up => "up",
            ModuleState::Down => "DOWN",
            ModuleState::Unknown => "-",
        };
        lines.push(format!("  {:<10} {state}", module.as_ref()));
    }
    lines.join("\n")
}
