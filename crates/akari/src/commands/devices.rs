//! `akari devices`: what the remote unit drives (relays, covers, sensors).

use akari_api::DeviceSummary;
use tabled::Tabled;

use crate::error::CliError;
use crate::output;

use super::Ctx;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "State")]
    state: String,
}

impl From<&DeviceSummary> for DeviceRow {
    fn from(d: &DeviceSummary) -> Self {
        Self {
            id: d.id.clone().unwrap_or_default(),
            name: d.name.clone().unwrap_or_default(),
            kind: d.kind.clone().unwrap_or_default(),
            state: d.state.as_ref().map(output::cell).unwrap_or_default(),
        }
    }
}

pub async fn handle(ctx: &Ctx) -> Result<(), CliError> {
    let devices = ctx.ops.get_devices(&ctx.entry).await?;
    let out = output::render_list(ctx.output, &devices, |d| DeviceRow::from(d), |d| {
        d.id.clone().unwrap_or_else(|| d.to_string())
    })?;
    output::print_output(&out, ctx.quiet);
    Ok(())
}
