//! `akari config get|set`: device configuration sections.

use akari_api::ConfigSection;
use tabled::Tabled;

use crate::cli::{ConfigArgs, ConfigCommand, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::{Ctx, util};

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

pub async fn handle(ctx: &Ctx, args: ConfigArgs) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Get { section } => {
            let data = ctx.ops.get_config_section(&ctx.entry, &section).await?;
            let out = output::render_single(ctx.output, &data, detail, plain)?;
            output::print_output(&out, ctx.quiet);
            Ok(())
        }

        ConfigCommand::Set {
            section,
            data,
            file,
        } => {
            let body = util::read_json_object(data.as_deref(), file.as_deref())?;
            let ack = ctx
                .ops
                .update_config_section(&ctx.entry, &section, &body)
                .await?;

            let out = match ctx.output {
                OutputFormat::Table | OutputFormat::Plain => {
                    let mut text = format!("Section '{section}' updated");
                    if let Some(message) = &ack.message {
                        text.push_str(&format!(": {message}"));
                    }
                    if ack.restart_required {
                        text.push_str("\nRestart required: run `akari restart` to apply");
                    }
                    text
                }
                _ => output::render_single(ctx.output, &ack, |_| String::new(), |_| String::new())?,
            };
            output::print_output(&out, ctx.quiet);
            Ok(())
        }
    }
}

fn detail(section: &ConfigSection) -> String {
    let rows: Vec<FieldRow> = section
        .0
        .iter()
        .map(|(key, value)| FieldRow {
            key: key.clone(),
            value: output::cell(value),
        })
        .collect();
    output::render_table(&rows)
}

/// `key=value`, one per line.
fn plain(section: &ConfigSection) -> String {
    section
        .0
        .iter()
        .map(|(key, value)| format!("{key}={}", output::cell(value)))
        .collect::<Vec<_>>()
        .join("\n")
}
