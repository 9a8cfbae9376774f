//! `akari watch`: MQTT discovery plus health polling until Ctrl-C.
//!
//! Prints one line per registry change, then a summary table of every
//! device known at shutdown.

use std::sync::Arc;

use akari_core::{ChangeKind, DeviceRecord, RegistryChange, Supervisor};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tabled::Tabled;
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::mqtt::MqttSource;
use crate::output;

use super::util;

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Device")]
    device_id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Live")]
    live: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Uptime")]
    uptime: String,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
    #[tabled(rename = "Last Error")]
    last_error: String,
}

impl From<&Arc<DeviceRecord>> for RecordRow {
    fn from(r: &Arc<DeviceRecord>) -> Self {
        Self {
            device_id: r.device_id().to_owned(),
            name: r.metadata.name.clone().unwrap_or_default(),
            address: r.identity.address(),
            live: if r.live { "yes" } else { "NO" }.into(),
            cpu: r
                .health
                .as_ref()
                .map(|h| format!("{:.1} °C", h.cpu_temp_c))
                .unwrap_or_default(),
            uptime: r
                .health
                .as_ref()
                .map(|h| util::format_uptime(h.uptime_seconds))
                .unwrap_or_default(),
            last_seen: r.last_success.map(local_time).unwrap_or_default(),
            last_error: match (&r.last_error, r.last_error_auth) {
                (Some(e), true) => format!("{e} (check the API key)"),
                (e, _) => e.clone().unwrap_or_default(),
            },
        }
    }
}

/// One structured line per change.
#[derive(Serialize)]
struct ChangeEvent<'a> {
    at: DateTime<Utc>,
    change: &'static str,
    device: &'a DeviceRecord,
}

fn kind_label(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Added => "added",
        ChangeKind::IdentityUpdated => "updated",
        ChangeKind::HealthUpdated => "health",
        ChangeKind::Removed => "removed",
    }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let config::Resolved {
        config: settings,
        mut supervisor,
        output: format,
    } = config::resolve(global)?;

    if let Some(topic) = args.topic {
        supervisor.discovery_topic = topic;
    }
    let mut mqtt = settings.mqtt;
    if let Some(host) = args.broker {
        mqtt.host = host;
    }
    if let Some(port) = args.broker_port {
        mqtt.port = port;
    }

    let supervisor = Supervisor::new(supervisor)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<RegistryChange>();
    supervisor.on_change(Arc::new(move |change: &RegistryChange| {
        let _ = tx.send(change.clone());
    }));

    supervisor.start(MqttSource::new(&mqtt)).await?;
    info!(
        topic = %supervisor.config().discovery_topic,
        broker = %format!("{}:{}", mqtt.host, mqtt.port),
        "watching"
    );
    if !global.quiet {
        eprintln!(
            "Watching {} on {}:{} (Ctrl-C to stop)",
            supervisor.config().discovery_topic,
            mqtt.host,
            mqtt.port
        );
    }

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            Some(change) = rx.recv() => {
                match render_change(format, &change) {
                    Ok(line) => output::print_output(&line, global.quiet),
                    Err(e) => break Err(e),
                }
            }
        }
    };

    supervisor.shutdown().await;
    outcome?;

    let snapshot = supervisor.registry().snapshot();
    let summary = output::render_list(
        format,
        snapshot.as_slice(),
        |r| RecordRow::from(r),
        |r| r.device_id().to_owned(),
    )?;
    output::print_output(&summary, global.quiet);
    Ok(())
}

fn render_change(format: OutputFormat, change: &RegistryChange) -> Result<String, CliError> {
    let record = &change.record;
    match format {
        OutputFormat::Table | OutputFormat::Plain => {
            let status = if record.live {
                record
                    .health
                    .as_ref()
                    .map_or_else(String::new, |h| format!("{:.1} °C", h.cpu_temp_c))
            } else if record.last_error_auth {
                "DOWN (API key refused)".to_owned()
            } else {
                format!(
                    "DOWN ({})",
                    record.last_error.as_deref().unwrap_or("no answer")
                )
            };
            Ok(format!(
                "{} {:<8} {:<24} {:<21} {status}",
                local_time(Utc::now()),
                kind_label(change.kind),
                record.device_id(),
                record.identity.address(),
            )
            .trim_end()
            .to_owned())
        }
        // A stream of events reads best one JSON document per line.
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            let event = ChangeEvent {
                at: Utc::now(),
                change: kind_label(change.kind),
                device: record,
            };
            let format = if format == OutputFormat::Yaml {
                OutputFormat::Yaml
            } else {
                OutputFormat::JsonCompact
            };
            output::render_single(format, &event, |_| String::new(), |_| String::new())
        }
    }
}
