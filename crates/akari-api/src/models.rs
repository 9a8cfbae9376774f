// ── Wire models for the device control plane ──
//
// Typed views over the JSON bodies served by the device firmware. Config
// sections stay opaque: content validation belongs to the device.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::Error;

// ── Config sections ─────────────────────────────────────────────────

/// Named, independently readable/writable slice of a device's configuration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SectionName {
    Mqtt,
    Devices,
    Covers,
    Sensors,
    Modbus,
    System,
}

impl SectionName {
    /// Validate a user-supplied section name.
    ///
    /// This is a purely local precondition: an unknown name never reaches
    /// the network.
    pub fn parse(name: &str) -> Result<Self, Error> {
        Self::from_str(name).map_err(|_| Error::InvalidSection {
            name: name.to_owned(),
        })
    }

    /// Comma-separated list of every valid section name.
    pub fn names() -> String {
        Self::iter()
            .map(|s| s.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Opaque structured document returned by `GET /config/<section>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSection(pub Map<String, Value>);

impl ConfigSection {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ConfigSection {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ── Acknowledgements ────────────────────────────────────────────────

/// Response to a mutating call (`PUT /config/*`, `POST /restart`, `POST /reload`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// The device needs a service restart before the change takes effect.
    #[serde(default)]
    pub restart_required: bool,
    #[serde(default)]
    pub message: Option<String>,
}

// ── Health ──────────────────────────────────────────────────────────

/// Firmware modules whose up/down state is reported by `GET /health`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Module {
    Mqtt,
    Mcp,
    Gpio,
    Modbus,
    Ds18b20,
    OverlayFs,
}

/// Tri-state view of one module. A module absent from the response is
/// `Unknown`, never `Down`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Up,
    Down,
    Unknown,
}

/// Up/down flags keyed by the fixed module set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleStatus(BTreeMap<Module, bool>);

impl ModuleStatus {
    pub fn state(&self, module: Module) -> ModuleState {
        match self.0.get(&module) {
            Some(true) => ModuleState::Up,
            Some(false) => ModuleState::Down,
            None => ModuleState::Unknown,
        }
    }

    pub fn set(&mut self, module: Module, up: bool) {
        self.0.insert(module, up);
    }

    /// Every module of the fixed set with its state, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Module, ModuleState)> + '_ {
        Module::iter().map(|m| (m, self.state(m)))
    }

    /// Build from the raw `modules` object. Unknown names are ignored;
    /// values are interpreted leniently (see [`module_flag`]).
    fn from_raw(raw: &Map<String, Value>) -> Self {
        let flags = raw
            .iter()
            .filter_map(|(name, value)| {
                let module = Module::from_str(name).ok()?;
                Some((module, module_flag(value)?))
            })
            .collect();
        Self(flags)
    }
}

/// Firmware reports module state as a bool, a status word, or a number.
fn module_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => Some(matches!(
            s.to_ascii_lowercase().as_str(),
            "true" | "ok" | "running" | "active" | "1"
        )),
        Value::Number(n) => Some(n.as_f64().is_some_and(|v| v != 0.0)),
        _ => None,
    }
}

/// Snapshot of a device's health, as returned by `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceHealth {
    pub cpu_temp_c: f64,
    pub ram_used_bytes: u64,
    pub ram_total_bytes: u64,
    pub uptime_seconds: u64,
    pub module_status: ModuleStatus,
}

impl DeviceHealth {
    /// RAM usage as a percentage, if the total is known.
    #[allow(clippy::as_conversions, clippy::cast_precision_loss)]
    pub fn ram_used_pct(&self) -> Option<f64> {
        (self.ram_total_bytes > 0)
            .then(|| self.ram_used_bytes as f64 / self.ram_total_bytes as f64 * 100.0)
    }
}

#[derive(Deserialize)]
struct RawHealth {
    #[serde(alias = "cpu_temp")]
    cpu_temp_c: f64,
    ram_used_bytes: u64,
    ram_total_bytes: u64,
    #[serde(alias = "uptime")]
    uptime_seconds: u64,
    #[serde(default, alias = "module_status")]
    modules: Map<String, Value>,
}

impl<'de> Deserialize<'de> for DeviceHealth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawHealth::deserialize(deserializer)?;
        Ok(Self {
            cpu_temp_c: raw.cpu_temp_c,
            ram_used_bytes: raw.ram_used_bytes,
            ram_total_bytes: raw.ram_total_bytes,
            uptime_seconds: raw.uptime_seconds,
            module_status: ModuleStatus::from_raw(&raw.modules),
        })
    }
}

// ── Device list ─────────────────────────────────────────────────────

/// One entry of `GET /devices`: a device configured on the remote unit
/// (relay, cover, sensor...). Only the common fields are typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub state: Option<Value>,
    /// All remaining fields the firmware sends.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self
            .name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("<unnamed>");
        match &self.kind {
            Some(kind) => write!(f, "{label} ({kind})"),
            None => f.write_str(label),
        }
    }
}

/// `GET /devices` answers either a bare array or `{"devices": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum DeviceListBody {
    Bare(Vec<DeviceSummary>),
    Wrapped { devices: Vec<DeviceSummary> },
}

impl DeviceListBody {
    pub(crate) fn into_vec(self) -> Vec<DeviceSummary> {
        match self {
            Self::Bare(list) | Self::Wrapped { devices: list } => list,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn section_parse_accepts_known_names_only() {
        assert_eq!(SectionName::parse("modbus").unwrap(), SectionName::Modbus);
        assert_eq!(SectionName::System.to_string(), "system");
        assert!(matches!(
            SectionName::parse("Modbus"),
            Err(Error::InvalidSection { .. })
        ));
        assert!(matches!(
            SectionName::parse(""),
            Err(Error::InvalidSection { .. })
        ));
    }

    #[test]
    fn health_parses_canonical_body() {
        let health: DeviceHealth = serde_json::from_value(json!({
            "cpu_temp_c": 48.3,
            "ram_used_bytes": 200_000_000u64,
            "ram_total_bytes": 1_000_000_000u64,
            "uptime_seconds": 3600,
            "modules": { "mqtt": true, "gpio": false, "overlay_fs": "active" }
        }))
        .unwrap();

        assert_eq!(health.uptime_seconds, 3600);
        assert_eq!(health.module_status.state(Module::Mqtt), ModuleState::Up);
        assert_eq!(health.module_status.state(Module::Gpio), ModuleState::Down);
        assert_eq!(
            health.module_status.state(Module::OverlayFs),
            ModuleState::Up
        );
        assert_eq!(health.ram_used_pct(), Some(20.0));
    }

    #[test]
    fn missing_modules_are_unknown_not_down() {
        let health: DeviceHealth = serde_json::from_value(json!({
            "cpu_temp": 40.0,
            "ram_used_bytes": 1,
            "ram_total_bytes": 2,
            "uptime": 5,
            "modules": { "modbus": "stopped", "zigbee": true }
        }))
        .unwrap();

        let states: Vec<_> = health.module_status.iter().collect();
        assert_eq!(
            states,
            vec![
                (Module::Mqtt, ModuleState::Unknown),
                (Module::Mcp, ModuleState::Unknown),
                (Module::Gpio, ModuleState::Unknown),
                (Module::Modbus, ModuleState::Down),
                (Module::Ds18b20, ModuleState::Unknown),
                (Module::OverlayFs, ModuleState::Unknown),
            ]
        );
    }

    #[test]
    fn health_requires_core_fields() {
        let result: Result<DeviceHealth, _> = serde_json::from_value(json!({
            "cpu_temp_c": 40.0,
            "uptime_seconds": 5
        }));
        assert!(result.is_err());
    }

    #[test]
    fn module_flag_interprets_status_words_and_numbers() {
        assert_eq!(module_flag(&json!("Running")), Some(true));
        assert_eq!(module_flag(&json!("failed")), Some(false));
        assert_eq!(module_flag(&json!(0)), Some(false));
        assert_eq!(module_flag(&json!(2)), Some(true));
        assert_eq!(module_flag(&json!(null)), None);
    }

    #[test]
    fn device_list_accepts_both_shapes() {
        let bare: DeviceListBody =
            serde_json::from_value(json!([{ "id": "relay1", "type": "relay" }])).unwrap();
        let wrapped: DeviceListBody =
            serde_json::from_value(json!({ "devices": [{ "name": "Tapparella sud" }] })).unwrap();

        let bare = bare.into_vec();
        assert_eq!(bare[0].kind.as_deref(), Some("relay"));
        assert_eq!(bare[0].to_string(), "relay1 (relay)");
        assert_eq!(wrapped.into_vec()[0].to_string(), "Tapparella sud");
    }
}
