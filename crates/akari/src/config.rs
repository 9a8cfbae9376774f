//! CLI configuration: a thin layer over `akari_config`.
//!
//! Loads the file, applies `GlobalOpts` overrides (--host, --api-key,
//! --timeout) and picks the entry a one-shot command targets.

use std::time::Duration;

use akari_config::Config;
use akari_core::{EntryConfig, SupervisorConfig};
use secrecy::SecretString;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Entry id used for a device given with --host.
pub const ADHOC_ENTRY: &str = "cli";

/// Everything a command needs before talking to a device.
pub struct Resolved {
    pub config: Config,
    pub supervisor: SupervisorConfig,
    pub output: OutputFormat,
}

/// Load the config file named by --config, or the default one.
///
/// An explicit --config that does not exist is an error; a missing
/// default file is not.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    match &global.config {
        Some(path) if !path.exists() => Err(CliError::NoConfig {
            path: path.display().to_string(),
        }),
        Some(path) => Ok(akari_config::load_config_from(path)?),
        None => Ok(akari_config::load_config()?),
    }
}

/// Load config and fold the global flags into a `SupervisorConfig`.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let config = load(global)?;
    let mut supervisor = config.to_supervisor_config()?;

    if let Some(secs) = global.timeout {
        if secs == 0 {
            return Err(CliError::Validation {
                field: "timeout".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        supervisor.transport.timeout = Duration::from_secs(secs);
    }

    let api_key = global.api_key.clone().map(SecretString::from);

    if let Some(host) = &global.host {
        supervisor.entries.insert(
            ADHOC_ENTRY.into(),
            EntryConfig {
                device_id: Some(host.clone()),
                host: Some(host.clone()),
                port: global
                    .port
                    .unwrap_or(akari_core::config::DEFAULT_DEVICE_PORT),
                api_key: api_key.or_else(|| supervisor.default_api_key.clone()),
            },
        );
    } else if let (Some(key), Some(entry)) = (api_key, global.entry.as_deref()) {
        if let Some(entry) = supervisor.entries.get_mut(entry) {
            entry.api_key = Some(key);
        } else {
            // Bare device ids resolve through the registry, which only
            // falls back to the default key.
            supervisor.default_api_key = Some(key);
        }
    }

    let output = global
        .output
        .or_else(|| clap::ValueEnum::from_str(&config.defaults.output, true).ok())
        .unwrap_or(OutputFormat::Table);

    Ok(Resolved {
        config,
        supervisor,
        output,
    })
}

/// The entry a one-shot command targets: --host, --entry, or the only
/// configured entry.
pub fn target_entry(global: &GlobalOpts, config: &Config) -> Result<String, CliError> {
    if global.host.is_some() {
        return Ok(ADHOC_ENTRY.into());
    }
    if let Some(entry) = &global.entry {
        if config.entries.contains_key(entry) {
            return Ok(entry.clone());
        }
        return Err(CliError::NotFound {
            entry: entry.clone(),
            available: available_entries(config),
            path: akari_config::config_path().display().to_string(),
        });
    }

    let mut names = config.entries.keys();
    match (names.next(), names.next()) {
        (Some(only), None) => Ok(only.clone()),
        _ => Err(CliError::NoTarget {
            available: available_entries(config),
        }),
    }
}

fn available_entries(config: &Config) -> String {
    if config.entries.is_empty() {
        "(none)".into()
    } else {
        config
            .entries
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use clap::Parser;
    use secrecy::ExposeSecret;

    use super::*;
    use crate::cli::Cli;

    fn config_file(toml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml.as_bytes()).unwrap();
        file
    }

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["akari"];
        argv.extend_from_slice(args);
        argv.push("health");
        Cli::try_parse_from(argv).unwrap().global
    }

    #[test]
    fn host_flag_builds_an_adhoc_entry() {
        let file = config_file("");
        let path = file.path().to_str().unwrap();
        let g = global(&["--config", path, "--host", "10.0.0.7", "--api-key", "k"]);

        let resolved = resolve(&g).unwrap();
        assert_eq!(target_entry(&g, &resolved.config).unwrap(), ADHOC_ENTRY);

        let id = resolved.supervisor.entry_identity(ADHOC_ENTRY).unwrap();
        assert_eq!(id.address(), "10.0.0.7:8080");
        assert_eq!(id.api_key.unwrap().expose_secret(), "k");
    }

    #[test]
    fn single_entry_is_the_default_target() {
        let file = config_file("[entries.zona-giorno]\nhost = \"192.168.1.40\"\n");
        let path = file.path().to_str().unwrap();
        let g = global(&["--config", path]);

        let resolved = resolve(&g).unwrap();
        assert_eq!(target_entry(&g, &resolved.config).unwrap(), "zona-giorno");
    }

    #[test]
    fn ambiguous_or_unknown_targets_fail() {
        let file = config_file(
            "[entries.a]\nhost = \"10.0.0.1\"\n[entries.b]\nhost = \"10.0.0.2\"\n",
        );
        let path = file.path().to_str().unwrap();

        let g = global(&["--config", path]);
        let resolved = resolve(&g).unwrap();
        assert!(matches!(
            target_entry(&g, &resolved.config),
            Err(CliError::NoTarget { available }) if available == "a, b"
        ));

        let g = global(&["--config", path, "--entry", "c"]);
        assert!(matches!(
            target_entry(&g, &resolved.config),
            Err(CliError::NotFound { .. })
        ));
    }

    #[test]
    fn api_key_flag_overrides_the_entry_key() {
        let file = config_file("[entries.a]\nhost = \"10.0.0.1\"\napi_key = \"old\"\n");
        let path = file.path().to_str().unwrap();
        let g = global(&["--config", path, "--entry", "a", "--api-key", "new"]);

        let resolved = resolve(&g).unwrap();
        let id = resolved.supervisor.entry_identity("a").unwrap();
        assert_eq!(id.api_key.unwrap().expose_secret(), "new");
    }

    #[test]
    fn output_falls_back_to_config_default() {
        let file = config_file("[defaults]\noutput = \"yaml\"\n");
        let path = file.path().to_str().unwrap();

        let resolved = resolve(&global(&["--config", path])).unwrap();
        assert_eq!(resolved.output, OutputFormat::Yaml);

        let resolved = resolve(&global(&["--config", path, "-o", "json"])).unwrap();
        assert_eq!(resolved.output, OutputFormat::Json);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let g = global(&["--config", "/nonexistent/akari.toml"]);
        assert!(matches!(resolve(&g), Err(CliError::NoConfig { .. })));
    }
}
