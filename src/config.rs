/*
 * This file is part of tbalancer.
 *
 * Copyright (C) 2025 tbalancer contributors
 *
 * tbalancer is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * tbalancer is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with tbalancer. If not, see <https://www.gnu.org/licenses/>.
 */

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tb_core::constants::{protocol, timing};
use tb_core::{FanRpmPolicy, SessionOptions, TemperatureUnit, TransportConfig};
use tb_error::{Result, TBalancerError};

const APP_DIR: &str = "tbalancer";
const CONFIG_FILE: &str = "config.json";

fn default_protocol_version() -> u8 { protocol::DEFAULT_PROTOCOL_VERSION }
fn default_poll_interval_ms() -> u64 { timing::DEFAULT_POLL_INTERVAL_MS }
fn default_read_timeout_ms() -> u64 { timing::DEFAULT_READ_TIMEOUT_MS }
fn default_probe_timeout_ms() -> u64 { timing::DEFAULT_PROBE_TIMEOUT_MS }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SavedConfig {
    /// Serial port; probed from discovered ports when absent
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u8,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default)]
    pub fan_rpm_policy: FanRpmPolicy,
    #[serde(default)]
    pub temperature_unit: TemperatureUnit,
    /// JSON-lines event journal
    #[serde(default)]
    pub event_log: Option<PathBuf>,
}

impl Default for SavedConfig {
    fn default() -> Self {
        Self {
            port: None,
            protocol_version: default_protocol_version(),
            poll_interval_ms: default_poll_interval_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            fan_rpm_policy: FanRpmPolicy::default(),
            temperature_unit: TemperatureUnit::default(),
            event_log: None,
        }
    }
}

impl SavedConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            protocol_version: self.protocol_version,
            fan_rpm_policy: self.fan_rpm_policy,
        }
    }

    pub fn transport_config(&self, port: &str) -> TransportConfig {
        TransportConfig::new(port).with_read_timeout(Duration::from_millis(self.read_timeout_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        return Path::new(&xdg).join(APP_DIR).join(CONFIG_FILE);
    }
    if let Ok(home) = env::var("HOME") {
        return Path::new(&home).join(".config").join(APP_DIR).join(CONFIG_FILE);
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join(APP_DIR).join(CONFIG_FILE);
    }
    PathBuf::from("/etc/tbalancer/config.json")
}

/// Load and validate the config at `path`; a missing file yields defaults
pub fn load_config(path: &Path) -> Result<SavedConfig> {
    if !path.exists() {
        return Ok(SavedConfig::default());
    }
    let data = fs::read_to_string(path).map_err(|source| TBalancerError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg: SavedConfig = serde_json::from_str(&data)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn save_config(path: &Path, cfg: &SavedConfig) -> Result<()> {
    validate_config(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| TBalancerError::FileWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(cfg)?;
    fs::write(path, json).map_err(|source| TBalancerError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Write defaults to `path`; an existing file is kept unless `force`
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(TBalancerError::config(format!(
            "{} already exists, use --force to overwrite",
            path.display()
        )));
    }
    save_config(path, &SavedConfig::default())
}

fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(TBalancerError::invalid_config(
            field,
            format!("{} is outside {}..={}", value, min, max),
        ))
    }
}

fn is_safe_port(s: &str) -> bool {
    if s.is_empty() || s.len() > 256 { return false; }
    s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '\\' | '.' | '_' | '-' | ':'))
}

pub fn validate_config(cfg: &SavedConfig) -> Result<()> {
    if let Some(port) = &cfg.port {
        if !is_safe_port(port) {
            return Err(TBalancerError::invalid_config("port", format!("invalid port name '{}'", port)));
        }
    }
    check_range("poll_interval_ms", cfg.poll_interval_ms, 100, 60_000)?;
    check_range("read_timeout_ms", cfg.read_timeout_ms, 10, 10_000)?;
    check_range("probe_timeout_ms", cfg.probe_timeout_ms, 50, 10_000)?;
    if let Some(path) = &cfg.event_log {
        if path.as_os_str().is_empty() {
            return Err(TBalancerError::invalid_config("event_log", "path is empty"));
        }
    }
    Ok(())
}
