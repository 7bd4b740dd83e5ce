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

//! Command Line Interface

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::warn;

use tb_core::{
    discover_ports, find_controller, format_sensor_line, probe_port, SensorEvent, SerialTransport,
    Session,
};
use tb_error::TBalancerError;

use crate::capture::{poll_until_frame, replay_files, write_capture};
use crate::config::{config_path, init_config, load_config, SavedConfig};
use crate::logger::log_event;
use crate::service::{run_monitor, write_sensors, MonitorOptions};

#[derive(Parser)]
#[command(name = "tbalancer")]
#[command(version)]
#[command(about = "tbalancer - T-Balancer bigNG fan controller monitor")]
#[command(long_about = "tbalancer - T-Balancer bigNG fan controller monitor

Polls the controller over its USB serial port (19200 8N1) and reports
temperature and fan sensors as they appear and disappear.

EXAMPLES:
    tbalancer ports                          List serial ports, FTDI first
    tbalancer probe                          Find the controller
    tbalancer monitor --port /dev/ttyUSB0    Watch sensors until Ctrl-C
    tbalancer monitor --ticks 10 --values    Ten polls, print values each tick
    tbalancer report                         Hex dump of the last frame
    tbalancer capture --out frame.bin        Save one raw frame
    tbalancer replay frame.bin               Decode saved frames offline
    tbalancer config init                    Write a default config file

ENVIRONMENT VARIABLES:
    RUST_LOG=debug         Enable debug logging

FILES:
    ~/.config/tbalancer/config.json   Configuration")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: ~/.config/tbalancer/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `tb_core=trace`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Write the JSON-lines event journal
    #[arg(long, global = true)]
    pub logging: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll the controller and print sensor changes
    Monitor {
        /// Serial port (default: config, then auto-detect)
        #[arg(long)]
        port: Option<String>,
        /// Stop after N polls
        #[arg(long)]
        ticks: Option<u64>,
        /// Poll interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Print all active sensors after each poll
        #[arg(long)]
        values: bool,
    },

    /// Print the diagnostic report for one frame
    Report {
        #[arg(long)]
        port: Option<String>,
    },

    /// Check which port answers like a controller
    Probe {
        /// Probe only this port
        #[arg(long)]
        port: Option<String>,
    },

    /// List serial ports
    Ports {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Save the raw bytes of one valid frame
    Capture {
        #[arg(long)]
        port: Option<String>,
        /// Output file
        #[arg(long)]
        out: PathBuf,
    },

    /// Decode captured frames without a device
    Replay {
        /// Capture files, applied in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Configuration file management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the config file path
    Path,
    /// Print the effective configuration as JSON
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn config_file(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config_path)
    }
}

/// Journal path for `--logging` when the config names none
pub fn default_event_log_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tbalancer").join("events.json"))
        .unwrap_or_else(|| PathBuf::from(crate::logger::FALLBACK_LOG_PATH))
}

pub fn run_cli(cli: &Cli, cfg: &SavedConfig, shutdown: &AtomicBool) -> Result<()> {
    match &cli.command {
        Commands::Monitor { port, ticks, interval_ms, values } => {
            cmd_monitor(cfg, port.as_deref(), *ticks, *interval_ms, *values, shutdown)
        }
        Commands::Report { port } => cmd_report(cfg, port.as_deref()),
        Commands::Probe { port } => cmd_probe(cfg, port.as_deref()),
        Commands::Ports { json } => cmd_ports(*json),
        Commands::Capture { port, out } => cmd_capture(cfg, port.as_deref(), out),
        Commands::Replay { files } => cmd_replay(cfg, files),
        Commands::Config(sub) => cmd_config(sub, &cli.config_file(), cfg),
    }
}

/// Explicit port, then the configured one, then the first probed controller
fn resolve_port(arg: Option<&str>, cfg: &SavedConfig) -> Result<String> {
    if let Some(port) = arg.or(cfg.port.as_deref()) {
        return Ok(port.to_string());
    }
    let candidates = discover_ports()?;
    find_controller(&candidates, &cfg.transport_config(""), cfg.protocol_version, cfg.probe_timeout())
        .ok_or_else(|| {
            anyhow::Error::from(TBalancerError::NoDevice(format!(
                "no controller answered on {} candidate port(s)",
                candidates.len()
            )))
        })
}

fn open_session(cfg: &SavedConfig, port: &str) -> Session<SerialTransport> {
    let session = Session::open(&cfg.transport_config(port), cfg.session_options());
    log_event("session_open", json!({ "port": port, "open": session.is_open() }));
    session
}

fn cmd_monitor(
    cfg: &SavedConfig,
    port: Option<&str>,
    ticks: Option<u64>,
    interval_ms: Option<u64>,
    values: bool,
    shutdown: &AtomicBool,
) -> Result<()> {
    let port = resolve_port(port, cfg)?;
    let interval = interval_ms.map(Duration::from_millis).unwrap_or_else(|| cfg.poll_interval());
    let mut session = open_session(cfg, &port);
    if !session.is_open() {
        warn!("{} is not available; polling is a no-op", port);
    }

    let opts = MonitorOptions {
        interval,
        ticks,
        unit: cfg.temperature_unit,
        show_values: values,
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = run_monitor(&mut session, &opts, shutdown, &mut out)?;
    writeln!(
        out,
        "{} poll(s), {} valid frame(s), {} invalid, {} added, {} removed",
        summary.stats.polls_sent,
        summary.stats.frames_valid,
        summary.stats.frames_invalid,
        summary.added,
        summary.removed
    )?;
    Ok(())
}

fn cmd_report(cfg: &SavedConfig, port: Option<&str>) -> Result<()> {
    let port = resolve_port(port, cfg)?;
    let mut session = open_session(cfg, &port);
    if let Err(e) = poll_until_frame(&mut session, cfg.probe_timeout()) {
        warn!("{}", e);
    }
    print!("{}", session.report());
    session.close();
    Ok(())
}

fn cmd_probe(cfg: &SavedConfig, port: Option<&str>) -> Result<()> {
    let ports: Vec<String> = match port {
        Some(p) => vec![p.to_string()],
        None => discover_ports()?.into_iter().map(|c| c.port).collect(),
    };
    if ports.is_empty() {
        bail!("no serial ports found");
    }
    let mut found = false;
    for port in &ports {
        let outcome = probe_port(&cfg.transport_config(port), cfg.protocol_version, cfg.probe_timeout());
        found |= outcome.is_ready();
        println!("{:<20} {}", port, outcome.describe());
    }
    if !found {
        bail!(TBalancerError::NoDevice(format!("probed {} port(s)", ports.len())));
    }
    Ok(())
}

fn cmd_ports(as_json: bool) -> Result<()> {
    let candidates = discover_ports()?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
        return Ok(());
    }
    println!("Serial Ports ({}):", candidates.len());
    for c in &candidates {
        let usb = c
            .usb
            .as_ref()
            .map(|u| format!("USB {:04x}:{:04x}", u.vid, u.pid))
            .unwrap_or_else(|| "-".into());
        let mark = if c.likely_controller { "*" } else { " " };
        println!(" {} {:<20} {}", mark, c.port, usb);
    }
    Ok(())
}

fn cmd_capture(cfg: &SavedConfig, port: Option<&str>, out: &Path) -> Result<()> {
    let port = resolve_port(port, cfg)?;
    let mut session = open_session(cfg, &port);
    let frame = poll_until_frame(&mut session, cfg.probe_timeout())
        .with_context(|| format!("capture from {}", port))?;
    session.close();
    write_capture(out, &frame)?;
    println!("Captured one frame from {} to {}", port, out.display());
    Ok(())
}

fn cmd_replay(cfg: &SavedConfig, files: &[PathBuf]) -> Result<()> {
    let replay = replay_files(files, cfg.session_options())?;
    let unit = cfg.temperature_unit;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for event in &replay.events {
        match event {
            SensorEvent::Added(s) => writeln!(out, "+ {}", format_sensor_line(s, unit))?,
            SensorEvent::Removed(s) => writeln!(out, "- {}", s.label())?,
        }
    }
    writeln!(out, "Active sensors:")?;
    write_sensors(&replay.session, unit, &mut out)?;
    writeln!(out)?;
    write!(out, "{}", replay.session.report())?;
    Ok(())
}

fn cmd_config(cmd: &ConfigCommands, path: &Path, cfg: &SavedConfig) -> Result<()> {
    match cmd {
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Show => println!("{}", serde_json::to_string_pretty(cfg)?),
        ConfigCommands::Init { force } => {
            init_config(path, *force)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}

/// Load the config named by the CLI; an unreadable config is fatal
pub fn load_cli_config(cli: &Cli) -> Result<SavedConfig> {
    let path = cli.config_file();
    load_config(&path).with_context(|| format!("load config {}", path.display()))
}
