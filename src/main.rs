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

use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use serde_json::json;
use tracing::{error, info, warn};

use tbalancer::cli::{default_event_log_path, load_cli_config, run_cli, Cli};
use tbalancer::logger::{init_event_log, log_event};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Set by the Ctrl-C handler; the monitor loop checks it every tick
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(&log_level)
        .with_writer(std::io::stderr)
        .init();

    let cfg = match load_cli_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{:#}", e);
            return Err(e);
        }
    };

    let journal = cfg
        .event_log
        .clone()
        .or_else(|| cli.logging.then(default_event_log_path));
    if let Some(path) = journal {
        match init_event_log(&path) {
            Some(used) => info!("Event journal: {}", used.display()),
            None => warn!("Cannot open event journal {}", path.display()),
        }
    }
    log_event("startup", json!({ "version": VERSION, "log_level": log_level }));

    if let Err(e) = ctrlc::set_handler(|| {
        SHUTDOWN.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    let result = run_cli(&cli, &cfg, &SHUTDOWN);
    if let Err(e) = &result {
        log_event("fatal_error", json!({ "error": format!("{:#}", e) }));
    }
    result
}
