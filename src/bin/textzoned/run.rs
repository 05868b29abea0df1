// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements running the server.

use std::fmt::Write;
use std::fs::OpenOptions;
use std::path::Path;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use env_logger::{Env, Target};
use log::{error, info, warn};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use textzone::server::Server;

use crate::args::Args;
use crate::config::{self, Config};
use crate::zones;

/// Runs the server.
pub fn run(args: Args) {
    let config = match config::load(args) {
        Ok(config) => config,
        Err(e) => {
            init_logging(None);
            exit_with_failure(e);
        }
    };
    init_logging(config.log_file.as_deref());

    if let Err(e) = try_running(config) {
        exit_with_failure(e);
    }
    info!("Exiting with success.");
}

/// Sets up `env_logger`, appending to `log_file` if one is given.
fn init_logging(log_file: Option<&Path>) {
    let mut builder = env_logger::Builder::from_env(Env::new().default_filter_or("info"));
    let mut open_error = None;
    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => open_error = Some(e),
        }
    }
    builder.init();

    if let (Some(path), Some(e)) = (log_file, open_error) {
        warn!(
            "Failed to open the log file {}: {}. Logging to standard error instead.",
            path.display(),
            e,
        );
    }
}

/// Logs the cause chain of `e` and exits with status 1.
fn exit_with_failure(e: anyhow::Error) -> ! {
    let mut message = String::from("Failed to run:");
    for (i, cause) in e.chain().enumerate() {
        write!(message, "\n[{}] {}", i + 1, cause).unwrap();
    }
    message.push_str("\nExiting with failure.");
    error!("{}", message);
    process::exit(1);
}

fn try_running(config: Config) -> Result<()> {
    info!(
        "Textzone daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );
    config::log_config_summary(&config);

    // Bind before loading the zone file, so that an unusable address
    // fails fast.
    let io_provider = config
        .io
        .bind_provider(config.bind)
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!("Bound UDP socket to {}.", config.bind);

    let zone = zones::load(&config.zone_file, config.strict_zone_loading)?;
    let server = Arc::new(Server::new(Arc::new(zone)));

    let mut signals = set_up_signal_handling().context("failed to set up signal handling")?;

    info!("Set-up is complete; starting the server.");
    let running = io_provider
        .start(&server)
        .context("failed to start the I/O provider")?;

    if let Some(signal) = signals.forever().next() {
        let name = match signal {
            SIGINT => "SIGINT",
            SIGTERM => "SIGTERM",
            _ => unreachable!(),
        };
        info!("Received {}; shutting down.", name);
    }

    running.shut_down();
    info!("Shutdown complete.");
    Ok(())
}

fn set_up_signal_handling() -> Result<Signals> {
    let term_signals = &[SIGINT, SIGTERM];
    let already_terminating = Arc::new(AtomicBool::new(false));

    // A second termination signal arriving before graceful shutdown
    // finishes exits immediately.
    for sig in term_signals {
        signal_hook::flag::register_conditional_shutdown(*sig, 1, already_terminating.clone())?;
        signal_hook::flag::register(*sig, already_terminating.clone())?;
    }

    Signals::new(term_signals).map_err(Into::into)
}
