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

//! Implements the server configuration file.

use std::fmt::Write;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use serde::Deserialize;

use textzone::server::Server;

use crate::args::Args;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the server configuration from the file given by `path`.
///
/// Relative zone file and log file paths are interpreted relative to
/// the configuration file's directory.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let dir = match path.as_ref().parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let raw_config =
        fs::read_to_string(path.as_ref()).context("failed to read the configuration file")?;
    let mut config: Config =
        toml::from_str(&raw_config).context("failed to parse the configuration file")?;

    if config.zone_file.is_relative() {
        config.zone_file = dir.join(&config.zone_file);
    }
    if let Some(ref mut log_file) = config.log_file {
        if log_file.is_relative() {
            *log_file = dir.join(&*log_file);
        }
    }
    Ok(config)
}

/// Loads the server configuration from the parsed command line
/// arguments given by `args`. Anything the positional form cannot
/// express takes its default.
pub fn load_from_args(args: Args) -> Result<Config> {
    let ip = args.ip.unwrap_or(DEFAULT_BIND_IP);
    let port = args.port.unwrap_or(DEFAULT_BIND_PORT);
    Ok(Config {
        bind: SocketAddr::new(IpAddr::V4(ip), port),
        zone_file: args
            .zone_file
            .ok_or_else(|| anyhow!("no zone file was provided"))?,
        log_file: args.log_file,
        strict_zone_loading: false,
        io: default_io_provider_config(),
    })
}

/// Loads the configuration from whichever source `args` selects.
pub fn load(args: Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        load_from_path(config_path)
    } else {
        load_from_args(args)
    }
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
pub fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    let mut message = format!(
        "Configuration loaded:\n\
         Bind address: {}\n\
         Zone file:    {}\n\
         Strict zones: {}\n\
         I/O provider: {}",
        config.bind,
        config.zone_file.display(),
        config.strict_zone_loading,
        config.io.name(),
    );
    match config.io {
        IoProviderConfig::Blocking(ref c) => write!(
            message,
            " ({} workers, queue depth {})",
            c.workers, c.queue_depth
        )
        .unwrap(),
        #[cfg(feature = "tokio")]
        IoProviderConfig::Tokio(ref c) => {
            write!(message, " (at most {} in flight)", c.max_in_flight).unwrap()
        }
    }
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The address to listen on. Only a configuration file can leave
    /// this out, since the positional form requires both the address
    /// and the port; the default is 127.0.0.1:53, and port 53 needs
    /// privileges on most systems.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    pub zone_file: PathBuf,
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub strict_zone_loading: bool,
    #[serde(default = "default_io_provider_config")]
    pub io: IoProviderConfig,
}

const DEFAULT_BIND_IP: Ipv4Addr = Ipv4Addr::LOCALHOST;
const DEFAULT_BIND_PORT: u16 = 53;

fn default_bind() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(DEFAULT_BIND_IP), DEFAULT_BIND_PORT)
}

/// Makes a [`NonZeroUsize`] default, checked at compile time.
const fn non_zero(n: usize) -> NonZeroUsize {
    match NonZeroUsize::new(n) {
        Some(n) => n,
        None => panic!("default must be non-zero"),
    }
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: I/O PROVIDERS                               //
////////////////////////////////////////////////////////////////////////

/// An abstraction over all supported I/O providers, once bound.
pub trait IoProvider {
    /// Starts serving `server`. The returned [`RunningProvider`] shuts
    /// the provider down again.
    fn start(self: Box<Self>, server: &Arc<Server>) -> Result<Box<dyn RunningProvider>>;
}

/// An I/O provider that has been started.
pub trait RunningProvider {
    /// Shuts the provider down gracefully, waiting for requests in
    /// progress to be answered.
    fn shut_down(self: Box<Self>);
}

/// The selection of I/O provider and its configuration.
///
/// To actually create the selected provider with its configuration and
/// bind it to an address, use [`IoProviderConfig::bind_provider`].
#[derive(Debug, Deserialize)]
#[serde(tag = "provider")]
pub enum IoProviderConfig {
    #[serde(rename = "blocking")]
    Blocking(blocking_io::Config),
    #[cfg(feature = "tokio")]
    #[serde(rename = "tokio")]
    Tokio(tokio_io::Config),
}

impl IoProviderConfig {
    /// Returns the name of the selected I/O provider.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Blocking(_) => "blocking",
            #[cfg(feature = "tokio")]
            Self::Tokio(_) => "tokio",
        }
    }

    /// Creates the selected I/O provider with this configuration and
    /// binds it to the provided address.
    pub fn bind_provider(&self, addr: SocketAddr) -> io::Result<Box<dyn IoProvider>> {
        match self {
            Self::Blocking(config) => {
                let io_provider = textzone::io::BlockingIoProvider::bind(config.into(), addr)?;
                Ok(Box::new(io_provider))
            }
            #[cfg(feature = "tokio")]
            Self::Tokio(config) => Ok(Box::new(tokio_io::bind(config, addr)?)),
        }
    }
}

/// Support for the
/// [`BlockingIoProvider`](textzone::io::BlockingIoProvider).
mod blocking_io {
    use super::*;
    use textzone::io::{BlockingIoConfig, BlockingIoProvider};
    use textzone::thread::ThreadGroup;

    impl IoProvider for BlockingIoProvider {
        fn start(self: Box<Self>, server: &Arc<Server>) -> Result<Box<dyn RunningProvider>> {
            let group = ThreadGroup::new();
            BlockingIoProvider::start(*self, server, &group)?;
            Ok(Box::new(RunningBlocking(group)))
        }
    }

    struct RunningBlocking(Arc<ThreadGroup>);

    impl RunningProvider for RunningBlocking {
        fn shut_down(self: Box<Self>) {
            self.0.shut_down();
            self.0.await_shutdown();
        }
    }

    /// Provider configuration for the [`BlockingIoProvider`]. This
    /// mirrors [`BlockingIoConfig`] and can be converted into one; its
    /// purpose is to make the configuration deserializable and to
    /// provide defaults. A pool without workers would never answer, so
    /// `workers = 0` is rejected when the file is parsed.
    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct Config {
        #[serde(default = "default_workers")]
        pub workers: NonZeroUsize,
        #[serde(default = "default_queue_depth")]
        pub queue_depth: usize,
    }

    fn default_workers() -> NonZeroUsize {
        const WORKERS: NonZeroUsize = non_zero(4);
        WORKERS
    }

    fn default_queue_depth() -> usize {
        64
    }

    impl Default for Config {
        fn default() -> Self {
            Self {
                workers: default_workers(),
                queue_depth: default_queue_depth(),
            }
        }
    }

    impl From<&Config> for BlockingIoConfig {
        fn from(toml_config: &Config) -> Self {
            Self {
                workers: toml_config.workers,
                queue_depth: toml_config.queue_depth,
            }
        }
    }
}

/// Support for the [`TokioIoProvider`](textzone::io::TokioIoProvider).
/// The binary owns the runtime the provider runs on.
#[cfg(feature = "tokio")]
mod tokio_io {
    use super::*;
    use textzone::io::{TokioIoConfig, TokioIoProvider, TokioShutdownController};
    use tokio::runtime::{self, Runtime};

    /// A bound [`TokioIoProvider`] along with its runtime.
    pub struct BoundTokio {
        runtime: Runtime,
        provider: TokioIoProvider,
    }

    pub fn bind(config: &Config, addr: SocketAddr) -> io::Result<BoundTokio> {
        let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;
        let provider = runtime.block_on(TokioIoProvider::bind(config.into(), addr))?;
        Ok(BoundTokio { runtime, provider })
    }

    impl IoProvider for BoundTokio {
        fn start(self: Box<Self>, server: &Arc<Server>) -> Result<Box<dyn RunningProvider>> {
            let BoundTokio { runtime, provider } = *self;
            let controller = {
                let _guard = runtime.enter();
                provider.start(server)
            };
            Ok(Box::new(RunningTokio {
                runtime,
                controller,
            }))
        }
    }

    struct RunningTokio {
        runtime: Runtime,
        controller: TokioShutdownController,
    }

    impl RunningProvider for RunningTokio {
        fn shut_down(self: Box<Self>) {
            let RunningTokio {
                runtime,
                controller,
            } = *self;
            runtime.block_on(controller.shut_down());
        }
    }

    /// Provider configuration for the [`TokioIoProvider`]. As with
    /// the blocking provider's workers, `max_in_flight = 0` is
    /// rejected.
    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct Config {
        #[serde(default = "default_max_in_flight")]
        pub max_in_flight: NonZeroUsize,
    }

    fn default_max_in_flight() -> NonZeroUsize {
        const MAX_IN_FLIGHT: NonZeroUsize = non_zero(256);
        MAX_IN_FLIGHT
    }

    impl From<&Config> for TokioIoConfig {
        fn from(toml_config: &Config) -> Self {
            Self {
                max_in_flight: toml_config.max_in_flight,
            }
        }
    }
}

fn default_io_provider_config() -> IoProviderConfig {
    IoProviderConfig::Blocking(blocking_io::Config::default())
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
