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

//! Implements command-line argument parsing.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process;

use clap::{ArgGroup, Parser};

/// Parses the command line arguments.
///
/// Help and version requests exit with success. Any other problem with
/// the arguments is printed and exits with status 1.
pub fn parse() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    }
}

/// The textzone daemon, a text-protocol zone server over UDP
#[derive(Debug, Parser)]
#[command(author, version)]
#[command(group(ArgGroup::new("source").required(true).args(["config", "ip"])))]
pub struct Args {
    /// Load the configuration from a file instead of the positional
    /// arguments
    #[arg(long, value_name = "FILE", conflicts_with = "ip")]
    pub config: Option<PathBuf>,

    /// Set the IPv4 address to bind
    #[arg(value_name = "IP", requires = "log_file")]
    pub ip: Option<Ipv4Addr>,

    /// Set the UDP port to bind
    #[arg(value_name = "PORT")]
    pub port: Option<u16>,

    /// Set the zone file to serve
    #[arg(value_name = "ZONE_FILE")]
    pub zone_file: Option<PathBuf>,

    /// Set the file to which log output is appended
    #[arg(value_name = "LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_arguments_are_parsed() {
        let args = Args::try_parse_from([
            "textzoned",
            "127.0.0.1",
            "5353",
            "zones/example.zone",
            "textzoned.log",
        ])
        .unwrap();
        assert!(args.config.is_none());
        assert_eq!(args.ip, Some(Ipv4Addr::LOCALHOST));
        assert_eq!(args.port, Some(5353));
        assert_eq!(args.zone_file, Some(PathBuf::from("zones/example.zone")));
        assert_eq!(args.log_file, Some(PathBuf::from("textzoned.log")));
    }

    #[test]
    fn config_option_is_parsed() {
        let args = Args::try_parse_from(["textzoned", "--config", "textzoned.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("textzoned.toml")));
        assert!(args.ip.is_none());
    }

    #[test]
    fn incomplete_or_invalid_arguments_are_rejected() {
        assert!(Args::try_parse_from(["textzoned"]).is_err());
        assert!(Args::try_parse_from(["textzoned", "127.0.0.1", "5353"]).is_err());
        assert!(
            Args::try_parse_from(["textzoned", "::1", "5353", "example.zone", "log"]).is_err()
        );
        assert!(
            Args::try_parse_from(["textzoned", "127.0.0.1", "port", "example.zone", "log"])
                .is_err()
        );
        assert!(Args::try_parse_from([
            "textzoned",
            "--config",
            "textzoned.toml",
            "127.0.0.1",
            "5353",
            "example.zone",
            "log",
        ])
        .is_err());
    }
}
