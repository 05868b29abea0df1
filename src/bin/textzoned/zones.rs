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

//! Implements zone loading.

use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::Level::Warn;
use log::{error, info, log_enabled, warn};

use textzone::zone::ZoneTable;
use textzone::zone_file::{self, Issue};

/// How many skipped lines are listed individually in the log.
const MAX_ISSUES_LISTED: usize = 20;

/// Loads the zone file at `path`.
///
/// If the file cannot be opened or read, this fails when `strict` is
/// set; otherwise the error is logged and an empty table is returned,
/// so that the server still runs (and answers every query with a
/// miss).
pub fn load(path: &Path, strict: bool) -> Result<ZoneTable> {
    info!("Loading the zone file {}.", path.display());
    match zone_file::load_from_path(path) {
        Ok(loaded) => {
            log_issues(path, &loaded.issues);
            if loaded.table.len() == 1 {
                info!("Loaded 1 record.");
            } else {
                info!("Loaded {} records.", loaded.table.len());
            }
            Ok(loaded.table)
        }
        Err(e) if strict => Err(e).context("failed to load the zone file"),
        Err(e) => {
            error!("Failed to load the zone file: {e}. Serving an empty zone table.");
            Ok(ZoneTable::new())
        }
    }
}

/// Writes the skipped lines of a zone file to the log as a warning.
fn log_issues(path: &Path, issues: &[Issue]) {
    if issues.is_empty() || !log_enabled!(Warn) {
        return;
    }

    let mut message = if issues.len() == 1 {
        format!("Skipped 1 line of {}:", path.display())
    } else {
        format!("Skipped {} lines of {}:", issues.len(), path.display())
    };
    for (i, issue) in issues.iter().take(MAX_ISSUES_LISTED).enumerate() {
        write!(message, "\n[{}] {}", i + 1, issue).unwrap();
    }
    if issues.len() > MAX_ISSUES_LISTED {
        write!(message, "\n...and {} more.", issues.len() - MAX_ISSUES_LISTED).unwrap();
    }
    warn!("{}", message);
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn missing_zone_file_is_fatal_only_when_strict() {
        let path = PathBuf::from_iter(["does", "not", "exist", "textzone.test.zone"]);
        assert!(load(&path, false).unwrap().is_empty());
        assert!(load(&path, true).is_err());
    }
}
