//
//  Copyright (C) 2022-2024  Chase Ruskin
//
//  This program is free software: you can redistribute it and/or modify
//  it under the terms of the GNU General Public License as published by
//  the Free Software Foundation, either version 3 of the License, or
//  (at your option) any later version.
//
//  This program is distributed in the hope that it will be useful,
//  but WITHOUT ANY WARRANTY; without even the implied warranty of
//  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//  GNU General Public License for more details.
//
//  You should have received a copy of the GNU General Public License
//  along with this program.  If not, see <http://www.gnu.org/licenses/>.
//


use crate::util::anyerror::Fault;
use crate::util::environment::{self, Environment, TPCC_PROFILE_PATH, TPDCC_PROFILE};
use serde_derive::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

const DEFAULT_PROFILE_FILE: &str = "trellis-profile.jsonl";

#[derive(Debug, PartialEq, Serialize)]
struct Record<'a> {
    phase: &'a str,
    elapsed_ms: u64,
}

/// Times named phases and appends one JSON record per phase to a file.
#[derive(Debug, Clone, PartialEq)]
pub struct Profiler {
    path: PathBuf,
}

impl Profiler {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Creates a profiler when `TPDCC_PROFILE` is truthy.
    ///
    /// Records go to `TPCC_PROFILE_PATH`, or a file in the temporary directory.
    pub fn from_env() -> Option<Self> {
        match environment::is_truthy(TPDCC_PROFILE) {
            true => Some(Self::new(match Environment::read(TPCC_PROFILE_PATH) {
                Some(p) => PathBuf::from(p),
                None => std::env::temp_dir().join(DEFAULT_PROFILE_FILE),
            })),
            false => None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` and records how long it took under the name `phase`.
    ///
    /// A failure to write the record is logged and does not affect the result.
    pub fn time<T, F: FnOnce() -> T>(&self, phase: &str, f: F) -> T {
        let start = Instant::now();
        let result = f();
        if let Err(e) = self.record(phase, start.elapsed().as_millis() as u64) {
            tracing::warn!("failed to write profile record for {}: {}", phase, e);
        }
        result
    }

    fn record(&self, phase: &str, elapsed_ms: u64) -> Result<(), Fault> {
        let line = serde_json::to_string(&Record { phase, elapsed_ms })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// Times `f` when a profiler is present, otherwise just runs it.
pub fn timed<T, F: FnOnce() -> T>(profiler: Option<&Profiler>, phase: &str, f: F) -> T {
    match profiler {
        Some(p) => p.time(phase, f),
        None => f(),
    }
}
