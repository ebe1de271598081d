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


//! Diagnostic logging setup.
//!
//! Nothing is installed at load time. The top-level command calls [init] once
//! and keeps the returned [LogGuard] alive for as long as logging is needed.

use crate::core::host::Host;
use crate::util::environment::{self, Environment, TPDCC_DEV, TPDCC_LOG_LEVEL};
use tracing::span::EnteredSpan;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LEVEL: &str = "info";

/// Writes log records to some output for a particular kind of process.
pub trait LogHandler {
    /// Identifier shown in debug output.
    fn name(&self) -> &'static str;

    /// Installs a subscriber for the current thread that filters by `filter`.
    fn install(&self, filter: EnvFilter) -> LogGuard;
}

/// Handler for a standalone process: colored records on stderr.
pub struct DefaultLogHandler;

impl LogHandler for DefaultLogHandler {
    fn name(&self) -> &'static str {
        "default"
    }

    fn install(&self, filter: EnvFilter) -> LogGuard {
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false);
        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        LogGuard {
            _span: None,
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }
}

/// Handler for a process embedded in a DCC host.
///
/// Host consoles capture stdout and do not render ANSI escapes, so records
/// are plain text on stdout, prefixed with the host's name.
pub struct EmbeddedLogHandler {
    host: Host,
}

impl EmbeddedLogHandler {
    pub fn new(host: Host) -> Self {
        Self { host }
    }
}

impl LogHandler for EmbeddedLogHandler {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn install(&self, filter: EnvFilter) -> LogGuard {
        let layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(false)
            .with_target(false)
            .without_time();
        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        let guard = tracing::subscriber::set_default(subscriber);
        // every record is emitted inside this span so it carries the host name
        let span = tracing::info_span!("host", name = %self.host).entered();
        LogGuard {
            _span: Some(span),
            _guard: guard,
        }
    }
}

/// Keeps the installed subscriber active. Dropping it tears logging down.
pub struct LogGuard {
    // dropped before the subscriber guard
    _span: Option<EnteredSpan>,
    _guard: DefaultGuard,
}

/// Selects the handler appropriate for the process hosting the framework.
pub fn handler_for(host: Host) -> Box<dyn LogHandler> {
    match host {
        Host::Standalone => Box::new(DefaultLogHandler),
        _ => Box::new(EmbeddedLogHandler::new(host)),
    }
}

/// Computes the filter directive from an explicit level and the dev flag.
///
/// Dev mode always logs at `debug`.
pub fn resolve_level(level: Option<&str>, dev: bool) -> String {
    if dev == true {
        return String::from("debug");
    }
    match level {
        Some(l) if l.trim().is_empty() == false => l.trim().to_ascii_lowercase(),
        _ => String::from(DEFAULT_LEVEL),
    }
}

/// Reads the log level from `TPDCC_LOG_LEVEL` and `TPDCC_DEV`.
pub fn level_from_env() -> String {
    resolve_level(
        Environment::read(TPDCC_LOG_LEVEL).as_deref(),
        environment::is_truthy(TPDCC_DEV),
    )
}

/// Initializes logging for `host` at the given filter `level`.
///
/// An invalid directive falls back to `info`.
pub fn init(host: Host, level: &str) -> LogGuard {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));
    let handler = handler_for(host);
    let guard = handler.install(filter);
    tracing::debug!(handler = handler.name(), level, "logging initialized");
    guard
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn handler_by_host() {
        assert_eq!(handler_for(Host::Standalone).name(), "default");
        assert_eq!(handler_for(Host::Maya).name(), "embedded");
        assert_eq!(handler_for(Host::Unreal).name(), "embedded");
    }

    #[test]
    fn level_resolution() {
        assert_eq!(resolve_level(None, false), "info");
        assert_eq!(resolve_level(Some("WARN"), false), "warn");
        assert_eq!(resolve_level(Some("  "), false), "info");
        assert_eq!(resolve_level(Some("error"), true), "debug");
    }

    #[test]
    fn guard_scopes_logging() {
        let guard = init(Host::Standalone, "not a valid == directive");
        tracing::info!("inside guard");
        drop(guard);
    }
}
