//! Logging bootstrap.
//!
//! # Responsibility
//! - Start rolling file logs once per process, on request of the embedder.
//! - Keep SQL tracing on the `log` facade so hosts can bring their own
//!   backend instead of this file setup.
//!
//! # Invariants
//! - Repeated initialization with equal settings is a no-op.
//! - Conflicting re-initialization is rejected, never applied.
//! - Initialization never panics.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const ROTATE_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_FILES: usize = 5;

/// File logging settings, loadable alongside `DbConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory the log files are written to.
    pub directory: PathBuf,
}

impl LogSettings {
    pub fn new(level: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            level: level.into(),
            directory: directory.into(),
        }
    }

    fn validated(mut self) -> Result<Self, String> {
        self.level = match self.level.trim().to_ascii_lowercase().as_str() {
            level @ ("trace" | "debug" | "info" | "warn" | "error") => level.to_string(),
            "warning" => "warn".to_string(),
            other => {
                return Err(format!(
                    "unsupported log level `{other}`, expected trace|debug|info|warn|error"
                ))
            }
        };
        if !self.directory.is_absolute() {
            return Err(format!(
                "log directory must be an absolute path, got `{}`",
                self.directory.display()
            ));
        }
        Ok(self)
    }
}

struct ActiveLogging {
    settings: LogSettings,
    _handle: LoggerHandle,
}

static ACTIVE: OnceCell<ActiveLogging> = OnceCell::new();

/// Starts rolling file logging, or verifies it is already running with the
/// same settings. Conflicting settings produce an error naming the active
/// configuration.
pub fn init_logging(settings: LogSettings) -> Result<(), String> {
    let settings = settings.validated()?;
    let active = ACTIVE.get_or_try_init(|| start(settings.clone()))?;
    if active.settings != settings {
        return Err(format!(
            "logging already active with level `{}` in `{}`",
            active.settings.level,
            active.settings.directory.display()
        ));
    }
    Ok(())
}

/// The active logging settings, when initialized.
pub fn logging_status() -> Option<LogSettings> {
    ACTIVE.get().map(|active| active.settings.clone())
}

/// Default log level per build mode.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start(settings: LogSettings) -> Result<ActiveLogging, String> {
    std::fs::create_dir_all(&settings.directory).map_err(|err| {
        format!(
            "cannot create log directory `{}`: {err}",
            settings.directory.display()
        )
    })?;

    let handle = Logger::try_with_str(&settings.level)
        .map_err(|err| format!("invalid log level `{}`: {err}", settings.level))?
        .log_to_file(
            FileSpec::default()
                .directory(&settings.directory)
                .basename("rider-data"),
        )
        .rotate(
            Criterion::Size(ROTATE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .start()
        .map_err(|err| format!("cannot start logger: {err}"))?;

    info!(
        "event=logging_init module=logging status=ok level={} directory={} version={}",
        settings.level,
        settings.directory.display(),
        env!("CARGO_PKG_VERSION")
    );
    Ok(ActiveLogging {
        settings,
        _handle: handle,
    })
}

#[cfg(test)]
mod tests {
    use super::LogSettings;

    #[test]
    fn level_normalizes_and_rejects_unknown() {
        let ok = LogSettings::new(" WARN ", "/var/log/rider-data")
            .validated()
            .unwrap();
        assert_eq!(ok.level, "warn");
        let alias = LogSettings::new("warning", "/var/log/rider-data")
            .validated()
            .unwrap();
        assert_eq!(alias.level, "warn");
        assert!(LogSettings::new("loud", "/var/log/rider-data")
            .validated()
            .is_err());
    }

    #[test]
    fn directory_must_be_absolute() {
        assert!(LogSettings::new("info", "relative/logs").validated().is_err());
        assert!(LogSettings::new("info", "/var/log/rider-data")
            .validated()
            .is_ok());
    }
}
