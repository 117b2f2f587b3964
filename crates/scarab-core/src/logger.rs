//! Optional event log: a side channel that writes dispatched events as
//! JSON lines to stdout or a file.
//!
//! The logger is wired into the router alongside the broadcast stream.
//! It is strictly best-effort: open and write failures are reported via
//! `tracing` and absorbed -- logging can never stop the simulation.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use scarab_events::{Event, EventKind};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Which event kinds the logger admits. All kinds are admitted by
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogFilter {
    /// Admit `scarab.entity.created` / `.changed` / `.destroyed`.
    #[serde(default = "default_true")]
    pub include_entity_lifecycle: bool,
    /// Admit `scarab.time.updated` and `scarab.simulation.shutdown`.
    #[serde(default = "default_true")]
    pub include_time: bool,
    /// Admit user events.
    #[serde(default = "default_true")]
    pub include_named: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EventLogFilter {
    fn default() -> Self {
        Self {
            include_entity_lifecycle: true,
            include_time: true,
            include_named: true,
        }
    }
}

impl EventLogFilter {
    /// Whether an event passes the filter.
    pub fn admits(&self, event: &Event) -> bool {
        match event.kind() {
            EventKind::EntityLifecycle => self.include_entity_lifecycle,
            EventKind::Simulation => self.include_time,
            EventKind::Named => self.include_named,
        }
    }
}

/// Event log destination and filter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogConfig {
    /// File path to append to; `None` writes to stdout.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Event-kind filter.
    #[serde(flatten)]
    pub filter: EventLogFilter,
}

enum LogSink {
    Stdout,
    File(BufWriter<File>),
    /// The file could not be opened; the logger stays inert.
    Disabled,
}

/// Best-effort JSON-lines event log.
pub struct EventLogger {
    filter: EventLogFilter,
    sink: LogSink,
}

impl EventLogger {
    /// Log to stdout with the given filter.
    pub fn stdout(filter: EventLogFilter) -> Self {
        Self {
            filter,
            sink: LogSink::Stdout,
        }
    }

    /// Log to a file with the given filter.
    ///
    /// A file that cannot be created leaves the logger disabled; the
    /// failure is reported once and the simulation continues.
    pub fn to_file(path: &Path, filter: EventLogFilter) -> Self {
        let sink = match File::create(path) {
            Ok(file) => LogSink::File(BufWriter::new(file)),
            Err(err) => {
                error!(path = %path.display(), error = %err, "could not open event log file");
                LogSink::Disabled
            }
        };
        Self { filter, sink }
    }

    /// Build a logger from configuration.
    pub fn from_config(config: &EventLogConfig) -> Self {
        match &config.path {
            Some(path) => Self::to_file(path, config.filter),
            None => Self::stdout(config.filter),
        }
    }

    /// Write one admitted event as a single JSON line.
    pub fn log_event(&mut self, event: &Event) {
        if !self.filter.admits(event) {
            return;
        }
        let line = match serde_json::to_string(&event.to_wire()) {
            Ok(line) => line,
            Err(err) => {
                warn!(event = %event.event_name, error = %err, "event not serializable");
                return;
            }
        };
        match &mut self.sink {
            LogSink::Stdout => println!("{line}"),
            LogSink::File(writer) => {
                if let Err(err) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
                    warn!(error = %err, "event log write failed");
                }
            }
            LogSink::Disabled => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scarab_events::{EntityId, EntityView, PropertyMap};

    #[test]
    fn default_filter_admits_everything() {
        let filter = EventLogFilter::default();
        assert!(filter.admits(&Event::time_updated(1, 0)));
        assert!(filter.admits(&Event::named("ping", 1)));
        let view = EntityView::new("bee", EntityId::new(), None, PropertyMap::new());
        assert!(filter.admits(&Event::entity_created(&view, 0)));
    }

    #[test]
    fn filter_excludes_by_kind() {
        let filter = EventLogFilter {
            include_entity_lifecycle: false,
            include_time: true,
            include_named: false,
        };
        let view = EntityView::new("bee", EntityId::new(), None, PropertyMap::new());
        assert!(!filter.admits(&Event::entity_created(&view, 0)));
        assert!(!filter.admits(&Event::named("ping", 1)));
        assert!(filter.admits(&Event::time_updated(1, 0)));
        // Shutdown counts as a simulation event, like time updates.
        assert!(filter.admits(&Event::shutdown(5)));
    }

    #[test]
    fn file_logger_writes_json_lines() {
        let dir = std::env::temp_dir().join(format!("scarab-log-{}", uuid_suffix()));
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("events.jsonl");

        let mut logger = EventLogger::to_file(&path, EventLogFilter::default());
        logger.log_event(&Event::time_updated(1, 0));
        logger.log_event(&Event::named("ping", 1));
        drop(logger);

        let contents = std::fs::read_to_string(&path).unwrap_or_default();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value =
            serde_json::from_str(lines[0]).unwrap_or(serde_json::Value::Null);
        assert_eq!(first["event_name"], "scarab.time.updated");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unopenable_file_disables_the_logger() {
        let path = Path::new("/this/path/does/not/exist/events.jsonl");
        let mut logger = EventLogger::to_file(path, EventLogFilter::default());
        // Must not panic or error out.
        logger.log_event(&Event::time_updated(1, 0));
    }

    fn uuid_suffix() -> String {
        EntityId::new().to_string()
    }
}
