//! Metrics tracking for the jukebox server

use chrono::{DateTime, Local};
use jukebox_core::{ConnectionId, JukeboxStats, StateSnapshot};
use std::collections::VecDeque;
use std::path::PathBuf;

/// Maximum number of log entries to keep
const MAX_LOG_ENTRIES: usize = 100;

/// A log entry for the dashboard
#[derive(Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Connection,
    Playback,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Connection => "CONN",
            LogLevel::Playback => "PLAY",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ServerStatus {
    Starting,
    Running,
    Error,
}

/// Server metrics
pub struct Metrics {
    /// Server start time
    pub start_time: DateTime<Local>,

    /// Listening port
    pub port: u16,

    /// Directory holding history and bookmarks
    pub data_dir: PathBuf,

    /// Current number of open connections
    pub active_connections: usize,

    /// Total connections since start
    pub total_connections: u64,

    /// Peak simultaneous connections
    pub peak_connections: usize,

    /// Whether a host is currently attached
    pub host_attached: bool,

    /// Jukebox counters as of the last handled event
    pub stats: JukeboxStats,

    /// Latest state as broadcast to clients
    pub snapshot: StateSnapshot,

    /// Log entries
    pub logs: VecDeque<LogEntry>,

    /// Server status
    pub status: ServerStatus,
}

impl Metrics {
    pub fn new(port: u16, data_dir: PathBuf) -> Self {
        Self {
            start_time: Local::now(),
            port,
            data_dir,
            active_connections: 0,
            total_connections: 0,
            peak_connections: 0,
            host_attached: false,
            stats: JukeboxStats::default(),
            snapshot: StateSnapshot::default(),
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            status: ServerStatus::Starting,
        }
    }

    /// Add a log entry
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message: message.into(),
        });
    }

    pub fn connection_opened(&mut self, connection: ConnectionId) {
        self.active_connections += 1;
        self.total_connections += 1;
        if self.active_connections > self.peak_connections {
            self.peak_connections = self.active_connections;
        }
        self.log(LogLevel::Connection, format!("Connected: {}", connection));
    }

    pub fn connection_closed(&mut self, connection: ConnectionId) {
        self.active_connections = self.active_connections.saturating_sub(1);
        self.log(LogLevel::Connection, format!("Disconnected: {}", connection));
    }

    /// Take in the jukebox state after an event, logging what changed
    pub fn observe(&mut self, snapshot: StateSnapshot, stats: JukeboxStats, host_attached: bool) {
        let previous = self.snapshot.current_item.as_ref().map(|item| item.item_id().clone());
        let current = snapshot.current_item.as_ref().map(|item| item.item_id().clone());

        if previous != current {
            match &snapshot.current_item {
                Some(item) if item.is_history() => {
                    self.log(LogLevel::Playback, format!("Now playing: {} (history)", item.content_id()))
                }
                Some(item) => self.log(LogLevel::Playback, format!("Now playing: {}", item.content_id())),
                None => self.log(LogLevel::Playback, "Idle"),
            }
        }

        if stats.store_failures > self.stats.store_failures {
            self.log(LogLevel::Error, "Store operation failed, state unchanged");
        }
        if stats.denials > self.stats.denials {
            self.log(LogLevel::Warning, "Skip or withdraw denied");
        }
        if host_attached != self.host_attached {
            let message = if host_attached { "Host attached" } else { "Host detached" };
            self.log(LogLevel::Info, message);
        }

        self.snapshot = snapshot;
        self.stats = stats;
        self.host_attached = host_attached;
    }

    /// Items waiting across all queues
    pub fn pending_items(&self) -> usize {
        self.snapshot.queues.iter().map(|q| q.items.len()).sum()
    }

    /// Get uptime as formatted string
    pub fn uptime(&self) -> String {
        let duration = Local::now().signed_duration_since(self.start_time);
        format_duration(duration.num_seconds())
    }
}

/// Format seconds as a short human readable duration
pub fn format_duration(secs: i64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        format!("{}h {}m", hours, mins)
    }
}

/// Truncate an identity for display (show first and last few chars)
pub fn truncate_id(id: &str) -> String {
    if id.chars().count() > 16 {
        let chars: Vec<char> = id.chars().collect();
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        id.to_string()
    }
}
