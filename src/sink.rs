//! Output sinks for runner and pipeline messages
//!
//! The runner never prints directly; it reports through an [`OutputSink`]
//! handed to it at construction.

use std::sync::Mutex;

use console::style;

/// Destination for informational and warning messages
pub trait OutputSink: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
}

/// Forwards messages to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

/// Writes styled lines to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink {
    pub quiet: bool,
}

impl OutputSink for ConsoleSink {
    fn info(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", style("•").cyan(), message);
        }
    }

    fn warn(&self, message: &str) {
        eprintln!("{} {}", style("warning:").yellow().bold(), message);
    }
}

/// Severity of a recorded line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(level, _)| *level == Level::Warn)
            .map(|(_, line)| line)
            .collect()
    }

    fn push(&self, level: Level, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, message.to_string()));
        }
    }
}

impl OutputSink for MemorySink {
    fn info(&self, message: &str) {
        self.push(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(Level::Warn, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_separates_levels() {
        let sink = MemorySink::new();
        sink.info("starting");
        sink.warn("careful");

        assert_eq!(sink.lines().len(), 2);
        assert_eq!(sink.warnings(), vec!["careful".to_string()]);
    }
}
