//! User-facing progress messages.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

/// Prefix put in front of every message written to a text sink.
pub const MESSAGE_PREFIX: &str = "[prax-automigrate] - ";

/// Where progress messages go.
#[derive(Clone, Default)]
pub enum NotifySink {
    /// Standard output.
    #[default]
    Stdout,
    /// `tracing` events at `INFO` level, target `prax_automigrate`.
    Tracing,
    /// Any shared writer.
    Writer(Arc<Mutex<dyn Write + Send>>),
}

impl NotifySink {
    /// Wrap a writer as a sink.
    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        Self::Writer(Arc::new(Mutex::new(writer)))
    }
}

impl std::fmt::Debug for NotifySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("Stdout"),
            Self::Tracing => f.write_str("Tracing"),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// Best-effort message emitter.
///
/// Disabled notifiers drop every message. Write failures on a text sink are
/// swallowed: a broken sink never aborts a migration.
#[derive(Debug, Clone)]
pub struct Notifier {
    enabled: bool,
    sink: NotifySink,
}

impl Notifier {
    /// Create a notifier.
    pub fn new(enabled: bool, sink: NotifySink) -> Self {
        Self { enabled, sink }
    }

    /// A notifier that drops everything.
    pub fn disabled() -> Self {
        Self::new(false, NotifySink::Stdout)
    }

    /// Whether messages are emitted.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Emit a message.
    pub fn emit(&self, message: &str) {
        if !self.enabled {
            return;
        }

        match &self.sink {
            NotifySink::Tracing => {
                tracing::info!(target: "prax_automigrate", "{}", message);
            }
            NotifySink::Stdout => {
                let mut out = std::io::stdout().lock();
                let _ = writeln!(out, "{MESSAGE_PREFIX}{message}");
            }
            NotifySink::Writer(writer) => {
                let mut writer = writer.lock();
                let _ = writeln!(writer, "{MESSAGE_PREFIX}{message}");
                let _ = writer.flush();
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(true, NotifySink::default())
    }
}
