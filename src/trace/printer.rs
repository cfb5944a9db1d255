//! Colored trace output.
//!
//! Trace lines are assembled from fragments: labels in blue, values in cyan and
//! errors in red. Every method is a no-op when tracing is disabled, so callers
//! never need to check the flag themselves.

use std::fmt::Display;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use colored::Colorize;

/// Trace printer writing to the log sink.
pub struct TraceLog {
    enabled: bool,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for TraceLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceLog")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl TraceLog {
    /// Creates a printer. When `enabled` is false nothing is ever written.
    pub fn new(enabled: bool, sink: Box<dyn Write + Send>) -> Self {
        Self {
            enabled,
            sink: Mutex::new(sink),
        }
    }

    /// A printer that never writes.
    pub fn disabled() -> Self {
        Self::new(false, Box::new(io::sink()))
    }

    /// Whether trace output is produced.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn emit(&self, text: impl Display) {
        if !self.enabled {
            return;
        }
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        // A broken log sink must not abort the request being traced
        if let Err(e) = write!(sink, "{text}") {
            log::debug!("Failed to write trace output: {e}");
        }
    }

    /// Label fragment.
    pub fn info(&self, text: &str) {
        self.emit(text.blue());
    }

    /// Label fragment ending the line.
    pub fn infoln(&self, text: &str) {
        self.emit(format!("{text}\n").blue());
    }

    /// Value fragment.
    pub fn value(&self, text: impl Display) {
        if self.enabled {
            self.emit(text.to_string().cyan());
        }
    }

    /// Value fragment ending the line.
    pub fn valueln(&self, text: impl Display) {
        if self.enabled {
            self.emit(format!("{text}\n").cyan());
        }
    }

    /// Error fragment.
    pub fn error(&self, text: impl Display) {
        if self.enabled {
            self.emit(text.to_string().red());
        }
    }

    /// Error fragment ending the line.
    pub fn errorln(&self, text: impl Display) {
        if self.enabled {
            self.emit(format!("{text}\n").red());
        }
    }

    /// `label: value` line.
    pub fn info_valueln(&self, label: &str, value: impl Display) {
        if self.enabled {
            self.info(&format!("{label}: "));
            self.valueln(value);
        }
    }

    /// Flushes the sink.
    pub fn flush(&self) {
        if !self.enabled {
            return;
        }
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = sink.flush();
    }
}

/// In-memory sink whose content stays readable after being handed out.
///
/// Useful to capture the output or log sink of a client.
#[derive(Debug, Clone, Default)]
pub struct MemorySink(Arc<Mutex<Vec<u8>>>);

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Everything written so far, decoded lossily as UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
