//! Message handling for the sending pipeline.
//!
//! Every issue the builder finds (missing fields, scheme mismatches,
//! SMP trouble) goes through one [`MessageHandler`]. The pipeline reads
//! the error count back at its checkpoints and refuses to send when it is
//! non-zero; the handler itself never aborts anything.

use tracing::{error, warn};

/// Sink for warnings and errors raised while preparing a send.
pub trait MessageHandler {
    /// Record a warning. Warnings never block the send.
    fn warn(&mut self, message: String);

    /// Record an error. Any error blocks the send at the next checkpoint.
    fn error(&mut self, message: String);

    /// Number of errors recorded so far.
    fn error_count(&self) -> usize;

    /// Number of warnings recorded so far.
    fn warning_count(&self) -> usize;

    /// Record a warning with an underlying cause.
    fn warn_with_cause(&mut self, message: String, cause: &dyn std::error::Error) {
        self.warn(format!("{message}: {cause}"));
    }

    /// Record an error with an underlying cause.
    fn error_with_cause(&mut self, message: String, cause: &dyn std::error::Error) {
        self.error(format!("{message}: {cause}"));
    }
}

/// Default handler: accumulates all issues and mirrors them to the log.
#[derive(Debug, Default)]
pub struct CollectingMessageHandler {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl CollectingMessageHandler {
    /// An empty handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// All warnings recorded so far.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// All errors recorded so far.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

impl MessageHandler for CollectingMessageHandler {
    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }

    fn error(&mut self, message: String) {
        error!("{message}");
        self.errors.push(message);
    }

    fn error_count(&self) -> usize {
        self.errors.len()
    }

    fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_retains_messages() {
        let mut handler = CollectingMessageHandler::new();
        handler.warn("scheme looks odd".into());
        handler.error("sender email is missing".into());
        handler.error("receiver id is missing".into());

        assert_eq!(handler.warning_count(), 1);
        assert_eq!(handler.error_count(), 2);
        assert_eq!(handler.warnings(), ["scheme looks odd"]);
        assert_eq!(handler.errors()[1], "receiver id is missing");
    }

    #[test]
    fn cause_is_appended() {
        let mut handler = CollectingMessageHandler::new();
        let cause = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        handler.error_with_cause("cannot read key store".into(), &cause);
        assert!(handler.errors()[0].contains("no such file"));
    }
}
