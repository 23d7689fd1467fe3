use std::fmt::Display;
use std::future::Future;
use thiserror::Error;
use tracing::{error, warn};

use shared_config::AppConfig;

/// Failure of a job command. The message is already prefixed with the
/// command's error name.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct CommandError(pub String);

/// Named logger for exceptions and custom events picked up by the
/// monitoring pipeline.
#[derive(Debug, Clone)]
pub struct InsightsLogger {
    logger_name: String,
}

impl InsightsLogger {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            logger_name: config.insights_logger_name.clone(),
        }
    }

    pub fn exception(&self, exception_name: &str) {
        error!(logger = %self.logger_name, "{}", exception_name);
    }

    pub fn custom_event(&self, message: &str, event_name: &str) {
        warn!(
            logger = %self.logger_name,
            custom_event.name = event_name,
            additional_attrs = message,
            "{}", message
        );
    }
}

/// Runs a command body, logging any error as `<error_name>: <error>` and
/// converting it to a `CommandError`.
pub async fn with_exception_handler<T, E, F>(
    logger: &InsightsLogger,
    error_name: &str,
    body: F,
) -> Result<T, CommandError>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match body.await {
        Ok(value) => Ok(value),
        Err(e) => {
            let message = format!("{}: {}", error_name, e);
            logger.exception(&message);
            Err(CommandError(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestConfig;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn captured_output(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[tokio::test]
    async fn handler_prefixes_errors_with_command_name() {
        let logger = InsightsLogger::new(&TestConfig::default().to_app_config());

        let result: Result<(), CommandError> =
            with_exception_handler(&logger, "CreateAppointmentsError", async { Err::<(), _>("Error!") }).await;

        assert_eq!(result, Err(CommandError("CreateAppointmentsError: Error!".to_string())));
    }

    #[tokio::test]
    async fn handler_passes_values_through() {
        let logger = InsightsLogger::new(&TestConfig::default().to_app_config());

        let result = with_exception_handler(&logger, "AnyError", async { Ok::<_, String>(42) }).await;

        assert_eq!(result, Ok(42));
    }

    #[test]
    fn exception_is_logged_under_logger_name() {
        let logger = InsightsLogger::new(&TestConfig::default().to_app_config());

        let output = captured_output(|| logger.exception("SaveMessageStatusError: boom"));

        assert!(output.contains("ERROR"));
        assert!(output.contains("SaveMessageStatusError: boom"));
        assert!(output.contains("manbrs-notifications"));
    }

    #[test]
    fn custom_event_carries_event_name() {
        let logger = InsightsLogger::new(&TestConfig::default().to_app_config());

        let output = captured_output(|| logger.custom_event("batch failed", "batch_marked_as_failed"));

        assert!(output.contains("WARN"));
        assert!(output.contains("batch_marked_as_failed"));
        assert!(output.contains("batch failed"));
    }
}
