use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod commands;

use shared_config::AppConfig;
use shared_utils::{with_exception_handler, InsightsLogger};

#[derive(Parser, Debug)]
#[command(name = "manbrs-notifications")]
#[command(author, version, about = "Breast screening appointment notification jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Create or update appointments from the day's NBSS extracts
    CreateAppointments {
        /// Extract directory date (YYYY-MM-DD), defaults to today
        date: Option<NaiveDate>,
    },

    /// Batch due appointments and send them to the communications API
    SendMessageBatch {
        routing_plan_id: Uuid,
    },

    /// Resend the next batch on the retry queue
    RetryFailedMessageBatch,

    /// Save queued message and channel status updates
    SaveMessageStatus,

    /// Publish queue lengths
    CollectMetrics,
}

impl Command {
    fn error_name(&self) -> &'static str {
        match self {
            Command::CreateAppointments { .. } => "CreateAppointmentsError",
            Command::SendMessageBatch { .. } => "SendMessageBatchError",
            Command::RetryFailedMessageBatch => "RetryFailedMessageBatchError",
            Command::SaveMessageStatus => "SaveMessageStatusError",
            Command::CollectMetrics => "CollectMetricsError",
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let json = std::env::var("LOG_FORMAT").map(|f| f.eq_ignore_ascii_case("json")).unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run(command: Command, config: &AppConfig) -> anyhow::Result<()> {
    let now = Utc::now();

    match command {
        Command::CreateAppointments { date } => {
            let date = date.unwrap_or_else(|| now.with_timezone(&config.timezone).date_naive());
            commands::create_appointments(config, date, now).await
        }
        Command::SendMessageBatch { routing_plan_id } => {
            commands::send_message_batch(config, routing_plan_id, now).await
        }
        Command::RetryFailedMessageBatch => commands::retry_failed_message_batch(config, now).await,
        Command::SaveMessageStatus => commands::save_message_status(config, now).await,
        Command::CollectMetrics => commands::collect_metrics(config).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Loading Env Vars
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let logger = InsightsLogger::new(&config);

    info!("Running {:?}", cli.command);
    let error_name = cli.command.error_name();

    match with_exception_handler(&logger, error_name, run(cli.command, &config)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_command() {
        let cli = Cli::try_parse_from(["manbrs-notifications", "create-appointments", "2025-07-01"]).unwrap();
        assert_eq!(
            cli.command,
            Command::CreateAppointments {
                date: NaiveDate::from_ymd_opt(2025, 7, 1)
            }
        );

        let cli = Cli::try_parse_from(["manbrs-notifications", "create-appointments"]).unwrap();
        assert_eq!(cli.command, Command::CreateAppointments { date: None });

        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from(["manbrs-notifications", "send-message-batch", &id.to_string()]).unwrap();
        assert_eq!(cli.command, Command::SendMessageBatch { routing_plan_id: id });

        for (name, command) in [
            ("retry-failed-message-batch", Command::RetryFailedMessageBatch),
            ("save-message-status", Command::SaveMessageStatus),
            ("collect-metrics", Command::CollectMetrics),
        ] {
            let cli = Cli::try_parse_from(["manbrs-notifications", name]).unwrap();
            assert_eq!(cli.command, command);
        }
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(Cli::try_parse_from(["manbrs-notifications", "create-appointments", "01/07/2025"]).is_err());
        assert!(Cli::try_parse_from(["manbrs-notifications", "send-message-batch"]).is_err());
        assert!(Cli::try_parse_from(["manbrs-notifications", "send-message-batch", "plan-1"]).is_err());
    }

    #[test]
    fn each_command_has_its_own_error_name() {
        assert_eq!(
            Command::CreateAppointments { date: None }.error_name(),
            "CreateAppointmentsError"
        );
        assert_eq!(
            Command::SendMessageBatch { routing_plan_id: Uuid::nil() }.error_name(),
            "SendMessageBatchError"
        );
        assert_eq!(Command::RetryFailedMessageBatch.error_name(), "RetryFailedMessageBatchError");
        assert_eq!(Command::SaveMessageStatus.error_name(), "SaveMessageStatusError");
        assert_eq!(Command::CollectMetrics.error_name(), "CollectMetricsError");
    }
}
