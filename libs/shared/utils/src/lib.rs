pub mod telemetry;
pub mod test_utils;

pub use telemetry::{with_exception_handler, CommandError, InsightsLogger};
